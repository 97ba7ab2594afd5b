//! A loopback serial port for unit tests: reads come from a queue the test
//! fills, writes are captured.

use std::collections::VecDeque;

use crate::serial_port::SerialPort;

pub(crate) struct TestPort {
	pub rx: VecDeque<u8>,
	pub tx: Vec<u8>,
}

impl TestPort {
	pub fn new() -> Self {
		Self {
			rx: VecDeque::new(),
			tx: Vec::new(),
		}
	}

	pub fn feed(&mut self, bytes: &[u8]) {
		self.rx.extend(bytes);
	}
}

impl SerialPort for TestPort {
	fn baud_rate(&self) -> std::io::Result<u32> {
		Ok(500_000)
	}

	fn set_baud_rate(&mut self, _baud_rate: u32) -> std::io::Result<()> {
		Ok(())
	}

	fn discard_input_buffer(&mut self) -> std::io::Result<()> {
		// Keep pre-loaded replies so tests can enqueue them before the TX.
		Ok(())
	}

	fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
		let mut count = 0;
		while count < buffer.len() {
			match self.rx.pop_front() {
				Some(byte) => {
					buffer[count] = byte;
					count += 1;
				},
				None => break,
			}
		}
		Ok(count)
	}

	fn write_all(&mut self, buffer: &[u8]) -> std::io::Result<()> {
		self.tx.extend_from_slice(buffer);
		Ok(())
	}
}
