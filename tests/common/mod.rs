//! A mock serial port with in-process simulated servos.
//!
//! The simulator decodes every instruction frame the host transmits, records
//! it as a [`BusEvent`] and queues the status replies a real servo fleet
//! would produce, so the controller can be driven end to end without
//! hardware.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use scservo::SerialPort;

const HEADER: [u8; 2] = [0xFF, 0xFF];

const INST_PING: u8 = 0x01;
const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;
const INST_SYNC_READ: u8 = 0x82;
const INST_SYNC_WRITE: u8 = 0x83;

/// One decoded instruction frame, as seen by the simulated bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
	Ping { id: u8 },
	Read { id: u8, address: u8, count: u8 },
	Write { id: u8, address: u8, data: Vec<u8> },
	SyncRead { address: u8, count: u8, ids: Vec<u8> },
	SyncWrite { address: u8, entries: Vec<(u8, Vec<u8>)> },
}

/// A simulated servo: a register file and a responsiveness switch.
pub struct SimServo {
	pub registers: [u8; 128],
	pub responsive: bool,
}

impl SimServo {
	pub fn new(model: u16) -> Self {
		let mut registers = [0u8; 128];
		registers[3] = (model & 0xFF) as u8;
		registers[4] = (model >> 8) as u8;
		Self {
			registers,
			responsive: true,
		}
	}

	pub fn present_position(&self) -> u16 {
		u16::from(self.registers[56]) | u16::from(self.registers[57]) << 8
	}

	pub fn set_present_position(&mut self, counts: u16) {
		self.registers[56] = (counts & 0xFF) as u8;
		self.registers[57] = (counts >> 8) as u8;
	}

	pub fn goal_position(&self) -> u16 {
		u16::from(self.registers[42]) | u16::from(self.registers[43]) << 8
	}
}

struct Inner {
	servos: BTreeMap<u8, SimServo>,
	rx: VecDeque<u8>,
	events: Vec<BusEvent>,
}

/// A cloneable [`SerialPort`] backed by simulated servos.
///
/// Clones share the same bus, so a test can keep one handle for inspection
/// while the controller owns another.
#[derive(Clone)]
pub struct SimBus {
	inner: Arc<Mutex<Inner>>,
}

impl SimBus {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner {
				servos: BTreeMap::new(),
				rx: VecDeque::new(),
				events: Vec::new(),
			})),
		}
	}

	pub fn add_servo(&self, id: u8, model: u16) {
		self.lock().servos.insert(id, SimServo::new(model));
	}

	pub fn set_responsive(&self, id: u8, responsive: bool) {
		self.lock().servos.get_mut(&id).unwrap().responsive = responsive;
	}

	/// Inspect or mutate one simulated servo.
	pub fn with_servo<R>(&self, id: u8, body: impl FnOnce(&mut SimServo) -> R) -> R {
		let mut inner = self.lock();
		body(inner.servos.get_mut(&id).unwrap())
	}

	pub fn events(&self) -> Vec<BusEvent> {
		self.lock().events.clone()
	}

	pub fn clear_events(&self) {
		self.lock().events.clear();
	}

	/// The participant lists of every SYNC_READ seen so far.
	pub fn sync_read_participants(&self) -> Vec<Vec<u8>> {
		self.events()
			.into_iter()
			.filter_map(|event| match event {
				BusEvent::SyncRead { ids, .. } => Some(ids),
				_ => None,
			})
			.collect()
	}

	/// The participant payloads of every SYNC_WRITE seen so far.
	pub fn sync_writes(&self) -> Vec<Vec<(u8, Vec<u8>)>> {
		self.events()
			.into_iter()
			.filter_map(|event| match event {
				BusEvent::SyncWrite { entries, .. } => Some(entries),
				_ => None,
			})
			.collect()
	}

	/// True if any sync traffic (read or write) has been recorded.
	pub fn has_sync_traffic(&self) -> bool {
		self.events()
			.iter()
			.any(|event| matches!(event, BusEvent::SyncRead { .. } | BusEvent::SyncWrite { .. }))
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap()
	}
}

impl SerialPort for SimBus {
	fn baud_rate(&self) -> std::io::Result<u32> {
		Ok(1_000_000)
	}

	fn set_baud_rate(&mut self, _baud_rate: u32) -> std::io::Result<()> {
		Ok(())
	}

	fn discard_input_buffer(&mut self) -> std::io::Result<()> {
		self.lock().rx.clear();
		Ok(())
	}

	fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
		let mut inner = self.lock();
		let mut count = 0;
		while count < buffer.len() {
			match inner.rx.pop_front() {
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
		let mut inner = self.lock();
		handle_frame(&mut inner, buffer);
		Ok(())
	}
}

/// Decode one instruction frame and queue the replies it provokes.
fn handle_frame(inner: &mut Inner, frame: &[u8]) {
	if frame.len() < 6 || frame[0..2] != HEADER {
		return;
	}
	let id = frame[2];
	let instruction = frame[4];
	let parameters = &frame[5..frame.len() - 1];

	match instruction {
		INST_PING => {
			inner.events.push(BusEvent::Ping { id });
			if responds(inner, id) {
				push_status(inner, id, 0, &[]);
			}
		},
		INST_READ => {
			let address = parameters[0];
			let count = parameters[1];
			inner.events.push(BusEvent::Read { id, address, count });
			if responds(inner, id) {
				let data = register_window(&inner.servos[&id], address, count);
				push_status(inner, id, 0, &data);
			}
		},
		INST_WRITE => {
			let address = parameters[0];
			let data = parameters[1..].to_vec();
			inner.events.push(BusEvent::Write {
				id,
				address,
				data: data.clone(),
			});
			let mut respond = false;
			if let Some(servo) = inner.servos.get_mut(&id) {
				let start = address as usize;
				servo.registers[start..start + data.len()].copy_from_slice(&data);
				respond = servo.responsive;
			}
			if respond {
				push_status(inner, id, 0, &[]);
			}
		},
		INST_SYNC_READ => {
			let address = parameters[0];
			let count = parameters[1];
			let ids = parameters[2..].to_vec();
			inner.events.push(BusEvent::SyncRead {
				address,
				count,
				ids: ids.clone(),
			});
			for id in ids {
				if responds(inner, id) {
					let data = register_window(&inner.servos[&id], address, count);
					push_status(inner, id, 0, &data);
				}
			}
		},
		INST_SYNC_WRITE => {
			let address = parameters[0];
			let count = parameters[1] as usize;
			let mut entries = Vec::new();
			for chunk in parameters[2..].chunks(count + 1) {
				if chunk.len() != count + 1 {
					break;
				}
				let id = chunk[0];
				let data = chunk[1..].to_vec();
				if let Some(servo) = inner.servos.get_mut(&id) {
					let start = address as usize;
					servo.registers[start..start + count].copy_from_slice(&data);
				}
				entries.push((id, data));
			}
			inner.events.push(BusEvent::SyncWrite { address, entries });
		},
		_ => {},
	}
}

fn responds(inner: &Inner, id: u8) -> bool {
	inner.servos.get(&id).map(|servo| servo.responsive).unwrap_or(false)
}

fn register_window(servo: &SimServo, address: u8, count: u8) -> Vec<u8> {
	let start = address as usize;
	servo.registers[start..start + count as usize].to_vec()
}

/// Status frame: FF FF id LEN ERR params CHK.
fn push_status(inner: &mut Inner, id: u8, error: u8, parameters: &[u8]) {
	let mut frame = vec![HEADER[0], HEADER[1], id, parameters.len() as u8 + 2, error];
	frame.extend_from_slice(parameters);
	let sum = frame[2..].iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
	frame.push(!sum);
	inner.rx.extend(frame);
}
