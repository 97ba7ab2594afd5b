//! Trait implementation using the `serial2` crate.

impl crate::SerialPort for serial2::SerialPort {
	fn baud_rate(&self) -> std::io::Result<u32> {
		self.get_configuration()?.get_baud_rate()
	}

	fn set_baud_rate(&mut self, baud_rate: u32) -> std::io::Result<()> {
		let mut settings = self.get_configuration()?;
		settings.set_baud_rate(baud_rate)?;
		self.set_configuration(&settings)?;
		Ok(())
	}

	fn discard_input_buffer(&mut self) -> std::io::Result<()> {
		serial2::SerialPort::discard_input_buffer(self)
	}

	fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
		match serial2::SerialPort::read(self, buffer) {
			Ok(count) => Ok(count),
			Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
			Err(e) => Err(e),
		}
	}

	fn write_all(&mut self, buffer: &[u8]) -> std::io::Result<()> {
		serial2::SerialPort::write_all(self, buffer)
	}
}
