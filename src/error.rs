/// The result of a packet exchange on the bus.
///
/// The codec reports every protocol-level failure as one of these values
/// rather than panicking; higher layers decide whether to retry, count or
/// escalate.
#[derive(Debug)]
pub enum CommError {
	/// A previous exchange still owns the port (a sync-read between its TX and RX halves).
	PortBusy,

	/// The instruction packet could not be written to the port.
	TxFail(std::io::Error),

	/// The instruction packet does not fit the wire format.
	TxMalformed,

	/// No status bytes arrived within the packet timeout window.
	RxTimeout,

	/// The status packet failed the checksum, a header sanity check,
	/// or the inter-byte gap limit.
	RxCorrupt,

	/// The operation is not supported for this target, e.g. a broadcast read.
	NotAvailable,

	/// A port-level read failure.
	Io(std::io::Error),
}

/// An error writing a register through the register table.
#[derive(Debug)]
pub enum RegisterError {
	/// The address does not appear in the register table.
	UnknownRegister(u8),

	/// The exchange failed on the bus.
	Comm(CommError),
}

/// An error applying an actuator configuration.
#[derive(Debug)]
pub enum ConfigError {
	/// The actuator is not registered with the controller.
	UnknownActuator(u8),

	/// A configuration value falls outside the register's valid range.
	OutOfRange { name: &'static str, value: i64 },

	/// A register write failed.
	Register(RegisterError),
}

/// An error starting the control loop.
#[derive(Debug)]
pub enum StartError {
	/// The initial bus scan found no servos.
	NoActuatorsFound,

	/// The control loop thread could not be spawned.
	Spawn(std::io::Error),
}

/// The error bits a servo reports in the status packet error byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBits(pub u8);

impl StatusBits {
	pub const VOLTAGE: u8 = 1;
	pub const ANGLE: u8 = 2;
	pub const OVERHEAT: u8 = 4;
	pub const OVERCURRENT: u8 = 8;
	pub const OVERLOAD: u8 = 32;

	/// True if no error bit is set.
	pub fn is_ok(self) -> bool {
		self.0 == 0
	}
}

impl std::error::Error for CommError {}
impl std::error::Error for RegisterError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for StartError {}

impl From<CommError> for RegisterError {
	fn from(other: CommError) -> Self {
		Self::Comm(other)
	}
}

impl From<RegisterError> for ConfigError {
	fn from(other: RegisterError) -> Self {
		Self::Register(other)
	}
}

impl std::fmt::Display for CommError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::PortBusy => write!(f, "port is in use by another exchange"),
			Self::TxFail(e) => write!(f, "failed to transmit instruction packet: {}", e),
			Self::TxMalformed => write!(f, "instruction packet exceeds the maximum packet length"),
			Self::RxTimeout => write!(f, "no status packet within the timeout window"),
			Self::RxCorrupt => write!(f, "corrupt status packet"),
			Self::NotAvailable => write!(f, "operation not available for this target"),
			Self::Io(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for RegisterError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::UnknownRegister(address) => write!(f, "unknown register address {}", address),
			Self::Comm(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for ConfigError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::UnknownActuator(id) => write!(f, "actuator {} is not registered", id),
			Self::OutOfRange { name, value } => write!(f, "{} out of range: {}", name, value),
			Self::Register(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for StartError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::NoActuatorsFound => write!(f, "no actuators found on the bus"),
			Self::Spawn(e) => write!(f, "failed to spawn the control loop thread: {}", e),
		}
	}
}

impl std::fmt::Display for StatusBits {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		if self.is_ok() {
			return write!(f, "ok");
		}
		let names = [
			(Self::VOLTAGE, "voltage"),
			(Self::ANGLE, "angle-sensor"),
			(Self::OVERHEAT, "overheat"),
			(Self::OVERCURRENT, "overcurrent"),
			(Self::OVERLOAD, "overload"),
		];
		let mut first = true;
		for (bit, name) in names {
			if self.0 & bit != 0 {
				if !first {
					write!(f, "+")?;
				}
				write!(f, "{}", name)?;
				first = false;
			}
		}
		Ok(())
	}
}
