//! The control table of STS / SMS series servos.

/// Register addresses.
///
/// Addresses below [`EEPROM_END`](address::EEPROM_END) live in EEPROM and
/// survive power cycles; writes to them require unlocking the
/// [`LOCK`](address::LOCK) register first and take extra time to settle.
#[rustfmt::skip]
pub mod address {
	pub const MODEL                : u8 = 3;
	pub const ID                   : u8 = 5;
	pub const BAUD_RATE            : u8 = 6;
	pub const RETURN_DELAY         : u8 = 7;
	pub const RESPONSE_LEVEL       : u8 = 8;
	pub const MIN_ANGLE_LIMIT      : u8 = 9;
	pub const MAX_ANGLE_LIMIT      : u8 = 11;
	pub const MAX_TEMPERATURE      : u8 = 13;
	pub const MAX_VOLTAGE          : u8 = 14;
	pub const MIN_VOLTAGE          : u8 = 15;
	pub const MAX_TORQUE           : u8 = 16;
	pub const PHASE                : u8 = 18;
	pub const UNLOADING_CONDITION  : u8 = 19;
	pub const LED_ALARM_CONDITION  : u8 = 20;
	pub const KP                   : u8 = 21;
	pub const KD                   : u8 = 22;
	pub const KI                   : u8 = 23;
	pub const MIN_STARTUP_FORCE    : u8 = 24;
	pub const CW_DEAD_ZONE         : u8 = 26;
	pub const CCW_DEAD_ZONE        : u8 = 27;
	pub const PROTECTION_CURRENT   : u8 = 28;
	pub const ANGULAR_RESOLUTION   : u8 = 30;
	pub const OFFSET               : u8 = 31;
	pub const MODE                 : u8 = 33;
	pub const PROTECTIVE_TORQUE    : u8 = 34;
	pub const PROTECTION_TIME      : u8 = 35;
	pub const OVERLOAD_TORQUE      : u8 = 36;
	pub const SPEED_KP             : u8 = 37;
	pub const OVERCURRENT_TIME     : u8 = 38;
	pub const SPEED_KI             : u8 = 39;
	pub const TORQUE_ENABLE        : u8 = 40;
	pub const ACCELERATION         : u8 = 41;
	pub const GOAL_POSITION        : u8 = 42;
	pub const GOAL_TIME            : u8 = 44;
	pub const GOAL_SPEED           : u8 = 46;
	pub const LOCK                 : u8 = 55;
	pub const PRESENT_POSITION     : u8 = 56;
	pub const PRESENT_SPEED        : u8 = 58;
	pub const PRESENT_LOAD         : u8 = 60;
	pub const PRESENT_VOLTAGE     : u8 = 62;
	pub const PRESENT_TEMPERATURE  : u8 = 63;
	pub const STATUS               : u8 = 65;
	pub const MOVING               : u8 = 66;
	pub const PRESENT_CURRENT      : u8 = 69;
	pub const DEFAULT_MOVING_THRESHOLD : u8 = 80;
	pub const DEFAULT_DTS          : u8 = 81;
	pub const DEFAULT_VK           : u8 = 82;
	pub const DEFAULT_VMIN         : u8 = 83;
	pub const DEFAULT_VMAX         : u8 = 84;
	pub const DEFAULT_AMAX         : u8 = 85;
	pub const DEFAULT_KACC         : u8 = 86;

	/// First address past the EEPROM region.
	pub const EEPROM_END           : u8 = 32;
}

/// One row of the servo control table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
	pub name: &'static str,
	pub address: u8,
	pub size: u8,
	/// Two-byte registers marked signed use sign-magnitude encoding with bit 15 as the sign.
	pub signed: bool,
}

/// Every servo control register, in address order.
#[rustfmt::skip]
pub static REGISTERS: &[Register] = &[
	Register { name: "Model",                        address: address::MODEL,                    size: 2, signed: false },
	Register { name: "ID",                           address: address::ID,                       size: 1, signed: false },
	Register { name: "Baudrate",                     address: address::BAUD_RATE,                size: 1, signed: false },
	Register { name: "Return Delay",                 address: address::RETURN_DELAY,             size: 1, signed: false },
	Register { name: "Response Status Level",        address: address::RESPONSE_LEVEL,           size: 1, signed: false },
	Register { name: "Min Angle Limit",              address: address::MIN_ANGLE_LIMIT,          size: 2, signed: false },
	Register { name: "Max Angle Limit",              address: address::MAX_ANGLE_LIMIT,          size: 2, signed: false },
	Register { name: "Max Temperature Limit",        address: address::MAX_TEMPERATURE,          size: 1, signed: false },
	Register { name: "Max Voltage Limit",            address: address::MAX_VOLTAGE,              size: 1, signed: false },
	Register { name: "Min Voltage Limit",            address: address::MIN_VOLTAGE,              size: 1, signed: false },
	Register { name: "Max Torque Limit",             address: address::MAX_TORQUE,               size: 2, signed: false },
	Register { name: "Phase",                        address: address::PHASE,                    size: 1, signed: false },
	Register { name: "Unloading Condition",          address: address::UNLOADING_CONDITION,      size: 1, signed: false },
	Register { name: "LED Alarm Condition",          address: address::LED_ALARM_CONDITION,      size: 1, signed: false },
	Register { name: "P Coefficient",                address: address::KP,                       size: 1, signed: false },
	Register { name: "D Coefficient",                address: address::KD,                       size: 1, signed: false },
	Register { name: "I Coefficient",                address: address::KI,                       size: 1, signed: false },
	Register { name: "Minimum Startup Force",        address: address::MIN_STARTUP_FORCE,        size: 2, signed: false },
	Register { name: "CW Dead Zone",                 address: address::CW_DEAD_ZONE,             size: 1, signed: false },
	Register { name: "CCW Dead Zone",                address: address::CCW_DEAD_ZONE,            size: 1, signed: false },
	Register { name: "Protection Current",           address: address::PROTECTION_CURRENT,       size: 2, signed: false },
	Register { name: "Angular Resolution",           address: address::ANGULAR_RESOLUTION,       size: 1, signed: false },
	Register { name: "Offset",                       address: address::OFFSET,                   size: 2, signed: false },
	Register { name: "Mode",                         address: address::MODE,                     size: 1, signed: false },
	Register { name: "Protective Torque",            address: address::PROTECTIVE_TORQUE,        size: 1, signed: false },
	Register { name: "Protection Time",              address: address::PROTECTION_TIME,          size: 1, signed: false },
	Register { name: "Overload Torque",              address: address::OVERLOAD_TORQUE,          size: 1, signed: false },
	Register { name: "Speed Loop P Coefficient",     address: address::SPEED_KP,                 size: 1, signed: false },
	Register { name: "Over Current Protection Time", address: address::OVERCURRENT_TIME,         size: 1, signed: false },
	Register { name: "Speed Loop I Coefficient",     address: address::SPEED_KI,                 size: 1, signed: false },
	Register { name: "Torque Enable",                address: address::TORQUE_ENABLE,            size: 1, signed: false },
	Register { name: "Acceleration",                 address: address::ACCELERATION,             size: 1, signed: false },
	Register { name: "Goal Position",                address: address::GOAL_POSITION,            size: 2, signed: false },
	Register { name: "Goal Time",                    address: address::GOAL_TIME,                size: 2, signed: false },
	Register { name: "Goal Speed",                   address: address::GOAL_SPEED,               size: 2, signed: true  },
	Register { name: "Lock",                         address: address::LOCK,                     size: 1, signed: false },
	Register { name: "Present Position",             address: address::PRESENT_POSITION,         size: 2, signed: false },
	Register { name: "Present Speed",                address: address::PRESENT_SPEED,            size: 2, signed: true  },
	Register { name: "Present Load",                 address: address::PRESENT_LOAD,             size: 2, signed: true  },
	Register { name: "Present Voltage",              address: address::PRESENT_VOLTAGE,          size: 1, signed: false },
	Register { name: "Present Temperature",          address: address::PRESENT_TEMPERATURE,      size: 1, signed: false },
	Register { name: "Status",                       address: address::STATUS,                   size: 1, signed: false },
	Register { name: "Moving",                       address: address::MOVING,                   size: 1, signed: false },
	Register { name: "Present Current",              address: address::PRESENT_CURRENT,          size: 2, signed: false },
	Register { name: "Default Moving Threshold",     address: address::DEFAULT_MOVING_THRESHOLD, size: 1, signed: false },
	Register { name: "Default DTS",                  address: address::DEFAULT_DTS,              size: 1, signed: false },
	Register { name: "Default VK",                   address: address::DEFAULT_VK,               size: 1, signed: false },
	Register { name: "Default VMIN",                 address: address::DEFAULT_VMIN,             size: 1, signed: false },
	Register { name: "Default VMAX",                 address: address::DEFAULT_VMAX,             size: 1, signed: false },
	Register { name: "Default AMAX",                 address: address::DEFAULT_AMAX,             size: 1, signed: false },
	Register { name: "Default KACC",                 address: address::DEFAULT_KACC,             size: 1, signed: false },
];

/// Look up a register by address.
pub fn find_register(address: u8) -> Option<&'static Register> {
	REGISTERS.iter().find(|register| register.address == address)
}

/// The servo model, as reported by the model-number register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
	Sts3215,
	Sts3250,
	Unknown(u16),
}

impl Model {
	/// Translate a model-number register value.
	pub fn from_number(model_number: u16) -> Self {
		match model_number {
			777 => Self::Sts3215,
			2825 => Self::Sts3250,
			other => Self::Unknown(other),
		}
	}
}

impl std::fmt::Display for Model {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Sts3215 => write!(f, "STS3215"),
			Self::Sts3250 => write!(f, "STS3250"),
			Self::Unknown(number) => write!(f, "Unknown Model {}", number),
		}
	}
}
