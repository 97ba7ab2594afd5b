//! Instruction and packet ID constants for the SCServo protocol.

#[rustfmt::skip]
pub mod instruction_id {
	pub const PING       : u8 = 0x01;
	pub const READ       : u8 = 0x02;
	pub const WRITE      : u8 = 0x03;
	pub const REG_WRITE  : u8 = 0x04;
	pub const ACTION     : u8 = 0x05;
	pub const SYNC_READ  : u8 = 0x82;
	pub const SYNC_WRITE : u8 = 0x83;
}

pub mod packet_id {
	/// Address every servo on the bus at once. Broadcast reads are not possible.
	pub const BROADCAST: u8 = 0xFE;

	/// The highest assignable servo ID. 0xFD is reserved.
	pub const MAX: u8 = 0xFC;
}
