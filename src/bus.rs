//! Low level interface to an SCServo / Dynamixel protocol 1.0 bus.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::checksum::calculate_checksum;
use crate::endian::{self, Endian};
use crate::error::CommError;
use crate::instructions::{instruction_id, packet_id};
use crate::registers::address;
use crate::serial_port::SerialPort;

/// Every packet starts with two header bytes.
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

pub(crate) const PKT_ID: usize = 2;
pub(crate) const PKT_LENGTH: usize = 3;
pub(crate) const PKT_ERROR: usize = 4;
pub(crate) const PKT_PARAMETER0: usize = 5;

/// The smallest possible frame: header, ID, length, error, checksum.
pub(crate) const MIN_FRAME_LEN: usize = 6;

/// The LEN field counts everything after itself, capped by the wire format.
const MAX_PACKET_LEN: usize = 250;

/// 0xFE is broadcast and 0xFF is reserved, so no status packet carries them.
const MAX_SANE_ID: u8 = 0xFD;

/// Bits above 0x7F in the error byte have other uses on some variants.
const ERR_MASK_MAX: u8 = 0x7F;

/// Fixed slack added to every packet timeout to absorb USB adapter latency.
const LATENCY: Duration = Duration::from_micros(40);

/// Floor for the computed packet timeout.
const MIN_TIMEOUT: Duration = Duration::from_micros(1_000);

/// Hard ceiling for the computed packet timeout.
///
/// A stalled bus must never starve the control cadence: whatever the
/// expected byte count, one exchange may not hold the loop longer than this.
const MAX_BUSY: Duration = Duration::from_micros(8_000);

/// Extra reply window for EEPROM-region writes while the servo commits to flash.
const EEPROM_SETTLE: Duration = Duration::from_millis(100);

/// A parsed status packet.
#[derive(Debug, Clone)]
pub struct StatusPacket {
	raw: Vec<u8>,
}

impl StatusPacket {
	/// The ID of the servo that sent the packet.
	pub fn id(&self) -> u8 {
		self.raw[PKT_ID]
	}

	/// The servo error byte.
	pub fn error(&self) -> u8 {
		self.raw[PKT_ERROR]
	}

	/// The packet parameters.
	pub fn parameters(&self) -> &[u8] {
		&self.raw[PKT_PARAMETER0..self.raw.len() - 1]
	}

	/// The whole frame including header and checksum.
	pub fn as_bytes(&self) -> &[u8] {
		&self.raw
	}
}

/// Low level interface to the servo bus.
///
/// Builds and transmits instruction packets and receives status packets,
/// with header resync, inter-byte gap detection and checksum verification
/// on the receive path. All multi-byte register helpers honour the
/// configured [`Endian`].
pub struct Bus<T> {
	port: T,
	baud_rate: u32,
	endian: Endian,

	/// Receiving stops when the line goes idle for this long mid-packet.
	idle_gap: Duration,

	/// Start of the current packet timeout window.
	packet_start: Instant,

	/// Length of the current packet timeout window.
	packet_timeout: Duration,

	/// Set between the TX and RX halves of a sync read.
	in_flight: bool,
}

/// The inter-byte gap limit is this many character times.
const IDLE_GAP_CHARS: u32 = 20;

fn char_time(baud_rate: u32) -> Duration {
	// 10 bits per character: 1 start, 8 data, 1 stop.
	Duration::from_nanos(10 * 1_000_000_000 / u64::from(baud_rate))
}

impl<T: SerialPort> Bus<T> {
	/// Create a bus over an already configured serial port.
	///
	/// The port must be in raw mode with the given baud rate,
	/// character size 8, no parity and one stop bit.
	pub fn new(port: T, baud_rate: u32, endian: Endian) -> Self {
		Self {
			port,
			baud_rate,
			endian,
			idle_gap: char_time(baud_rate) * IDLE_GAP_CHARS,
			packet_start: Instant::now(),
			packet_timeout: Duration::ZERO,
			in_flight: false,
		}
	}

	/// Get the baud rate of the bus.
	pub fn baud_rate(&self) -> u32 {
		self.baud_rate
	}

	/// Set the baud rate of the underlying serial port.
	pub fn set_baud_rate(&mut self, baud_rate: u32) -> std::io::Result<()> {
		self.port.set_baud_rate(baud_rate)?;
		self.baud_rate = baud_rate;
		self.idle_gap = char_time(baud_rate) * IDLE_GAP_CHARS;
		Ok(())
	}

	/// Get the byte order used for multi-byte register values.
	pub fn endian(&self) -> Endian {
		self.endian
	}

	/// Get a reference to the underlying serial port.
	pub fn port(&self) -> &T {
		&self.port
	}

	/// Start a packet timeout window sized for `expected_bytes` on the wire.
	///
	/// The window is `expected_bytes * 10 bits` at the current baud rate plus
	/// a fixed latency allowance, clamped into `[MIN_TIMEOUT, MAX_BUSY]`;
	/// `extra` is added after clamping.
	pub fn set_packet_timeout(&mut self, expected_bytes: usize, extra: Duration) {
		let on_wire = char_time(self.baud_rate) * expected_bytes as u32 + LATENCY;
		self.packet_timeout = on_wire.clamp(MIN_TIMEOUT, MAX_BUSY) + extra;
		self.packet_start = Instant::now();
	}

	/// Check whether the current packet timeout window has closed.
	pub fn is_packet_timeout(&self) -> bool {
		self.packet_start.elapsed() > self.packet_timeout
	}

	/// Build and transmit one instruction packet.
	pub fn tx_packet(&mut self, motor_id: u8, instruction: u8, parameters: &[u8]) -> Result<(), CommError> {
		if self.in_flight {
			return Err(CommError::PortBusy);
		}
		let total_len = parameters.len() + MIN_FRAME_LEN;
		if total_len > MAX_PACKET_LEN {
			return Err(CommError::TxMalformed);
		}

		let mut frame = Vec::with_capacity(total_len);
		frame.extend_from_slice(&HEADER);
		frame.push(motor_id);
		frame.push(parameters.len() as u8 + 2);
		frame.push(instruction);
		frame.extend_from_slice(parameters);
		frame.push(calculate_checksum(&frame[PKT_ID..]));

		// Drop stale reply bytes from earlier exchanges before transmitting.
		self.port.discard_input_buffer().map_err(CommError::Io)?;

		trace!("sending instruction: {:02X?}", frame);
		self.port.write_all(&frame).map_err(CommError::TxFail)?;
		Ok(())
	}

	/// Receive and parse a single status packet.
	///
	/// Reads the port non-blocking until a full frame is assembled, discarding
	/// leading garbage until the `FF FF` header aligns and dropping one byte to
	/// resync whenever the ID, length or error field is implausible. Receiving
	/// aborts when the inter-byte gap exceeds roughly twenty character times or
	/// the packet timeout window closes.
	pub fn rx_packet(&mut self) -> Result<StatusPacket, CommError> {
		let mut packet: Vec<u8> = Vec::with_capacity(MIN_FRAME_LEN);
		let mut wait_length = MIN_FRAME_LEN;
		let mut chunk = [0u8; 256];
		let mut last_byte = Instant::now();
		let mut first_byte_seen = false;

		loop {
			let want = wait_length.saturating_sub(packet.len()).min(chunk.len());
			if want > 0 {
				let count = self.port.read(&mut chunk[..want]).map_err(CommError::Io)?;
				if count > 0 {
					packet.extend_from_slice(&chunk[..count]);
					last_byte = Instant::now();
					first_byte_seen = true;
				} else if first_byte_seen && last_byte.elapsed() > self.idle_gap {
					debug!("rx gap exceeded idle threshold, aborting packet");
					return Err(CommError::RxCorrupt);
				}
			}

			if packet.len() < wait_length {
				if self.is_packet_timeout() {
					return Err(if packet.is_empty() {
						CommError::RxTimeout
					} else {
						CommError::RxCorrupt
					});
				}
				continue;
			}

			// Realign on the FF FF header.
			if packet[..2] != HEADER {
				while packet.len() >= 2 && packet[..2] != HEADER {
					packet.remove(0);
				}
				first_byte_seen = false;
				last_byte = Instant::now();
				wait_length = MIN_FRAME_LEN;
				continue;
			}

			// Sanity-check ID, length and error before trusting the length field.
			// LEN counts at least the error byte and the checksum.
			let length = packet[PKT_LENGTH] as usize;
			if packet[PKT_ID] > MAX_SANE_ID || !(2..=MAX_PACKET_LEN).contains(&length) || packet[PKT_ERROR] > ERR_MASK_MAX {
				debug!("status header failed sanity check, resyncing");
				packet.remove(0);
				first_byte_seen = false;
				last_byte = Instant::now();
				wait_length = MIN_FRAME_LEN;
				continue;
			}

			wait_length = 4 + length;
			if packet.len() < wait_length {
				continue;
			}

			packet.truncate(wait_length);
			trace!("read status packet: {:02X?}", packet);
			let checksum = calculate_checksum(&packet[PKT_ID..wait_length - 1]);
			return if packet[wait_length - 1] == checksum {
				Ok(StatusPacket { raw: packet })
			} else {
				Err(CommError::RxCorrupt)
			};
		}
	}

	/// Transmit an instruction and collect the matching status packet.
	///
	/// Broadcast instructions return immediately without waiting for a reply.
	/// Otherwise status packets are parsed until one carries the destination
	/// ID or the reply window closes.
	fn transfer(
		&mut self,
		motor_id: u8,
		instruction: u8,
		parameters: &[u8],
		expected_parameters: usize,
		extra_timeout: Duration,
	) -> Result<Option<StatusPacket>, CommError> {
		self.tx_packet(motor_id, instruction, parameters)?;
		if motor_id == packet_id::BROADCAST {
			return Ok(None);
		}

		self.set_packet_timeout(MIN_FRAME_LEN + expected_parameters, extra_timeout);
		loop {
			let packet = self.rx_packet()?;
			if packet.id() == motor_id {
				return Ok(Some(packet));
			}
		}
	}

	/// Ping a servo and read back its model number.
	pub fn ping(&mut self, motor_id: u8) -> Result<u16, CommError> {
		if motor_id >= packet_id::BROADCAST {
			return Err(CommError::NotAvailable);
		}
		self.transfer(motor_id, instruction_id::PING, &[], 0, Duration::ZERO)?;
		self.read_u16(motor_id, address::MODEL)
	}

	/// Read `count` bytes starting at `address`.
	pub fn read(&mut self, motor_id: u8, address: u8, count: u8) -> Result<StatusPacket, CommError> {
		if motor_id >= packet_id::BROADCAST {
			return Err(CommError::NotAvailable);
		}
		let packet = self
			.transfer(
				motor_id,
				instruction_id::READ,
				&[address, count],
				count as usize,
				Duration::ZERO,
			)?
			.expect("read is never broadcast");
		if packet.parameters().len() < count as usize {
			return Err(CommError::RxCorrupt);
		}
		Ok(packet)
	}

	/// Read a single byte register.
	pub fn read_u8(&mut self, motor_id: u8, address: u8) -> Result<u8, CommError> {
		let packet = self.read(motor_id, address, 1)?;
		Ok(packet.parameters()[0])
	}

	/// Read a two byte register.
	pub fn read_u16(&mut self, motor_id: u8, address: u8) -> Result<u16, CommError> {
		let packet = self.read(motor_id, address, 2)?;
		Ok(endian::decode_u16(packet.parameters(), self.endian))
	}

	/// Read a four byte register.
	pub fn read_u32(&mut self, motor_id: u8, address: u8) -> Result<u32, CommError> {
		let packet = self.read(motor_id, address, 4)?;
		Ok(endian::decode_u32(packet.parameters(), self.endian))
	}

	/// Write raw bytes starting at `address`, returning the servo error byte.
	///
	/// EEPROM-region writes get extra reply slack because the servo commits
	/// the value to flash before answering.
	pub fn write(&mut self, motor_id: u8, address: u8, data: &[u8]) -> Result<u8, CommError> {
		let mut parameters = Vec::with_capacity(data.len() + 1);
		parameters.push(address);
		parameters.extend_from_slice(data);
		let extra = if address < address::EEPROM_END {
			EEPROM_SETTLE
		} else {
			Duration::ZERO
		};
		let reply = self.transfer(motor_id, instruction_id::WRITE, &parameters, 0, extra)?;
		Ok(reply.map(|packet| packet.error()).unwrap_or(0))
	}

	/// Write a single byte register.
	pub fn write_u8(&mut self, motor_id: u8, address: u8, value: u8) -> Result<u8, CommError> {
		self.write(motor_id, address, &[value])
	}

	/// Write a two byte register.
	pub fn write_u16(&mut self, motor_id: u8, address: u8, value: u16) -> Result<u8, CommError> {
		self.write(motor_id, address, &endian::encode_u16(value, self.endian))
	}

	/// Write a four byte register.
	pub fn write_u32(&mut self, motor_id: u8, address: u8, value: u32) -> Result<u8, CommError> {
		self.write(motor_id, address, &endian::encode_u32(value, self.endian))
	}

	/// Stage a deferred write, to be committed later by [`Self::action`].
	pub fn reg_write(&mut self, motor_id: u8, address: u8, data: &[u8]) -> Result<u8, CommError> {
		let mut parameters = Vec::with_capacity(data.len() + 1);
		parameters.push(address);
		parameters.extend_from_slice(data);
		let reply = self.transfer(motor_id, instruction_id::REG_WRITE, &parameters, 0, Duration::ZERO)?;
		Ok(reply.map(|packet| packet.error()).unwrap_or(0))
	}

	/// Commit writes staged with [`Self::reg_write`].
	pub fn action(&mut self, motor_id: u8) -> Result<(), CommError> {
		self.transfer(motor_id, instruction_id::ACTION, &[], 0, Duration::ZERO)?;
		Ok(())
	}

	/// Transmit a sync read for `data_length` bytes at `start_address` from every id in `motor_ids`.
	///
	/// The port stays reserved for the reply burst until
	/// [`Self::sync_read_rx`] collects it.
	pub fn sync_read_tx(&mut self, start_address: u8, data_length: u8, motor_ids: &[u8]) -> Result<(), CommError> {
		let mut parameters = Vec::with_capacity(motor_ids.len() + 2);
		parameters.push(start_address);
		parameters.push(data_length);
		parameters.extend_from_slice(motor_ids);
		self.tx_packet(packet_id::BROADCAST, instruction_id::SYNC_READ, &parameters)?;
		self.set_packet_timeout((MIN_FRAME_LEN + data_length as usize) * motor_ids.len(), Duration::ZERO);
		self.in_flight = true;
		Ok(())
	}

	/// Collect the reply burst of a sync read.
	///
	/// Returns whatever bytes arrived before the packet timeout window closed;
	/// a short burst is not an error here, the caller judges per participant.
	/// An entirely empty exchange is [`CommError::RxTimeout`].
	pub fn sync_read_rx(&mut self, data_length: u8, participant_count: usize) -> Result<Vec<u8>, CommError> {
		let wait_length = (MIN_FRAME_LEN + data_length as usize) * participant_count;
		let mut burst = Vec::with_capacity(wait_length);
		let mut chunk = [0u8; 256];

		let result = loop {
			let want = (wait_length - burst.len()).min(chunk.len());
			let count = match self.port.read(&mut chunk[..want]) {
				Ok(count) => count,
				Err(e) => {
					self.in_flight = false;
					return Err(CommError::Io(e));
				},
			};
			burst.extend_from_slice(&chunk[..count]);
			if burst.len() >= wait_length {
				break Ok(burst);
			}
			if self.is_packet_timeout() {
				if burst.is_empty() {
					break Err(CommError::RxTimeout);
				}
				// Partial burst: some participants stayed silent.
				break Ok(burst);
			}
		};
		self.in_flight = false;
		result
	}

	/// Transmit a sync write: one broadcast frame carrying a payload per participant.
	///
	/// No reply is ever sent for a broadcast, so this returns after the TX.
	pub fn sync_write_tx(&mut self, start_address: u8, data_length: u8, parameters: &[u8]) -> Result<(), CommError> {
		let mut frame_parameters = Vec::with_capacity(parameters.len() + 2);
		frame_parameters.push(start_address);
		frame_parameters.push(data_length);
		frame_parameters.extend_from_slice(parameters);
		self.tx_packet(packet_id::BROADCAST, instruction_id::SYNC_WRITE, &frame_parameters)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_port::TestPort;
	use assert2::assert;

	fn test_bus() -> Bus<TestPort> {
		Bus::new(TestPort::new(), 500_000, Endian::Sts)
	}

	#[test]
	fn test_tx_packet_framing() {
		let mut bus = test_bus();
		bus.tx_packet(0x01, instruction_id::PING, &[]).unwrap();
		assert!(bus.port.tx == [0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
	}

	#[test]
	fn test_tx_write_framing() {
		let mut bus = test_bus();
		bus.write_u16(0x0B, address::GOAL_POSITION, 0x09FF).unwrap_err();
		// The write itself times out (no reply queued), but the frame must be on the wire.
		let expected_checksum = !(0x0Bu8
			.wrapping_add(0x05)
			.wrapping_add(0x03)
			.wrapping_add(address::GOAL_POSITION)
			.wrapping_add(0xFF)
			.wrapping_add(0x09));
		assert!(
			bus.port.tx == [0xFF, 0xFF, 0x0B, 0x05, 0x03, address::GOAL_POSITION, 0xFF, 0x09, expected_checksum]
		);
	}

	#[test]
	fn test_rx_packet_parses_valid_frame() {
		let mut bus = test_bus();
		// ID 0x0B, LEN 2, ERR 0, checksum.
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0x00, 0xF2]);
		bus.set_packet_timeout(MIN_FRAME_LEN, Duration::ZERO);
		let packet = bus.rx_packet().unwrap();
		assert!(packet.id() == 0x0B);
		assert!(packet.error() == 0x00);
		assert!(packet.parameters().is_empty());
	}

	#[test]
	fn test_rx_packet_resyncs_on_leading_garbage() {
		let mut bus = test_bus();
		let frame = [0xFF, 0xFF, 0x0B, 0x04, 0x00, 0x39, 0x09, 0xAE];
		bus.port.feed(&[0x00]);
		bus.port.feed(&frame);
		bus.port.feed(&frame);
		bus.set_packet_timeout(MIN_FRAME_LEN + 2, Duration::ZERO);

		let packet = bus.rx_packet().unwrap();
		assert!(packet.id() == 0x0B);
		assert!(packet.parameters() == [0x39, 0x09]);

		// Exactly one frame was consumed: the second one is still in the port.
		let remaining: Vec<u8> = bus.port.rx.iter().copied().collect();
		assert!(remaining == frame);
	}

	#[test]
	fn test_rx_packet_drops_bad_header_byte() {
		let mut bus = test_bus();
		// A spurious FF FF with an implausible error byte, then a valid frame.
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0xFF, 0x00]);
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0x00, 0xF2]);
		bus.set_packet_timeout(MIN_FRAME_LEN * 2, Duration::ZERO);
		let packet = bus.rx_packet().unwrap();
		assert!(packet.id() == 0x0B);
		assert!(packet.error() == 0x00);
	}

	#[test]
	fn test_rx_packet_rejects_bad_checksum() {
		let mut bus = test_bus();
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0x00, 0x00]);
		bus.set_packet_timeout(MIN_FRAME_LEN, Duration::ZERO);
		let error = bus.rx_packet().unwrap_err();
		assert!(matches!(error, CommError::RxCorrupt));
	}

	#[test]
	fn test_rx_packet_times_out_on_silence() {
		let mut bus = test_bus();
		bus.set_packet_timeout(MIN_FRAME_LEN, Duration::ZERO);
		let error = bus.rx_packet().unwrap_err();
		assert!(matches!(error, CommError::RxTimeout));
	}

	#[test]
	fn test_rx_packet_partial_frame_is_corrupt() {
		let mut bus = test_bus();
		bus.port.feed(&[0xFF, 0xFF, 0x0B]);
		bus.set_packet_timeout(MIN_FRAME_LEN, Duration::ZERO);
		let error = bus.rx_packet().unwrap_err();
		// The inter-byte gap or the timeout fires first depending on timing;
		// either way a half frame is corrupt, not a timeout.
		assert!(matches!(error, CommError::RxCorrupt));
	}

	#[test]
	fn test_ping_reads_model_number() {
		let mut bus = test_bus();
		// Ping reply, then the model-number read reply (777 = 0x0309).
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0x00, 0xF2]);
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x04, 0x00, 0x09, 0x03, 0xE4]);
		let model = bus.ping(0x0B).unwrap();
		assert!(model == 777);
	}

	#[test]
	fn test_ping_broadcast_is_not_available() {
		let mut bus = test_bus();
		let error = bus.ping(packet_id::BROADCAST).unwrap_err();
		assert!(matches!(error, CommError::NotAvailable));
	}

	#[test]
	fn test_reg_write_then_action() {
		let mut bus = test_bus();
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0x00, 0xF2]);
		bus.reg_write(0x0B, address::GOAL_POSITION, &[0xFF, 0x09]).unwrap();
		assert!(bus.port.tx[4] == instruction_id::REG_WRITE);

		bus.port.tx.clear();
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x02, 0x00, 0xF2]);
		bus.action(0x0B).unwrap();
		assert!(bus.port.tx == [0xFF, 0xFF, 0x0B, 0x02, 0x05, 0xED]);
	}

	#[test]
	fn test_sync_read_rx_partial_burst() {
		let mut bus = test_bus();
		bus.sync_read_tx(address::PRESENT_POSITION, 2, &[11, 12]).unwrap();
		// Only servo 11 answers: 8 of the expected 16 bytes.
		bus.port.feed(&[0xFF, 0xFF, 0x0B, 0x04, 0x00, 0x39, 0x09, 0xAE]);
		let burst = bus.sync_read_rx(2, 2).unwrap();
		assert!(burst.len() == 8);
	}

	#[test]
	fn test_sync_read_reserves_port() {
		let mut bus = test_bus();
		bus.sync_read_tx(address::PRESENT_POSITION, 2, &[11]).unwrap();
		let error = bus.tx_packet(11, instruction_id::PING, &[]).unwrap_err();
		assert!(matches!(error, CommError::PortBusy));
		let _ = bus.sync_read_rx(2, 1);
		bus.tx_packet(11, instruction_id::PING, &[]).unwrap();
	}

	#[test]
	fn test_sync_write_framing() {
		let mut bus = test_bus();
		bus.sync_write_tx(address::GOAL_POSITION, 2, &[0x0B, 0xFF, 0x09]).unwrap();
		let frame = &bus.port.tx;
		assert!(frame[..2] == HEADER);
		assert!(frame[PKT_ID] == packet_id::BROADCAST);
		assert!(frame[4] == instruction_id::SYNC_WRITE);
		assert!(frame[5] == address::GOAL_POSITION);
		assert!(frame[6] == 2);
		assert!(frame[7..10] == [0x0B, 0xFF, 0x09]);
		let expected = calculate_checksum(&frame[PKT_ID..frame.len() - 1]);
		assert!(*frame.last().unwrap() == expected);
	}
}
