//! Bulk position reads from multiple servos in one bus exchange.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::bus::Bus;
use crate::endian::{self, Endian};
use crate::error::CommError;
use crate::serial_port::SerialPort;

/// Default freshness window for cached samples.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Participant {
	/// Error byte followed by the captured data window. Empty until the first good read.
	frame: Vec<u8>,

	/// When the cached frame was last refreshed.
	last_ok: Option<Instant>,
}

/// A stateful sync-read helper.
///
/// Holds the participant set and, per participant, the latest successfully
/// read frame with its timestamp. A failed read keeps the previous frame;
/// [`Self::available`] reports a sample only while it is younger than the
/// freshness window, so repeated failures surface as staleness rather than
/// data loss.
pub struct SyncReader {
	start_address: u8,
	data_length: u8,
	max_age: Duration,
	participants: BTreeMap<u8, Participant>,

	/// Participant list as transmitted, rebuilt lazily after membership edits.
	id_cache: Vec<u8>,
	dirty: bool,
}

impl SyncReader {
	/// Create a reader for a fixed register window.
	pub fn new(start_address: u8, data_length: u8) -> Self {
		Self::with_max_age(start_address, data_length, DEFAULT_MAX_AGE)
	}

	/// Create a reader with a custom sample freshness window.
	pub fn with_max_age(start_address: u8, data_length: u8, max_age: Duration) -> Self {
		Self {
			start_address,
			data_length,
			max_age,
			participants: BTreeMap::new(),
			id_cache: Vec::new(),
			dirty: false,
		}
	}

	/// Enroll a servo. Returns false if it is already a participant.
	pub fn add(&mut self, motor_id: u8) -> bool {
		if self.participants.contains_key(&motor_id) {
			return false;
		}
		self.participants.insert(
			motor_id,
			Participant {
				frame: Vec::new(),
				last_ok: None,
			},
		);
		self.dirty = true;
		true
	}

	/// Remove a servo from the participant set.
	pub fn remove(&mut self, motor_id: u8) {
		if self.participants.remove(&motor_id).is_some() {
			self.dirty = true;
		}
	}

	/// Remove all participants.
	pub fn clear(&mut self) {
		self.participants.clear();
		self.id_cache.clear();
		self.dirty = false;
	}

	/// Check whether a servo is enrolled.
	pub fn contains(&self, motor_id: u8) -> bool {
		self.participants.contains_key(&motor_id)
	}

	/// The enrolled servo IDs in ascending order.
	pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
		self.participants.keys().copied()
	}

	pub fn len(&self) -> usize {
		self.participants.len()
	}

	pub fn is_empty(&self) -> bool {
		self.participants.is_empty()
	}

	/// Perform one sync-read exchange and refresh the per-participant caches.
	///
	/// Returns `Ok(true)` when every participant produced a valid frame.
	/// A silent or partially silent bus is not an error: stale participants
	/// keep their previous frame and the result is `Ok(false)`, leaving the
	/// staleness judgement to the caller. Only failures that prevented the
	/// exchange itself (port busy, TX failure, I/O errors) are returned as
	/// errors.
	pub fn txrx<T: SerialPort>(&mut self, bus: &mut Bus<T>) -> Result<bool, CommError> {
		if self.participants.is_empty() {
			return Err(CommError::NotAvailable);
		}
		if self.dirty {
			self.id_cache = self.participants.keys().copied().collect();
			self.dirty = false;
		}

		bus.sync_read_tx(self.start_address, self.data_length, &self.id_cache)?;
		let burst = match bus.sync_read_rx(self.data_length, self.id_cache.len()) {
			Ok(burst) => burst,
			Err(CommError::RxTimeout) => {
				debug!("sync read: no replies within the timeout window");
				Vec::new()
			},
			Err(e) => return Err(e),
		};

		let now = Instant::now();
		let mut all_fresh = true;
		for (&motor_id, participant) in &mut self.participants {
			match extract_frame(&burst, motor_id, self.data_length) {
				Some(frame) => {
					participant.frame = frame;
					participant.last_ok = Some(now);
				},
				None => all_fresh = false,
			}
		}
		Ok(all_fresh)
	}

	/// Check whether a fresh sample covers `[address, address + count)`.
	///
	/// Returns the servo error byte of the cached frame when the servo is
	/// enrolled, the window lies inside the captured region and the sample is
	/// younger than the freshness limit.
	pub fn available(&self, motor_id: u8, address: u8, count: u8) -> Option<u8> {
		let participant = self.participants.get(&motor_id)?;
		let start = u16::from(self.start_address);
		let end = start + u16::from(self.data_length);
		let window_start = u16::from(address);
		let window_end = window_start + u16::from(count);
		if window_start < start || window_end > end {
			return None;
		}
		if participant.frame.len() < self.data_length as usize + 1 {
			return None;
		}
		let last_ok = participant.last_ok?;
		if last_ok.elapsed() > self.max_age {
			return None;
		}
		Some(participant.frame[0])
	}

	/// Read a byte out of the cached frame.
	pub fn get_u8(&self, motor_id: u8, address: u8) -> Option<u8> {
		let participant = self.participants.get(&motor_id)?;
		let offset = address.checked_sub(self.start_address)? as usize;
		participant.frame.get(offset + 1).copied()
	}

	/// Decode a two byte value out of the cached frame.
	pub fn get_u16(&self, motor_id: u8, address: u8, endian: Endian) -> Option<u16> {
		let participant = self.participants.get(&motor_id)?;
		let offset = address.checked_sub(self.start_address)? as usize;
		let bytes = participant.frame.get(offset + 1..offset + 3)?;
		Some(endian::decode_u16(bytes, endian))
	}
}

/// Locate and verify the status subframe for one servo inside a reply burst.
///
/// Subframes look like `FF FF id LEN ERR payload… chk` with
/// `LEN = data_length + 2`. Returns the error byte followed by the payload.
fn extract_frame(burst: &[u8], motor_id: u8, data_length: u8) -> Option<Vec<u8>> {
	let data_length = data_length as usize;
	let mut index = 0;
	loop {
		// Find the next FF FF id.
		while index + 3 <= burst.len() {
			if burst[index] == 0xFF && burst[index + 1] == 0xFF && burst[index + 2] == motor_id {
				break;
			}
			index += 1;
		}
		if index + 3 > burst.len() {
			return None;
		}

		// id LEN ERR payload chk
		let body = &burst[index + 2..];
		if body.len() < data_length + 4 {
			return None;
		}
		if body[1] != data_length as u8 + 2 {
			index += 1;
			continue;
		}
		let error = body[2];
		let payload = &body[3..3 + data_length];
		let checksum = body[3 + data_length];

		let mut sum = motor_id.wrapping_add(data_length as u8 + 2).wrapping_add(error);
		for &byte in payload {
			sum = sum.wrapping_add(byte);
		}
		if !sum != checksum {
			return None;
		}

		let mut frame = Vec::with_capacity(data_length + 1);
		frame.push(error);
		frame.extend_from_slice(payload);
		return Some(frame);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	fn frame_for(motor_id: u8, payload: &[u8]) -> Vec<u8> {
		let mut frame = vec![0xFF, 0xFF, motor_id, payload.len() as u8 + 2, 0x00];
		frame.extend_from_slice(payload);
		let sum = frame[2..].iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
		frame.push(!sum);
		frame
	}

	#[test]
	fn test_extract_frame() {
		let mut burst = frame_for(11, &[0x39, 0x09]);
		burst.extend(frame_for(12, &[0x00, 0x08]));

		assert!(extract_frame(&burst, 11, 2) == Some(vec![0x00, 0x39, 0x09]));
		assert!(extract_frame(&burst, 12, 2) == Some(vec![0x00, 0x00, 0x08]));
		assert!(extract_frame(&burst, 13, 2) == None);
	}

	#[test]
	fn test_extract_frame_skips_garbage() {
		let mut burst = vec![0x00, 0xFF, 0x12];
		burst.extend(frame_for(11, &[0x39, 0x09]));
		assert!(extract_frame(&burst, 11, 2) == Some(vec![0x00, 0x39, 0x09]));
	}

	#[test]
	fn test_extract_frame_rejects_bad_checksum() {
		let mut burst = frame_for(11, &[0x39, 0x09]);
		let last = burst.len() - 1;
		burst[last] ^= 0xFF;
		assert!(extract_frame(&burst, 11, 2) == None);
	}

	#[test]
	fn test_membership() {
		let mut reader = SyncReader::new(56, 2);
		assert!(reader.add(11));
		assert!(reader.add(13));
		assert!(reader.add(12));
		assert!(!reader.add(11));
		assert!(reader.ids().collect::<Vec<_>>() == [11, 12, 13]);
		reader.remove(12);
		assert!(reader.ids().collect::<Vec<_>>() == [11, 13]);
		assert!(!reader.contains(12));
		reader.clear();
		assert!(reader.is_empty());
	}

	#[test]
	fn test_available_checks_window_and_freshness() {
		let mut reader = SyncReader::with_max_age(56, 2, Duration::from_millis(5));
		reader.add(11);

		// No frame captured yet.
		assert!(reader.available(11, 56, 2) == None);

		let participant = reader.participants.get_mut(&11).unwrap();
		participant.frame = vec![0x00, 0x39, 0x09];
		participant.last_ok = Some(Instant::now());

		assert!(reader.available(11, 56, 2) == Some(0));
		assert!(reader.get_u16(11, 56, Endian::Sts) == Some(0x0939));

		// Outside the captured window.
		assert!(reader.available(11, 55, 2) == None);
		assert!(reader.available(11, 57, 2) == None);

		// Sample ages out.
		std::thread::sleep(Duration::from_millis(10));
		assert!(reader.available(11, 56, 2) == None);
	}
}
