//! Bulk register writes to multiple servos in one broadcast frame.

use std::collections::BTreeMap;

use crate::bus::Bus;
use crate::error::CommError;
use crate::serial_port::SerialPort;

/// A stateful sync-write helper.
///
/// Collects per-servo payloads for a fixed register window and emits them as
/// a single broadcast SYNC_WRITE. Participants are always transmitted in
/// ascending ID order so bus traces stay deterministic.
pub struct SyncWriter {
	start_address: u8,
	data_length: u8,
	entries: BTreeMap<u8, Vec<u8>>,
}

impl SyncWriter {
	/// Create a writer for a fixed register window.
	pub fn new(start_address: u8, data_length: u8) -> Self {
		Self {
			start_address,
			data_length,
			entries: BTreeMap::new(),
		}
	}

	/// Drop all staged payloads.
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// Stage a payload for one servo, replacing any previous one.
	///
	/// Returns false when the payload does not match the configured data length.
	pub fn push(&mut self, motor_id: u8, payload: &[u8]) -> bool {
		if payload.len() != self.data_length as usize {
			return false;
		}
		self.entries.insert(motor_id, payload.to_vec());
		true
	}

	/// The staged servo IDs in ascending order.
	pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
		self.entries.keys().copied()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Transmit the staged payloads as one broadcast frame.
	///
	/// Broadcasts receive no status reply, so a successful TX completes the
	/// operation. An empty writer refuses with [`CommError::NotAvailable`].
	pub fn tx<T: SerialPort>(&self, bus: &mut Bus<T>) -> Result<(), CommError> {
		if self.entries.is_empty() {
			return Err(CommError::NotAvailable);
		}
		let stride = self.data_length as usize + 1;
		let mut parameters = Vec::with_capacity(self.entries.len() * stride);
		for (&motor_id, payload) in &self.entries {
			parameters.push(motor_id);
			parameters.extend_from_slice(payload);
		}
		bus.sync_write_tx(self.start_address, self.data_length, &parameters)
	}
}
