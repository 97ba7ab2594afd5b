//! Real-time control of Feetech SCServo (STS / SMS) serial-bus servos.
//!
//! The crate has three layers:
//!
//! - [`Bus`]: the protocol codec over a [`SerialPort`]. Builds instruction
//!   packets (PING, READ, WRITE, REG_WRITE, ACTION, SYNC_READ, SYNC_WRITE)
//!   and parses status packets with header resync, inter-byte gap detection
//!   and checksum verification.
//! - [`SyncReader`] / [`SyncWriter`]: stateful bulk-transfer helpers that
//!   keep a participant set and, for reads, per-servo caches with a
//!   freshness window.
//! - [`ServoController`]: the actuator manager. Owns the bus, tracks
//!   membership and per-servo faults, double-buffers present positions and
//!   runs a fixed-rate control loop on a dedicated thread while callers
//!   stage atomic position batches from anywhere.
//!
//! ```no_run
//! use scservo::{ControllerConfig, ServoController};
//!
//! let controller = ServoController::open("/dev/ttyAMA5", ControllerConfig::default())?;
//! controller.start()?;
//! controller.set_targets([(11, 45.0)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod bus;
mod checksum;
mod controller;
mod endian;
mod error;
mod sync_read;
mod sync_write;

pub mod instructions;
pub mod registers;
pub mod serial_port;

#[cfg(test)]
mod test_port;

pub use bus::{Bus, StatusPacket};
pub use checksum::calculate_checksum;
pub use controller::{
	counts_to_degrees, degrees_to_counts, ActuatorConfig, ControllerConfig, FaultRecord, RegisterValue, ScanRecord,
	ServoController,
};
pub use endian::Endian;
pub use error::{CommError, ConfigError, RegisterError, StartError, StatusBits};
pub use registers::{Model, Register};
pub use serial_port::SerialPort;
pub use sync_read::SyncReader;
pub use sync_write::SyncWriter;
