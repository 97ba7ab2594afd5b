//! The actuator manager and its thread-safe public interface.
//!
//! A [`ServoController`] owns the bus and a set of actuators, drives them at
//! a fixed cadence from a dedicated control-loop thread, and lets any number
//! of caller threads stage position batches, read back state and change
//! configuration concurrently.

mod control_loop;

use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::bus::Bus;
use crate::endian::{self, Endian};
use crate::error::{CommError, ConfigError, RegisterError, StartError, StatusBits};
use crate::instructions::packet_id;
use crate::registers::{self, address, find_register, Model};
use crate::serial_port::SerialPort;
use crate::sync_read::SyncReader;
use crate::sync_write::SyncWriter;

/// Full scale of the 12-bit absolute encoder.
const ENCODER_COUNTS: f64 = 4095.0;

/// Register writes retry this many times before giving up.
const WRITE_RETRIES: u32 = 3;

/// Settling pause between the steps of an EEPROM write sequence.
const EEPROM_WRITE_PAUSE: Duration = Duration::from_millis(10);

/// Sentinel for "no configuration write has happened yet".
const NEVER_CONFIGURED: u64 = u64::MAX;

/// Convert raw encoder counts to degrees. Zero counts map to -180°.
pub fn counts_to_degrees(counts: u16) -> f64 {
	f64::from(counts) * 360.0 / ENCODER_COUNTS - 180.0
}

/// Convert degrees to encoder counts, clamped to the encoder range.
pub fn degrees_to_counts(degrees: f64) -> u16 {
	let counts = (degrees + 180.0) * (ENCODER_COUNTS / 360.0);
	counts.round().clamp(0.0, ENCODER_COUNTS) as u16
}

/// Timing and bus knobs of the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
	/// Baud rate of the bus. The servos ship at 1 MBd or 500 kBd.
	pub baud_rate: u32,

	/// Byte order variant of the attached servos.
	pub endian: Endian,

	/// Control cadence in Hz.
	pub rate: u32,

	/// Bus I/O suppression window after a configuration write, so EEPROM
	/// writes settle without interleaved reads.
	pub grace_period: Duration,

	/// Consecutive stale reads before an actuator is evicted.
	pub max_read_errors: u32,

	/// An error counter resets once reads have been good for this long.
	pub error_reset_period: Duration,

	/// Freshness limit for sync-read samples.
	pub sync_read_max_age: Duration,

	/// ID range probed when [`ServoController::start`] has to scan the bus.
	pub scan_range: RangeInclusive<u8>,

	/// CPU to pin the control-loop thread to, if any.
	pub cpu_affinity: Option<usize>,
}

impl Default for ControllerConfig {
	fn default() -> Self {
		Self {
			baud_rate: 1_000_000,
			endian: Endian::Sts,
			rate: 50,
			grace_period: Duration::from_secs(2),
			max_read_errors: 10,
			error_reset_period: Duration::from_secs(5),
			sync_read_max_age: Duration::from_millis(50),
			scan_range: 11..=46,
			cpu_affinity: None,
		}
	}
}

/// A servo found by a bus scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRecord {
	pub id: u8,
	pub model: Model,
}

/// Fault history of one actuator.
#[derive(Debug, Clone)]
pub struct FaultRecord {
	pub last_message: String,
	pub total_count: u64,
	pub last_time: Instant,
}

/// A configuration change for one actuator. Only the fields that are present
/// are written.
#[derive(Debug, Clone, Default)]
pub struct ActuatorConfig {
	/// Position loop P gain, 0..=255.
	pub kp: Option<u32>,

	/// Position loop D gain, 0..=255.
	pub kd: Option<u32>,

	/// Acceleration in degrees, converted to register counts.
	pub acceleration: Option<f64>,

	/// Couple or decouple the motor coils from the goal position.
	pub torque_enabled: Option<bool>,

	/// Run the zero-position calibration sequence.
	pub zero_position: bool,
}

/// One row of a parameter dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterValue {
	pub name: &'static str,
	pub address: u8,
	pub value: i32,
}

/// Everything guarded by the control lock: the bus and the membership maps.
struct ControlState<T> {
	bus: Bus<T>,
	sync_read: SyncReader,
	sync_write: SyncWriter,
	actuators: BTreeSet<u8>,
	torque_enabled: BTreeSet<u8>,
	last_commanded: HashMap<u8, u16>,

	/// The inactive half of the position double buffer. The control loop
	/// fills it outside the positions lock, then swaps it in.
	back_positions: HashMap<u8, u16>,

	read_errors: HashMap<u8, u32>,
	last_error: HashMap<u8, Instant>,
	faults: HashMap<u8, FaultRecord>,
}

/// Everything guarded by the target lock.
struct TargetState {
	/// The next position batch, consumed whole by the control loop.
	pending: Option<HashMap<u8, u16>>,

	/// IDs that have received at least one command.
	commanded: BTreeSet<u8>,
}

/// State shared between the public API and the control-loop thread.
///
/// Lock acquisition order is control, then targets, then positions.
struct Shared<T> {
	config: ControllerConfig,
	control: Mutex<ControlState<T>>,
	targets: Mutex<TargetState>,

	/// The active half of the position double buffer. Held only to read a
	/// value or to swap the buffers, never while populating.
	positions: Mutex<HashMap<u8, u16>>,

	running: AtomicBool,

	/// Time base for [`Self::last_config`].
	epoch: Instant,

	/// Nanoseconds since `epoch` of the most recent configuration write, or
	/// [`NEVER_CONFIGURED`].
	last_config: AtomicU64,
}

/// Drives a fleet of serial-bus servos at a fixed cadence.
///
/// All methods take `&self` and are safe to call from any thread. Position
/// batches staged with [`Self::set_targets`] reach the wire no later than the
/// second control tick after the call.
pub struct ServoController<T: SerialPort = serial2::SerialPort> {
	shared: Arc<Shared<T>>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl ServoController<serial2::SerialPort> {
	/// Open a serial port and create a controller over it.
	///
	/// The port is configured for raw 8N1 at the configured baud rate with
	/// poll-style reads; the codec runs its own packet timeouts.
	pub fn open(path: impl AsRef<std::path::Path>, config: ControllerConfig) -> std::io::Result<Self> {
		let mut port = serial2::SerialPort::open(path, config.baud_rate)?;
		port.set_read_timeout(Duration::from_micros(100))?;
		port.discard_input_buffer()?;
		Ok(Self::with_port(port, config))
	}
}

impl<T: SerialPort + Send + 'static> ServoController<T> {
	/// Create a controller over an already configured port.
	pub fn with_port(port: T, config: ControllerConfig) -> Self {
		let bus = Bus::new(port, config.baud_rate, config.endian);
		let sync_read = SyncReader::with_max_age(address::PRESENT_POSITION, 2, config.sync_read_max_age);
		let sync_write = SyncWriter::new(address::GOAL_POSITION, 2);
		let shared = Shared {
			config,
			control: Mutex::new(ControlState {
				bus,
				sync_read,
				sync_write,
				actuators: BTreeSet::new(),
				torque_enabled: BTreeSet::new(),
				last_commanded: HashMap::new(),
				back_positions: HashMap::new(),
				read_errors: HashMap::new(),
				last_error: HashMap::new(),
				faults: HashMap::new(),
			}),
			targets: Mutex::new(TargetState {
				pending: None,
				commanded: BTreeSet::new(),
			}),
			positions: Mutex::new(HashMap::new()),
			running: AtomicBool::new(false),
			epoch: Instant::now(),
			last_config: AtomicU64::new(NEVER_CONFIGURED),
		};
		Self {
			shared: Arc::new(shared),
			worker: Mutex::new(None),
		}
	}

	/// Start the control loop.
	///
	/// When no actuators are registered yet, the configured ID range is
	/// scanned first; an empty bus is a startup failure.
	pub fn start(&self) -> Result<(), StartError> {
		if self.shared.running.swap(true, Ordering::AcqRel) {
			return Ok(());
		}

		{
			let mut control = self.shared.control.lock().unwrap();
			if control.actuators.is_empty() {
				let found = scan_bus(&mut control.bus, self.shared.config.scan_range.clone());
				if found.is_empty() {
					self.shared.running.store(false, Ordering::Release);
					error!("no actuators found");
					return Err(StartError::NoActuatorsFound);
				}
				info!("{} actuators found", found.len());
				for record in &found {
					add_actuator(&mut control, &self.shared, record.id);
				}
			}
		}

		let shared = Arc::clone(&self.shared);
		let handle = std::thread::Builder::new()
			.name("servo-control".into())
			.spawn(move || control_loop::run(shared))
			.map_err(|e| {
				self.shared.running.store(false, Ordering::Release);
				StartError::Spawn(e)
			})?;
		*self.worker.lock().unwrap() = Some(handle);
		Ok(())
	}

	/// Stop the control loop and join its thread.
	///
	/// Configuration operations racing a shutdown are not guaranteed to
	/// complete. The port itself closes when the controller is dropped.
	pub fn stop(&self) {
		self.shared.running.store(false, Ordering::Release);
		if let Some(handle) = self.worker.lock().unwrap().take() {
			let _ = handle.join();
		}
	}

	/// Whether the control loop is running.
	pub fn is_running(&self) -> bool {
		self.shared.running.load(Ordering::Acquire)
	}

	/// Ping every ID in `id_range` and report who answered.
	pub fn scan(&self, id_range: RangeInclusive<u8>) -> Vec<ScanRecord> {
		let mut control = self.shared.control.lock().unwrap();
		scan_bus(&mut control.bus, id_range)
	}

	/// Register an actuator and enroll it for sync reads.
	pub fn add_actuator(&self, actuator_id: u8) -> bool {
		let mut control = self.shared.control.lock().unwrap();
		add_actuator(&mut control, &self.shared, actuator_id)
	}

	/// Deregister an actuator and purge all of its per-ID state.
	pub fn remove_actuator(&self, actuator_id: u8) {
		let mut control = self.shared.control.lock().unwrap();
		remove_actuator(&mut control, &self.shared, actuator_id);
	}

	/// The currently managed actuator IDs in ascending order.
	pub fn actuator_ids(&self) -> Vec<u8> {
		let control = self.shared.control.lock().unwrap();
		control.actuators.iter().copied().collect()
	}

	/// Stage target positions (in degrees) for multiple actuators atomically.
	///
	/// The whole batch is applied by one control tick; a later batch
	/// overwrites earlier targets for the same ID.
	pub fn set_targets<I>(&self, targets: I)
	where
		I: IntoIterator<Item = (u8, f64)>,
	{
		let mut state = self.shared.targets.lock().unwrap();
		let TargetState { pending, commanded } = &mut *state;
		let batch = pending.get_or_insert_with(HashMap::new);
		for (actuator_id, degrees) in targets {
			batch.insert(actuator_id, degrees_to_counts(degrees));
			commanded.insert(actuator_id);
		}
	}

	/// The most recent present position of an actuator, in degrees.
	pub fn get_position(&self, actuator_id: u8) -> Option<f64> {
		let positions = self.shared.positions.lock().unwrap();
		positions.get(&actuator_id).map(|&counts| counts_to_degrees(counts))
	}

	/// Whether torque is currently enabled for an actuator.
	pub fn get_torque_enabled(&self, actuator_id: u8) -> bool {
		let control = self.shared.control.lock().unwrap();
		control.torque_enabled.contains(&actuator_id)
	}

	/// The fault history of an actuator, if it ever faulted.
	pub fn get_faults(&self, actuator_id: u8) -> Option<FaultRecord> {
		let control = self.shared.control.lock().unwrap();
		control.faults.get(&actuator_id).cloned()
	}

	/// Apply a configuration change to one actuator.
	///
	/// Returns true when every requested write succeeded. The control loop
	/// suspends bus I/O for the configured grace period starting now.
	pub fn configure(&self, actuator_id: u8, config: &ActuatorConfig) -> bool {
		// Stamp the grace window before any bus traffic so the control loop
		// backs off immediately.
		self.touch_config();
		let mut control = self.shared.control.lock().unwrap();
		match apply_config(&mut control, &self.shared, actuator_id, config) {
			Ok(changes) => {
				info!("actuator {} configured: {}", actuator_id, changes.join(", "));
				true
			},
			Err(e) => {
				error!("actuator {} configuration failed: {}", actuator_id, e);
				false
			},
		}
	}

	/// Run the zero-position calibration sequence on one actuator.
	pub fn set_zero_position(&self, actuator_id: u8) -> bool {
		self.touch_config();
		let mut control = self.shared.control.lock().unwrap();
		match zero_position(&mut control, &self.shared, actuator_id) {
			Ok(()) => true,
			Err(e) => {
				error!("zeroing actuator {} failed: {}", actuator_id, e);
				false
			},
		}
	}

	/// Read every register in the control table from one servo.
	///
	/// Rows that fail to read are logged and skipped.
	pub fn dump_parameters(&self, actuator_id: u8) -> Vec<RegisterValue> {
		let mut control = self.shared.control.lock().unwrap();
		let mut values = Vec::with_capacity(registers::REGISTERS.len());
		for register in registers::REGISTERS {
			let result = match register.size {
				2 => control.bus.read_u16(actuator_id, register.address).map(|raw| {
					if register.signed {
						endian::sign_magnitude_to_host(raw, 15)
					} else {
						i32::from(raw)
					}
				}),
				_ => control.bus.read_u8(actuator_id, register.address).map(i32::from),
			};
			match result {
				Ok(value) => values.push(RegisterValue {
					name: register.name,
					address: register.address,
					value,
				}),
				Err(e) => error!("failed to read {} (addr {}): {}", register.name, register.address, e),
			}
		}
		values
	}

	/// Change the bus ID of a servo.
	///
	/// This is a maintenance operation: controller membership is not renamed,
	/// so run it before registering the servo.
	pub fn change_id(&self, current_id: u8, new_id: u8) -> bool {
		if current_id > packet_id::MAX || new_id > packet_id::MAX {
			error!("servo ids must be at most {}", packet_id::MAX);
			return false;
		}
		self.touch_config();
		let mut control = self.shared.control.lock().unwrap();
		info!("changing servo id {} to {}", current_id, new_id);
		let result = (|| -> Result<(), RegisterError> {
			unlock_eeprom(&mut control.bus, current_id)?;
			std::thread::sleep(EEPROM_WRITE_PAUSE);
			write_register(&mut control.bus, current_id, address::ID, i32::from(new_id))?;
			std::thread::sleep(EEPROM_WRITE_PAUSE);
			// The servo answers under its new ID from here on.
			lock_eeprom(&mut control.bus, new_id)?;
			Ok(())
		})();
		match result {
			Ok(()) => true,
			Err(e) => {
				error!("failed to change servo id: {}", e);
				false
			},
		}
	}

	/// Change the baud rate of every managed servo, then retarget the host port.
	pub fn change_baudrate(&self, baud_rate: u32) -> bool {
		let Some(index) = baud_index(baud_rate) else {
			error!("unsupported baud rate: {}", baud_rate);
			return false;
		};
		self.touch_config();
		let mut control = self.shared.control.lock().unwrap();
		let ids: Vec<u8> = control.actuators.iter().copied().collect();
		let mut success = true;
		for actuator_id in ids {
			info!("changing baud rate of actuator {} to {}", actuator_id, baud_rate);
			let result = (|| -> Result<(), RegisterError> {
				unlock_eeprom(&mut control.bus, actuator_id)?;
				std::thread::sleep(EEPROM_WRITE_PAUSE);
				write_register(&mut control.bus, actuator_id, address::BAUD_RATE, i32::from(index))?;
				std::thread::sleep(EEPROM_WRITE_PAUSE);
				lock_eeprom(&mut control.bus, actuator_id)?;
				Ok(())
			})();
			if let Err(e) = result {
				error!("failed to change baud rate of actuator {}: {}", actuator_id, e);
				success = false;
			}
		}
		if success {
			if let Err(e) = control.bus.set_baud_rate(baud_rate) {
				error!("failed to retarget the host port: {}", e);
				success = false;
			}
		}
		success
	}

	fn touch_config(&self) {
		let nanos = self.shared.epoch.elapsed().as_nanos() as u64;
		self.shared.last_config.store(nanos, Ordering::Release);
	}
}

impl<T: SerialPort> Drop for ServoController<T> {
	fn drop(&mut self) {
		self.shared.running.store(false, Ordering::Release);
		if let Some(handle) = self.worker.lock().unwrap().take() {
			let _ = handle.join();
		}
	}
}

fn scan_bus<T: SerialPort>(bus: &mut Bus<T>, id_range: RangeInclusive<u8>) -> Vec<ScanRecord> {
	let mut found = Vec::new();
	for actuator_id in id_range {
		match bus.ping(actuator_id) {
			Ok(model_number) => {
				let model = Model::from_number(model_number);
				debug!("[id:{:03}] {}", actuator_id, model);
				found.push(ScanRecord { id: actuator_id, model });
			},
			Err(CommError::RxTimeout) => (),
			Err(e) => debug!("[id:{:03}] scan error: {}", actuator_id, e),
		}
	}
	if found.is_empty() {
		info!("no servos found");
	} else {
		let names: Vec<String> = found.iter().map(|record| format!("[{} {}]", record.id, record.model)).collect();
		info!("found servos: {}", names.join(", "));
	}
	found
}

fn add_actuator<T: SerialPort>(control: &mut ControlState<T>, shared: &Shared<T>, actuator_id: u8) -> bool {
	if control.actuators.contains(&actuator_id) {
		return true;
	}
	if !control.sync_read.add(actuator_id) {
		error!("[id:{:03}] sync read enrollment failed", actuator_id);
		return false;
	}
	control.actuators.insert(actuator_id);
	control.last_commanded.insert(actuator_id, 0);

	// Both halves of the double buffer start at zero counts.
	control.back_positions.insert(actuator_id, 0);
	shared.positions.lock().unwrap().insert(actuator_id, 0);
	true
}

fn remove_actuator<T: SerialPort>(control: &mut ControlState<T>, shared: &Shared<T>, actuator_id: u8) {
	if !control.actuators.remove(&actuator_id) {
		return;
	}
	control.torque_enabled.remove(&actuator_id);
	control.last_commanded.remove(&actuator_id);
	control.back_positions.remove(&actuator_id);
	control.read_errors.remove(&actuator_id);
	control.last_error.remove(&actuator_id);
	control.sync_read.remove(actuator_id);
	{
		let mut targets = shared.targets.lock().unwrap();
		targets.commanded.remove(&actuator_id);
		if let Some(batch) = targets.pending.as_mut() {
			batch.remove(&actuator_id);
		}
	}
	shared.positions.lock().unwrap().remove(&actuator_id);
}

fn record_fault<T>(control: &mut ControlState<T>, actuator_id: u8, message: &str) {
	let now = Instant::now();
	let record = control.faults.entry(actuator_id).or_insert_with(|| FaultRecord {
		last_message: String::new(),
		total_count: 0,
		last_time: now,
	});
	record.last_message.clear();
	record.last_message.push_str(message);
	record.total_count += 1;
	record.last_time = now;
}

/// Write a register through the control table, with retries.
fn write_register<T: SerialPort>(
	bus: &mut Bus<T>,
	motor_id: u8,
	address: u8,
	value: i32,
) -> Result<(), RegisterError> {
	let register = find_register(address).ok_or(RegisterError::UnknownRegister(address))?;
	let data: Vec<u8> = match register.size {
		2 => {
			let raw = if register.signed {
				endian::host_to_sign_magnitude(value, 15)
			} else {
				value as u16
			};
			endian::encode_u16(raw, bus.endian()).to_vec()
		},
		_ => vec![value as u8],
	};

	let mut attempts_left = WRITE_RETRIES;
	loop {
		match bus.write(motor_id, address, &data) {
			Ok(error_bits) => {
				if error_bits != 0 {
					debug!(
						"[id:{:03}] register {} write reported status: {}",
						motor_id,
						address,
						StatusBits(error_bits)
					);
				}
				return Ok(());
			},
			Err(e) => {
				attempts_left -= 1;
				if attempts_left == 0 {
					error!("failed to write register {} after all retries", address);
					return Err(e.into());
				}
				warn!("failed to write register {}, retrying: {}", address, e);
			},
		}
	}
}

fn apply_config<T: SerialPort>(
	control: &mut ControlState<T>,
	shared: &Shared<T>,
	actuator_id: u8,
	config: &ActuatorConfig,
) -> Result<Vec<String>, ConfigError> {
	if !control.actuators.contains(&actuator_id) {
		return Err(ConfigError::UnknownActuator(actuator_id));
	}
	let mut changes = Vec::new();

	if let Some(kp) = config.kp {
		if kp > 255 {
			return Err(ConfigError::OutOfRange {
				name: "kp",
				value: i64::from(kp),
			});
		}
		write_register(&mut control.bus, actuator_id, address::KP, kp as i32)?;
		changes.push(format!("kp={}", kp));
	}

	if let Some(kd) = config.kd {
		if kd > 255 {
			return Err(ConfigError::OutOfRange {
				name: "kd",
				value: i64::from(kd),
			});
		}
		write_register(&mut control.bus, actuator_id, address::KD, kd as i32)?;
		changes.push(format!("kd={}", kd));
	}

	if let Some(acceleration) = config.acceleration {
		// Acceleration shares the position scale and lands in the register
		// as hundreds of counts.
		let converted = if acceleration != 0.0 {
			((acceleration + 180.0) * (ENCODER_COUNTS / 360.0) / 100.0) as i64
		} else {
			0
		};
		if !(0..=255).contains(&converted) {
			return Err(ConfigError::OutOfRange {
				name: "acceleration",
				value: converted,
			});
		}
		write_register(&mut control.bus, actuator_id, address::ACCELERATION, converted as i32)?;
		changes.push(format!("acc={}", converted));
	}

	if let Some(torque_enabled) = config.torque_enabled {
		write_register(
			&mut control.bus,
			actuator_id,
			address::TORQUE_ENABLE,
			i32::from(torque_enabled),
		)?;
		if torque_enabled {
			control.torque_enabled.insert(actuator_id);
		} else {
			control.torque_enabled.remove(&actuator_id);
		}
		changes.push(format!("torque={}", if torque_enabled { "on" } else { "off" }));
	}

	if config.zero_position {
		zero_position(control, shared, actuator_id)?;
		changes.push("zeroed".to_string());
	}

	Ok(changes)
}

/// The EEPROM calibration sequence that makes the current pose the middle of
/// the travel range.
fn zero_position<T: SerialPort>(
	control: &mut ControlState<T>,
	shared: &Shared<T>,
	actuator_id: u8,
) -> Result<(), RegisterError> {
	unlock_eeprom(&mut control.bus, actuator_id)?;
	std::thread::sleep(EEPROM_WRITE_PAUSE);

	write_register(&mut control.bus, actuator_id, address::MIN_ANGLE_LIMIT, 0x0000)?;
	std::thread::sleep(EEPROM_WRITE_PAUSE);

	write_register(&mut control.bus, actuator_id, address::MAX_ANGLE_LIMIT, 0x0FFF)?;
	std::thread::sleep(EEPROM_WRITE_PAUSE);

	write_register(&mut control.bus, actuator_id, address::MODE, 0)?;
	std::thread::sleep(EEPROM_WRITE_PAUSE);

	// 0x80 is the manufacturer's calibrate-to-middle flag, not a boolean.
	write_register(&mut control.bus, actuator_id, address::TORQUE_ENABLE, 0x80)?;
	std::thread::sleep(EEPROM_WRITE_PAUSE);

	lock_eeprom(&mut control.bus, actuator_id)?;

	control.last_commanded.insert(actuator_id, degrees_to_counts(0.0));
	control.back_positions.insert(actuator_id, 0);
	shared.positions.lock().unwrap().insert(actuator_id, 0);
	Ok(())
}

fn unlock_eeprom<T: SerialPort>(bus: &mut Bus<T>, motor_id: u8) -> Result<(), RegisterError> {
	write_register(bus, motor_id, address::LOCK, 0)?;
	debug!("[id:{:03}] eeprom unlocked", motor_id);
	Ok(())
}

fn lock_eeprom<T: SerialPort>(bus: &mut Bus<T>, motor_id: u8) -> Result<(), RegisterError> {
	write_register(bus, motor_id, address::LOCK, 1)?;
	debug!("[id:{:03}] eeprom locked", motor_id);
	Ok(())
}

fn baud_index(baud_rate: u32) -> Option<u8> {
	match baud_rate {
		1_000_000 => Some(0),
		500_000 => Some(1),
		250_000 => Some(2),
		128_000 => Some(3),
		115_200 => Some(4),
		76_800 => Some(5),
		57_600 => Some(6),
		38_400 => Some(7),
		_ => None,
	}
}
