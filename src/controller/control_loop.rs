//! The fixed-rate control loop: one tick reads every participant, publishes
//! the fresh snapshot, drains the pending command batch and writes goals to
//! the torque-enabled, commanded subset.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, warn};

use crate::endian;
use crate::registers::address;
use crate::serial_port::SerialPort;

use super::{record_fault, remove_actuator, ControlState, Shared, NEVER_CONFIGURED};

/// The final stretch of every tick is busy-waited for sub-millisecond accuracy.
const SPIN_WINDOW: Duration = Duration::from_millis(1);

/// Requested FIFO priority for the loop thread.
const RT_PRIORITY: i32 = 99;

pub(super) fn run<T: SerialPort>(shared: Arc<Shared<T>>) {
	set_realtime_priority(shared.config.cpu_affinity);

	let period = Duration::from_secs_f64(1.0 / f64::from(shared.config.rate));
	let mut next_tick = Instant::now();

	while shared.running.load(Ordering::Acquire) {
		{
			let mut control = shared.control.lock().unwrap();
			// The grace check happens under the control lock: a configuration
			// write that raced this tick has already stamped the window by the
			// time the lock is ours, so EEPROM writes always settle unharassed.
			if !in_config_grace(&shared) && !control.actuators.is_empty() {
				read_positions(&mut control, &shared);
				write_positions(&mut control, &shared);
			}
		}

		next_tick += period;
		let now = Instant::now();
		if next_tick > now {
			sleep_until(next_tick);
		} else {
			// Behind schedule: restart the cadence rather than trying to catch up.
			next_tick = now + period;
			warn!("timing overrun detected");
		}
	}
}

fn in_config_grace<T>(shared: &Shared<T>) -> bool {
	let stamp = shared.last_config.load(Ordering::Acquire);
	if stamp == NEVER_CONFIGURED {
		return false;
	}
	let elapsed = shared.epoch.elapsed().as_nanos() as u64;
	elapsed.saturating_sub(stamp) < shared.config.grace_period.as_nanos() as u64
}

/// Sleep coarsely until close to the deadline, then busy-wait the rest.
fn sleep_until(deadline: Instant) {
	let now = Instant::now();
	if let Some(remaining) = deadline.checked_duration_since(now) {
		if remaining > SPIN_WINDOW {
			std::thread::sleep(remaining - SPIN_WINDOW);
		}
	}
	while Instant::now() < deadline {
		std::hint::spin_loop();
	}
}

/// Sync-read all participants into the inactive buffer and swap it in.
///
/// Per-participant staleness feeds the error counters and, past the
/// configured threshold, evicts the actuator. A failure of the exchange
/// itself leaves the published buffer at its last known good content.
fn read_positions<T: SerialPort>(control: &mut ControlState<T>, shared: &Shared<T>) {
	let now = Instant::now();

	if let Err(e) = control.sync_read.txrx(&mut control.bus) {
		error!("group sync read error: {}", e);
		return;
	}

	let byte_order = control.bus.endian();
	control.back_positions.clear();
	let ids: Vec<u8> = control.actuators.iter().copied().collect();
	for actuator_id in ids {
		let fresh = control.sync_read.available(actuator_id, address::PRESENT_POSITION, 2);
		if fresh == Some(0) {
			if let Some(position) = control.sync_read.get_u16(actuator_id, address::PRESENT_POSITION, byte_order) {
				control.back_positions.insert(actuator_id, position);
			}
			let recovered = match control.last_error.get(&actuator_id) {
				Some(&at) => now.duration_since(at) >= shared.config.error_reset_period,
				None => true,
			};
			if recovered {
				control.read_errors.insert(actuator_id, 0);
			}
		} else {
			let counter = control.read_errors.entry(actuator_id).or_insert(0);
			*counter += 1;
			let count = *counter;
			control.last_error.insert(actuator_id, now);
			record_fault(control, actuator_id, "fail to read");
			error!("failed to read from actuator {} (error count: {})", actuator_id, count);

			if count >= shared.config.max_read_errors {
				error!("removing actuator {} due to repeated read failures", actuator_id);
				remove_actuator(control, shared, actuator_id);
			}
		}
	}

	// Publish with a single swap, after every participant is folded in.
	let mut active = shared.positions.lock().unwrap();
	std::mem::swap(&mut *active, &mut control.back_positions);
}

/// Drain the pending batch and sync-write goals to (torque-enabled ∩ commanded).
fn write_positions<T: SerialPort>(control: &mut ControlState<T>, shared: &Shared<T>) {
	if control.torque_enabled.is_empty() {
		return;
	}

	let commanded: BTreeSet<u8> = {
		let mut targets = shared.targets.lock().unwrap();
		if let Some(batch) = targets.pending.take() {
			for (actuator_id, counts) in batch {
				control.last_commanded.insert(actuator_id, counts);
			}
		}
		targets.commanded.clone()
	};

	let byte_order = control.bus.endian();
	control.sync_write.clear();
	for &actuator_id in &control.torque_enabled {
		if !commanded.contains(&actuator_id) {
			continue;
		}
		let Some(&counts) = control.last_commanded.get(&actuator_id) else {
			continue;
		};
		control.sync_write.push(actuator_id, &endian::encode_u16(counts, byte_order));
	}

	if control.sync_write.is_empty() {
		return;
	}
	if let Err(e) = control.sync_write.tx(&mut control.bus) {
		error!("group sync write error: {}", e);
	}
}

#[cfg(target_os = "linux")]
fn set_realtime_priority(cpu_affinity: Option<usize>) {
	unsafe {
		let param = libc::sched_param {
			sched_priority: RT_PRIORITY,
		};
		if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) != 0 {
			warn!("could not set real-time priority: {}", std::io::Error::last_os_error());
		}
	}
	if let Some(cpu) = cpu_affinity {
		unsafe {
			let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
			libc::CPU_ZERO(&mut cpu_set);
			libc::CPU_SET(cpu, &mut cpu_set);
			if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpu_set) != 0 {
				warn!("could not pin the control loop to cpu {}: {}", cpu, std::io::Error::last_os_error());
			}
		}
	}
}

#[cfg(not(target_os = "linux"))]
fn set_realtime_priority(_cpu_affinity: Option<usize>) {}
