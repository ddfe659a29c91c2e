// SPDX-License-Identifier: GPL-2.0

//! The periodic timer-tick hook (spec §4.7 step 4 / §6): advance
//! jiffies, wake anything sleeping on ticks, charge the running task's
//! `cruntime`, and let the policy decide whether to preempt it.
//!
//! Arming the actual interrupt source (PIT/APIC timer programming, IDT
//! registration, PIC EOI) is a platform-timer collaborator's job, out
//! of this crate's scope per spec §1; this module is only the tick
//! handler itself, meant to be invoked once per interrupt by whatever
//! drives it.

use crate::process::{self, State, TICKS_CHANNEL};
use crate::time;

/// Nothing to set up; kept as a named entry point for `init.rs`'s
/// subsystem bring-up sequence, mirroring `diagnostics::init_diagnostics`.
pub fn init() {
	crate::logging::log_info("timer", "timer tick hook ready");
}

/// Run once per timer interrupt.
///
/// Charges the running task's `cruntime` before calling `yield_now`,
/// since the policy's preemption check (spec §4.5) compares `cruntime`
/// against the task's timeslice; if nothing is running (the CPU is
/// between dispatches), there is nothing to charge or preempt.
pub fn timer_tick() {
	time::update_jiffies();
	process::wake(TICKS_CHANNEL);

	let has_current = {
		let mut table = process::TABLE.lock();
		match table.current() {
			Some(idx) => {
				let task = table.task_mut(idx);
				if task.state() == State::Running {
					task.cruntime += 1;
				}
				true
			}
			None => false,
		}
	};

	if has_current {
		process::yield_now();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn tick_with_no_current_task_is_a_no_op() {
		let before = time::get_jiffies().as_u64();
		timer_tick();
		assert_eq!(time::get_jiffies().as_u64(), before + 1);
	}
}
