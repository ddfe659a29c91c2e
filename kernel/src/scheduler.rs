// SPDX-License-Identifier: GPL-2.0

//! CFS policy: virtual-runtime advancement, period/timeslice assignment,
//! the preemption predicate, and the xv6-style handoff between a running
//! task and the per-CPU scheduler loop (`init.rs`'s `cpu_scheduler_loop`).
//!
//! The run-queue itself (the red-black tree) lives in `rbtree.rs`; the
//! task table and lifecycle hooks live in `process.rs`. This module is
//! the policy glue the two of them call into.

use crate::arch::x86_64::context::{self, Context};
use crate::config::{MIN_GRANULARITY, SCHED_LATENCY};
use crate::process::{State, Task, TaskTable};
use crate::rbtree::TaskIdx;
use crate::sync;
use crate::weight;

/// Advance `task`'s `vruntime` by its accumulated slice, using the
/// corrected (multiply-before-divide) form: `vruntime += weight_table[20]
/// * cruntime / weight`. The naive `(weight_table[20] / weight) * cruntime`
/// truncates to zero for any task with weight above the nominal 1024, so
/// it is not an acceptable reordering of the same arithmetic.
pub fn advance_vruntime(task: &mut Task) {
	let delta = weight::nominal_weight() as u64 * task.cruntime / task.weight.max(1) as u64;
	task.vruntime = task.vruntime.saturating_add(delta);
	task.truntime += task.cruntime;
	task.cruntime = 0;
}

/// The tree's scheduling period, recomputed from its population on every
/// dispatch: `count * min_granularity` once the tree is crowded enough
/// that `sched_latency` alone would starve someone, `sched_latency`
/// otherwise.
pub fn period(count: usize) -> u64 {
	let threshold = SCHED_LATENCY / MIN_GRANULARITY;
	if count as u64 > threshold {
		count as u64 * MIN_GRANULARITY
	} else {
		SCHED_LATENCY
	}
}

/// A dispatched task's timeslice: its proportional share of `period`
/// given `total_weight_before`, the tree's total weight at the moment it
/// was popped (i.e. including the dispatched task's own weight).
pub fn timeslice(period: u64, weight: u32, total_weight_before: u64) -> u64 {
	if total_weight_before == 0 {
		return period;
	}
	period * weight as u64 / total_weight_before
}

/// Whether the caller should give up the CPU: its slice is exhausted, or
/// a fairer task (smaller `vruntime`) is waiting in the tree — subject to
/// minimum-granularity protection once the task has actually run for a
/// while. A task that has just been dispatched (`cruntime == 0`) is never
/// preempted on the fairness rule, and only on the slice-exhaustion rule
/// if it was handed a zero timeslice; this is what makes `yield()`
/// idempotent immediately after dispatch.
pub fn should_preempt(
	cruntime: u64,
	timeslice: u64,
	vruntime: u64,
	tree_min_vruntime: Option<u64>,
) -> bool {
	if cruntime == 0 {
		return timeslice == 0;
	}
	if cruntime < MIN_GRANULARITY {
		return false;
	}
	if cruntime >= timeslice {
		return true;
	}
	if let Some(min_v) = tree_min_vruntime {
		if vruntime > min_v {
			return true;
		}
	}
	false
}

/// The per-CPU "return to the scheduler loop" context. Written by
/// `dispatch` just before handing the CPU to a task, read by `sched` to
/// hand it back. Both sides only ever touch this with the table lock
/// held, and the crate models a single logical CPU (see
/// `sync::IntrState`'s own note), so one static suffices; a real SMP port
/// would index this by `arch::cpu_id()`.
static mut SCHEDULER_CONTEXT: Context = Context::EMPTY;

/// Hand the CPU to `idx`: save the scheduler loop's own register state
/// into `SCHEDULER_CONTEXT` and restore the task's. Returns once the task
/// calls back into `sched()`. Called by `init.rs`'s dispatch loop with
/// the table lock held and the task already marked `RUNNING`.
pub fn dispatch(idx: TaskIdx, table: &TaskTable) {
	let task_ctx = table.task(idx).context;
	unsafe {
		context::switch_context(&mut *core::ptr::addr_of_mut!(SCHEDULER_CONTEXT), &task_ctx);
	}
}

/// The xv6-style handoff out of a running task, called from the
/// yield/sleep/exit/kill paths. Requires the table lock held exactly
/// once and interrupts disabled (both implied by nesting depth 1, since
/// acquiring the table lock is the only way to reach this function) and
/// the current task already transitioned out of `RUNNING`. Violations
/// are scheduler-invariant failures and panic rather than propagate.
pub fn sched(table: &mut TaskTable) {
	assert_eq!(
		sync::intr_nesting_depth(),
		1,
		"sched: table lock must be held exactly once (no nested locks)"
	);
	let idx = table.current().expect("sched: no current task");
	assert_ne!(
		table.task(idx).state(),
		State::Running,
		"sched: called with the current task still RUNNING"
	);

	unsafe {
		context::switch_context(
			&mut table.task_mut(idx).context,
			&*core::ptr::addr_of!(SCHEDULER_CONTEXT),
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn task_with(weight: u32, vruntime: u64, cruntime: u64) -> Task {
		let mut t = Task::EMPTY;
		t.weight = weight;
		t.vruntime = vruntime;
		t.cruntime = cruntime;
		t
	}

	#[test_case]
	fn advance_vruntime_uses_corrected_formula() {
		// weight 2048 (nice < 0, double the nominal weight): a naive
		// (1024 / 2048) * cruntime truncates to zero. The corrected
		// (1024 * cruntime) / weight must not.
		let mut t = task_with(2048, 0, 100);
		advance_vruntime(&mut t);
		assert_eq!(t.vruntime, 1024 * 100 / 2048);
		assert_eq!(t.cruntime, 0);
		assert_eq!(t.truntime, 100);
	}

	#[test_case]
	fn advance_vruntime_resets_cruntime_and_accumulates_truntime() {
		let mut t = task_with(1024, 500, 40);
		advance_vruntime(&mut t);
		assert_eq!(t.vruntime, 540);
		assert_eq!(t.cruntime, 0);
		advance_vruntime(&mut t);
		assert_eq!(t.truntime, 40);
	}

	#[test_case]
	fn period_uses_sched_latency_below_threshold() {
		let threshold = (SCHED_LATENCY / MIN_GRANULARITY) as usize;
		assert_eq!(period(threshold), SCHED_LATENCY);
		assert_eq!(period(1), SCHED_LATENCY);
	}

	#[test_case]
	fn period_scales_with_count_above_threshold() {
		let threshold = (SCHED_LATENCY / MIN_GRANULARITY) as usize;
		let count = threshold + 5;
		assert_eq!(period(count), count as u64 * MIN_GRANULARITY);
	}

	#[test_case]
	fn timeslice_is_proportional_to_weight_share() {
		// Two peers of equal weight should each get half the period.
		let per = period(2);
		assert_eq!(timeslice(per, 1024, 2048), per / 2);
	}

	#[test_case]
	fn timeslice_falls_back_to_period_when_tree_was_empty() {
		assert_eq!(timeslice(SCHED_LATENCY, 1024, 0), SCHED_LATENCY);
	}

	#[test_case]
	fn yield_is_idempotent_with_zero_cruntime() {
		// Invariant 9: yield() with cruntime == 0 never reschedules,
		// regardless of how favorable the tree's minimum vruntime is.
		assert!(!should_preempt(0, 40, 1000, Some(0)));
		assert!(!should_preempt(0, 40, 1000, None));
	}

	#[test_case]
	fn should_preempt_zero_cruntime_fires_only_on_zero_timeslice() {
		assert!(should_preempt(0, 0, 1000, None));
	}

	#[test_case]
	fn should_preempt_protects_minimum_granularity() {
		// Below min_granularity, a fairer task waiting is not enough.
		assert!(!should_preempt(MIN_GRANULARITY - 1, 40, 1000, Some(0)));
	}

	#[test_case]
	fn should_preempt_on_slice_exhaustion() {
		assert!(should_preempt(MIN_GRANULARITY, MIN_GRANULARITY, 0, None));
	}

	#[test_case]
	fn should_preempt_on_fairer_task_waiting() {
		assert!(should_preempt(MIN_GRANULARITY, 1000, 500, Some(100)));
	}

	#[test_case]
	fn should_preempt_false_when_no_fairer_task_and_slice_remains() {
		assert!(!should_preempt(MIN_GRANULARITY, 1000, 500, Some(500)));
		assert!(!should_preempt(MIN_GRANULARITY, 1000, 500, None));
	}
}
