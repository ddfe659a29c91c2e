// SPDX-License-Identifier: GPL-2.0

//! Subsystem bring-up and the per-CPU scheduler loop (spec §4.7).
//!
//! This crate models a single logical CPU (see `sync::IntrState`'s own
//! note), so `main_kernel_loop` just runs that one loop directly; a real
//! SMP port would start one of these per detected CPU instead.

use crate::collab;
use crate::diagnostics;
use crate::logging;
use crate::process::{self, State, TaskTable};
use crate::rbtree::TaskIdx;
use crate::scheduler;
use crate::sync;
use crate::syscalls;
use crate::timer;

/// Bring up everything the scheduler core needs before the dispatch loop
/// starts. Boot/VM/driver bring-up is an external collaborator's job;
/// this is limited to what this crate itself owns.
pub fn init_subsystems() {
	logging::log_info("init", "initializing scheduler core");
	diagnostics::init_diagnostics();
	timer::init();
	syscalls::init_syscalls().ok();
	logging::log_info("init", "scheduler core ready");
}

/// The per-CPU scheduler loop, forever. A task leaves this function's
/// context via `scheduler::dispatch`'s switch into it, and returns to it
/// (still inside the same stack frame, per the xv6-style coroutine swap)
/// whenever it calls back into `sched()`.
pub fn main_kernel_loop() -> ! {
	cpu_scheduler_loop()
}

fn cpu_scheduler_loop() -> ! {
	loop {
		sync::enable_interrupts_unchecked();
		let mut table = process::TABLE.lock();

		let dispatch = match pop_next_runnable(&table) {
			Some(pair) => pair,
			None => {
				// Tree was empty (or every pop was stale) when we
				// looked; release the table lock and retry the outer
				// loop, per step 3's "if empty, release and retry".
				drop(table);
				continue;
			}
		};
		let (idx, timeslice) = dispatch;

		table.set_current(Some(idx));
		{
			let task = table.task_mut(idx);
			task.timeslice = timeslice;
			task.cruntime = 0;
			task.state = State::Running;
		}

		let cr3 = table.task(idx).context.cr3;
		collab::switch_address_space(cr3);

		scheduler::dispatch(idx, &table);

		// The task called sched() (via yield/sleep/exit/kill) and
		// control is back here with the table lock still held.
		collab::switch_to_kernel_address_space();
		table.set_current(None);
		drop(table);
	}
}

/// Pop tasks off the tree until one is actually `RUNNABLE` (a killed or
/// re-slept task may have been popped in the race window between
/// enqueue and pop — discard those and keep trying) or the tree runs
/// dry. Computes the popped task's timeslice from the tree's population
/// *before* the pop, per spec §4.4.
fn pop_next_runnable(table: &TaskTable) -> Option<(TaskIdx, u64)> {
	loop {
		let mut tree = process::TREE.lock();
		let total_weight_before = tree.total_weight();
		let count = tree.count();
		let idx = tree.pop_minimum()?;
		drop(tree);

		if table.task(idx).state() != State::Runnable {
			continue;
		}

		let per = scheduler::period(count);
		let weight = table.task(idx).weight;
		return Some((idx, scheduler::timeslice(per, weight, total_weight_before)));
	}
}
