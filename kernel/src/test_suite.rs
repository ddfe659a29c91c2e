// SPDX-License-Identifier: GPL-2.0

//! End-to-end scheduler scenarios, driven at the same level `init.rs`'s
//! dispatch loop operates at (`process::TABLE`/`process::TREE` plus the
//! `scheduler` policy functions) rather than through `fork`/`yield_now`/
//! `exit` themselves, since those call `scheduler::sched` and expect a
//! real per-CPU context to switch into. `process::wake` and
//! `process::kill` do not call `sched`, so the wake-order and
//! kill-a-sleeper scenarios exercise the real entry points directly.

use alloc::vec::Vec;

use crate::process::{self, State};
use crate::rbtree::{CfsTree, TaskIdx};
use crate::scheduler;
use crate::weight;

fn reset() {
	*process::TABLE.lock() = process::TaskTable::new();
	*process::TREE.lock() = CfsTree::new();
}

/// Allocate a runnable task with the given `nice`, placed at the tree's
/// current `min_vruntime` exactly as `process::fork` places a child.
fn spawn(nice: i8) -> TaskIdx {
	let idx = process::allocate_task().unwrap();
	let w = weight::weight_from_nice(nice);
	let min_v = process::TREE.lock().min_vruntime().unwrap_or(0);
	{
		let mut table = process::TABLE.lock();
		let t = table.task_mut(idx);
		t.nice = nice;
		t.weight = w;
		t.vruntime = min_v;
		t.state = State::Runnable;
	}
	process::TREE.lock().insert(idx, min_v, w).unwrap();
	idx
}

/// Pop the minimum-vruntime task, run it tick by tick exactly as the
/// timer-tick hook would (charging `cruntime`, checking
/// `should_preempt` after every tick), then advance its `vruntime` and
/// reinsert it — mirroring `init.rs`'s dispatch loop plus
/// `timer::timer_tick` without a real context switch. Returns the slot
/// that ran, or `None` if the tree was empty. Stops charging ticks once
/// `*global_ticks` reaches `hard_stop`, but always finishes the
/// dispatch's bookkeeping first.
fn dispatch_once(global_ticks: &mut u64, hard_stop: u64) -> Option<TaskIdx> {
	let (idx, count_before, total_weight_before) = {
		let mut tree = process::TREE.lock();
		let count_before = tree.count();
		let total_weight_before = tree.total_weight();
		let idx = tree.pop_minimum()?;
		(idx, count_before, total_weight_before)
	};

	let weight = process::TABLE.lock().task(idx).weight;
	let per = scheduler::period(count_before);
	let ts = scheduler::timeslice(per, weight, total_weight_before);

	{
		let mut table = process::TABLE.lock();
		let t = table.task_mut(idx);
		t.cruntime = 0;
		t.timeslice = ts;
	}

	loop {
		let min_v = process::TREE.lock().min_vruntime();
		let (cr, tsl, vr) = {
			let mut table = process::TABLE.lock();
			let t = table.task_mut(idx);
			t.cruntime += 1;
			(t.cruntime, t.timeslice, t.vruntime)
		};
		*global_ticks += 1;
		if *global_ticks >= hard_stop || scheduler::should_preempt(cr, tsl, vr, min_v) {
			break;
		}
	}

	{
		let mut table = process::TABLE.lock();
		scheduler::advance_vruntime(table.task_mut(idx));
	}
	let (new_v, w) = {
		let table = process::TABLE.lock();
		let t = table.task(idx);
		(t.vruntime(), t.weight)
	};
	process::TREE.lock().insert(idx, new_v, w).unwrap();
	Some(idx)
}

/// Whether `a / b` is within `pct` percent of `want_num / want_den`,
/// computed with integer cross-multiplication to stay off floats.
fn ratio_within_pct(a: u64, b: u64, want_num: u64, want_den: u64, pct: u64) -> bool {
	let lhs = a as u128 * want_den as u128;
	let rhs = b as u128 * want_num as u128;
	lhs.abs_diff(rhs) * 100 <= rhs * pct as u128
}

#[test_case]
fn nice_ratio_within_tolerance() {
	reset();
	let fast = spawn(-10);
	let slow = spawn(10);

	let mut ticks = 0u64;
	let budget = 20_000u64;
	while ticks < budget {
		if dispatch_once(&mut ticks, budget).is_none() {
			break;
		}
	}

	let truntime_fast = process::TABLE.lock().task(fast).truntime();
	let truntime_slow = process::TABLE.lock().task(slow).truntime();
	assert!(truntime_fast > 0 && truntime_slow > 0);
	assert!(
		ratio_within_pct(truntime_fast, truntime_slow, 9548, 110, 15),
		"truntime ratio {}/{} strayed past 15% of 9548/110",
		truntime_fast,
		truntime_slow
	);
}

#[test_case]
fn fairness_among_equal_nice_peers() {
	reset();
	let idxs: Vec<TaskIdx> = (0..60).map(|_| spawn(0)).collect();

	let mut ticks = 0u64;
	let budget = 12_000u64;
	while ticks < budget {
		if dispatch_once(&mut ticks, budget).is_none() {
			break;
		}
	}

	let bound = scheduler::period(idxs.len());
	let truntimes: Vec<u64> = idxs.iter().map(|&i| process::TABLE.lock().task(i).truntime()).collect();
	assert!(truntimes.iter().all(|&t| t > 0), "every peer must have run at least once");
	for i in 0..truntimes.len() {
		for j in (i + 1)..truntimes.len() {
			let diff = truntimes[i].abs_diff(truntimes[j]);
			assert!(diff <= bound, "truntime spread {} exceeds period {}", diff, bound);
		}
	}
}

#[test_case]
fn burst_tasks_complete_without_starvation() {
	reset();
	let cpu_bound = spawn(0);
	let mut ticks = 0u64;
	// Ticks of accumulated cruntime standing in for a ~10ms busy-wait.
	const BURST_WORK: u64 = 5;
	let bound = 3 * scheduler::period(2);

	for _ in 0..5 {
		let spawn_tick = ticks;
		let burst = spawn(0);
		loop {
			let ran = match dispatch_once(&mut ticks, u64::MAX) {
				Some(idx) => idx,
				None => unreachable!("cpu_bound is always runnable or running"),
			};
			if ran == burst && process::TABLE.lock().task(burst).truntime() >= BURST_WORK {
				process::TREE.lock().delete(burst);
				let latency = ticks - spawn_tick;
				assert!(latency <= bound, "burst latency {} exceeded {}", latency, bound);
				break;
			}
		}
		process::TABLE.lock().task_mut(burst).state = State::Unused;
	}

	assert!(process::TABLE.lock().task(cpu_bound).truntime() > 0);
}

#[test_case]
fn wake_enqueues_all_sleepers_in_vruntime_order() {
	reset();
	let channel = 777usize;
	let idxs: Vec<TaskIdx> = (0..10u64)
		.map(|i| {
			let idx = process::allocate_task().unwrap();
			let mut table = process::TABLE.lock();
			let t = table.task_mut(idx);
			t.nice = 0;
			t.weight = weight::weight_from_nice(0);
			t.vruntime = i * 10;
			t.state = State::Sleeping;
			t.channel = Some(channel);
			idx
		})
		.collect();

	process::wake(channel);

	for &idx in &idxs {
		assert_eq!(process::TABLE.lock().task(idx).state(), State::Runnable);
	}

	let order = process::TREE.lock().in_order();
	assert_eq!(order.len(), idxs.len());
	let mut last = 0u64;
	for idx in order {
		let v = process::TREE.lock().vruntime(idx);
		assert!(v >= last, "wake must preserve ascending pre-sleep vruntime order");
		last = v;
	}
}

#[test_case]
fn kill_wakes_a_sleeping_task() {
	reset();
	let idx = process::allocate_task().unwrap();
	let pid = {
		let mut table = process::TABLE.lock();
		let t = table.task_mut(idx);
		t.nice = 0;
		t.weight = weight::weight_from_nice(0);
		t.state = State::Sleeping;
		t.channel = Some(42);
		t.pid()
	};

	process::kill(pid).unwrap();

	let table = process::TABLE.lock();
	assert_eq!(table.task(idx).state(), State::Runnable);
	assert!(table.task(idx).killed);
	drop(table);
	assert_eq!(process::TREE.lock().count(), 1);
}
