// SPDX-License-Identifier: GPL-2.0

//! The task table and lifecycle hooks: `fork`, `exit`, `wait`, `sleep`,
//! `wake`, `kill`, `yield`, `nice`.
//!
//! The table is a fixed `[Task; NPROC]` arena guarded by a single
//! interrupt-save spinlock (the table lock). Tree links are not stored
//! here at all — they live in `rbtree::CfsTree`'s own side-table under
//! the tree lock, addressed by the same slot index (`TaskIdx`), per the
//! arena design in `rbtree.rs`.

use alloc::format;

use crate::arch::x86_64::context::Context;
use crate::config::NPROC;
use crate::error::{Error, Result};
use crate::logging;
use crate::rbtree::{CfsTree, TaskIdx};
use crate::scheduler;
use crate::sync::{Spinlock, SpinlockGuard};
use crate::types::Pid;
use crate::weight;

pub const TASK_NAME_LEN: usize = 16;

/// An opaque rendezvous address for `sleep`/`wake`. Any stable integer
/// may serve as a channel; a task commonly sleeps on its own slot index
/// (see `wait`) or on a fixed constant shared by unrelated sleepers
/// (see `TICKS_CHANNEL`).
pub type Channel = usize;

/// Channel used by `sleep_ticks`/the timer tick hook.
pub const TICKS_CHANNEL: Channel = usize::MAX;

/// The pid children are reparented to when their parent exits. No task
/// with this pid is modeled here — the init task's own wait loop is an
/// external collaborator, out of scope for the scheduler core.
pub const INIT_PID: Pid = Pid(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Unused,
	Embryo,
	Sleeping,
	Runnable,
	Running,
	Zombie,
}

impl State {
	/// The upper-case label `ps`/`procdump` prints (spec §6's diagnostic
	/// format), distinct from `{:?}`'s Rust-style variant name.
	pub fn as_str(&self) -> &'static str {
		match self {
			State::Unused => "UNUSED",
			State::Embryo => "EMBRYO",
			State::Sleeping => "SLEEPING",
			State::Runnable => "RUNNABLE",
			State::Running => "RUNNING",
			State::Zombie => "ZOMBIE",
		}
	}
}

/// A task descriptor. Scheduling fields match the data model: `nice`,
/// `weight`, `vruntime`, `cruntime`, `truntime`, `timeslice`. No tree
/// links — those live in the tree's own side-table.
#[derive(Debug, Clone, Copy)]
pub struct Task {
	pub(crate) pid: Pid,
	pub(crate) state: State,
	pub(crate) nice: i8,
	pub(crate) weight: u32,
	pub(crate) vruntime: u64,
	pub(crate) cruntime: u64,
	pub(crate) truntime: u64,
	pub(crate) timeslice: u64,
	pub(crate) parent: Option<Pid>,
	pub(crate) channel: Option<Channel>,
	pub(crate) killed: bool,
	pub(crate) name: [u8; TASK_NAME_LEN],
	pub(crate) exit_code: i32,
	pub(crate) context: Context,
}

impl Task {
	pub(crate) const EMPTY: Task = Task {
		pid: Pid(0),
		state: State::Unused,
		nice: 0,
		weight: 0,
		vruntime: 0,
		cruntime: 0,
		truntime: 0,
		timeslice: 0,
		parent: None,
		channel: None,
		killed: false,
		name: [0; TASK_NAME_LEN],
		exit_code: 0,
		context: Context::EMPTY,
	};

	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn state(&self) -> State {
		self.state
	}

	pub fn nice(&self) -> i8 {
		self.nice
	}

	pub fn vruntime(&self) -> u64 {
		self.vruntime
	}

	pub fn cruntime(&self) -> u64 {
		self.cruntime
	}

	pub fn truntime(&self) -> u64 {
		self.truntime
	}

	pub fn name_str(&self) -> &str {
		let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		core::str::from_utf8(&self.name[..len]).unwrap_or("?")
	}

	fn set_name(&mut self, name: &str) {
		self.name = [0; TASK_NAME_LEN];
		let bytes = name.as_bytes();
		let n = bytes.len().min(TASK_NAME_LEN);
		self.name[..n].copy_from_slice(&bytes[..n]);
	}
}

/// The task table. `current` is the slot this (logical) CPU is running,
/// tracked here rather than per-CPU storage since the crate only models
/// a single logical CPU (see `sync::IntrState`'s own note).
pub struct TaskTable {
	tasks: [Task; NPROC],
	next_pid: u32,
	current: Option<TaskIdx>,
}

impl TaskTable {
	pub const fn new() -> Self {
		Self {
			tasks: [Task::EMPTY; NPROC],
			next_pid: 1,
			current: None,
		}
	}

	fn allocate(&mut self) -> Result<TaskIdx> {
		for i in 0..NPROC {
			if self.tasks[i].state == State::Unused {
				let pid = Pid(self.next_pid);
				self.next_pid = self.next_pid.wrapping_add(1).max(1);
				self.tasks[i] = Task::EMPTY;
				self.tasks[i].pid = pid;
				self.tasks[i].state = State::Embryo;
				return Ok(TaskIdx::new(i));
			}
		}
		Err(Error::TableFull)
	}

	fn find_by_pid(&self, pid: Pid) -> Option<TaskIdx> {
		(0..NPROC)
			.find(|&i| self.tasks[i].state != State::Unused && self.tasks[i].pid == pid)
			.map(TaskIdx::new)
	}

	pub fn current(&self) -> Option<TaskIdx> {
		self.current
	}

	pub fn task(&self, idx: TaskIdx) -> &Task {
		&self.tasks[idx.index()]
	}

	pub fn task_mut(&mut self, idx: TaskIdx) -> &mut Task {
		&mut self.tasks[idx.index()]
	}

	/// Iterate all non-`Unused` slots, for `ps`/`procdump`.
	pub fn iter_live(&self) -> impl Iterator<Item = (TaskIdx, &Task)> {
		(0..NPROC)
			.map(|i| (TaskIdx::new(i), &self.tasks[i]))
			.filter(|(_, t)| t.state != State::Unused)
	}

	/// Set the slot this CPU is dispatching; used only by the per-CPU
	/// scheduler loop.
	pub fn set_current(&mut self, idx: Option<TaskIdx>) {
		self.current = idx;
	}
}

pub static TABLE: Spinlock<TaskTable> = Spinlock::new(TaskTable::new());
pub static TREE: Spinlock<CfsTree> = Spinlock::new(CfsTree::new());

/// Best-effort current pid, for log annotation. Uses `try_lock` so a
/// log call made while the table lock is already held (the common case,
/// since lifecycle hooks log under the table lock) degrades to `None`
/// instead of deadlocking.
pub fn current_pid() -> Option<Pid> {
	let table = TABLE.try_lock()?;
	let idx = table.current?;
	Some(table.tasks[idx.index()].pid)
}

/// Find an `UNUSED` slot, transition it to `EMBRYO`, and assign it a
/// fresh pid. Exposed for direct callers (tests); `fork` uses the
/// already-locked table's own copy of this logic.
pub fn allocate_task() -> Result<TaskIdx> {
	let mut table = TABLE.lock();
	table.allocate()
}

fn wake_one(task: &mut Task, idx: TaskIdx, tree: &mut CfsTree) {
	task.state = State::Runnable;
	task.channel = None;
	scheduler::advance_vruntime(task);
	if tree.insert(idx, task.vruntime, task.weight).is_err() {
		logging::log_error("process", "wake: tree rejected a task the table had room for");
	}
}

fn wake_locked(table: &mut TaskTable, channel: Channel) {
	let mut tree = TREE.lock();
	for i in 0..NPROC {
		if table.tasks[i].state == State::Sleeping && table.tasks[i].channel == Some(channel) {
			wake_one(&mut table.tasks[i], TaskIdx::new(i), &mut tree);
		}
	}
}

/// Wake every task sleeping on `channel`. Level-triggered: a task not
/// currently sleeping on `channel` is simply not touched, so spurious
/// wakes are harmless and callers must tolerate them.
pub fn wake(channel: Channel) {
	let mut table = TABLE.lock();
	wake_locked(&mut table, channel);
}

/// Assumes the table lock is already held by the caller. Mirrors the
/// xv6 `sleep(chan, lk)` special case where the passed-in lock *is* the
/// table lock: there is nothing to drop and reacquire. Rust's spinlocks
/// are not reentrant, so this path is a distinct internal helper rather
/// than a runtime branch inside the public `sleep`.
fn sleep_locked(table: &mut TaskTable, channel: Channel) {
	let idx = table.current.expect("sleep_locked: no current task");
	table.tasks[idx.index()].channel = Some(channel);
	table.tasks[idx.index()].state = State::Sleeping;
	scheduler::sched(table);
	table.tasks[idx.index()].channel = None;
}

/// The general sleep primitive for a caller that holds some other lock
/// `user_lock_guard` while waiting for `channel`. Acquires the table
/// lock first, then drops `user_lock_guard` — closing the race window
/// where a wakeup could be missed between checking a condition and
/// sleeping. The caller is responsible for re-acquiring its own lock
/// after this returns.
pub fn sleep<T>(channel: Channel, user_lock_guard: SpinlockGuard<'_, T>) {
	let mut table = TABLE.lock();
	drop(user_lock_guard);
	sleep_locked(&mut table, channel);
}

/// Block the caller for at least `ticks` timer ticks. The timer tick
/// hook wakes `TICKS_CHANNEL` every tick; each wake re-checks the
/// deadline, matching the classic `sys_sleep` pattern of looping on a
/// shared "ticks changed" channel rather than arming a per-sleeper
/// timer.
pub fn sleep_ticks(ticks: u64) {
	let wake_at = crate::time::get_jiffies().as_u64() + ticks;
	loop {
		let mut table = TABLE.lock();
		let idx = table.current.expect("sleep_ticks: no current task");
		if crate::time::get_jiffies().as_u64() >= wake_at || table.tasks[idx.index()].killed {
			return;
		}
		sleep_locked(&mut table, TICKS_CHANNEL);
	}
}

/// Create a child: copy the parent's `nice`, place it at the tree's
/// current `min_vruntime` (so it neither starves nor dominates the
/// existing population — see DESIGN.md), and enqueue it runnable.
pub fn fork() -> Result<Pid> {
	let mut table = TABLE.lock();
	let parent_idx = table.current.expect("fork: no current task");
	let child_idx = table.allocate()?;

	let (parent_pid, parent_nice, parent_name) = {
		let p = &table.tasks[parent_idx.index()];
		(p.pid, p.nice, p.name)
	};

	let child_weight = weight::weight_from_nice(parent_nice);
	{
		let c = &mut table.tasks[child_idx.index()];
		c.nice = parent_nice;
		c.weight = child_weight;
		c.parent = Some(parent_pid);
		c.name = parent_name;
	}

	let min_v = TREE.lock().min_vruntime().unwrap_or(0);
	{
		let c = &mut table.tasks[child_idx.index()];
		c.vruntime = min_v;
		c.state = State::Runnable;
	}

	if let Err(e) = TREE.lock().insert(child_idx, min_v, child_weight) {
		table.tasks[child_idx.index()] = Task::EMPTY;
		return Err(e);
	}

	let child_pid = table.tasks[child_idx.index()].pid;
	logging::log_debug("process", &format!("fork: {} -> child {}", parent_pid, child_pid));
	Ok(child_pid)
}

/// Terminate the caller. The exiting task was already popped from the
/// tree before it started running, so there is nothing to dequeue here.
/// Never returns: control passes to `sched()` and the slot is reclaimed
/// later by the parent's `wait()`.
pub fn exit(code: i32) -> ! {
	let mut table = TABLE.lock();
	let idx = table.current.expect("exit: no current task");
	let pid = table.tasks[idx.index()].pid;
	let parent = table.tasks[idx.index()].parent;

	table.tasks[idx.index()].state = State::Zombie;
	table.tasks[idx.index()].exit_code = code;

	for i in 0..NPROC {
		if table.tasks[i].parent == Some(pid) {
			table.tasks[i].parent = Some(INIT_PID);
		}
	}

	if let Some(parent_pid) = parent {
		if let Some(parent_idx) = table.find_by_pid(parent_pid) {
			wake_locked(&mut table, parent_idx.index());
		}
	}

	scheduler::sched(&mut table);
	panic!("exit: sched() returned into a ZOMBIE frame");
}

/// Reap one zombie child, blocking until one is available. Sleeps on
/// the caller's own slot index as the wait channel — `exit()` wakes
/// that exact channel when a child becomes a zombie.
pub fn wait() -> Result<Pid> {
	let mut table = TABLE.lock();
	loop {
		let caller_idx = table.current.expect("wait: no current task");
		let caller_pid = table.tasks[caller_idx.index()].pid;

		let mut has_children = false;
		let mut zombie: Option<usize> = None;
		for i in 0..NPROC {
			if table.tasks[i].state != State::Unused && table.tasks[i].parent == Some(caller_pid) {
				has_children = true;
				if table.tasks[i].state == State::Zombie {
					zombie = Some(i);
					break;
				}
			}
		}

		if let Some(i) = zombie {
			let pid = table.tasks[i].pid;
			table.tasks[i] = Task::EMPTY;
			return Ok(pid);
		}

		if !has_children || table.tasks[caller_idx.index()].killed {
			return Err(Error::ECHILD);
		}

		sleep_locked(&mut table, caller_idx.index());
	}
}

/// Mark `pid` for termination. If it is currently sleeping, wake it
/// exactly as `wake` would so it observes `killed` on its next return to
/// user space.
pub fn kill(pid: Pid) -> Result<()> {
	let mut table = TABLE.lock();
	let idx = table.find_by_pid(pid).ok_or(Error::ESRCH)?;
	table.tasks[idx.index()].killed = true;
	if table.tasks[idx.index()].state == State::Sleeping {
		let channel = table.tasks[idx.index()]
			.channel
			.expect("a sleeping task always has a channel");
		wake_locked(&mut table, channel);
	}
	Ok(())
}

/// Preempt the caller if the policy says to: advance its `vruntime`,
/// mark it runnable, re-enqueue it, and reschedule. A no-op otherwise.
pub fn yield_now() {
	let mut table = TABLE.lock();
	let idx = table.current.expect("yield_now: no current task");

	let min_v = TREE.lock().min_vruntime();
	let (cruntime, timeslice, vruntime) = {
		let t = &table.tasks[idx.index()];
		(t.cruntime, t.timeslice, t.vruntime)
	};

	if !scheduler::should_preempt(cruntime, timeslice, vruntime, min_v) {
		return;
	}

	scheduler::advance_vruntime(&mut table.tasks[idx.index()]);
	table.tasks[idx.index()].state = State::Runnable;
	let (new_v, w) = {
		let t = &table.tasks[idx.index()];
		(t.vruntime, t.weight)
	};
	if TREE.lock().insert(idx, new_v, w).is_err() {
		logging::log_error("process", "yield_now: tree rejected a task the table had room for");
	}

	scheduler::sched(&mut table);
}

/// Adjust the caller's `nice` by `delta`, clamped to `[-20, 19]`.
/// Returns the resulting nice value. The new `weight` is recomputed
/// immediately (so diagnostics see it right away), though it only
/// governs scheduling from the task's next enqueue onward.
pub fn nice(delta: i32) -> i32 {
	let mut table = TABLE.lock();
	let idx = table.current.expect("nice: no current task");
	let t = &mut table.tasks[idx.index()];
	let new_nice = (t.nice as i32 + delta).clamp(-20, 19) as i8;
	t.nice = new_nice;
	t.weight = weight::weight_from_nice(new_nice);
	new_nice as i32
}

/// Name the caller. Not one of spec.md's lifecycle hooks; a small
/// amenity `ps()` and the tests rely on for readable output.
pub fn set_current_name(name: &str) {
	let mut table = TABLE.lock();
	if let Some(idx) = table.current {
		table.tasks[idx.index()].set_name(name);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reset() {
		let mut t = TABLE.lock();
		*t = TaskTable::new();
		let mut tr = TREE.lock();
		*tr = CfsTree::new();
	}

	#[test_case]
	fn allocate_then_reclaim_roundtrip() {
		reset();
		let idx = allocate_task().unwrap();
		{
			let mut t = TABLE.lock();
			assert_eq!(t.task(idx).state(), State::Embryo);
			t.task_mut(idx).state = State::Unused;
		}
	}

	#[test_case]
	fn find_by_pid_ignores_unused_slots() {
		reset();
		let table = TABLE.lock();
		assert!(table.find_by_pid(Pid(12345)).is_none());
	}
}
