// SPDX-License-Identifier: GPL-2.0

//! Compile-time scheduler tunables.
//!
//! These are not runtime-configurable: they are baked into the binary the
//! way `time::HZ` and `types::PAGE_SIZE` already are in this crate.

/// Number of task table slots. Bounds both the task table and the CFS tree
/// (a task not in the table cannot be in the tree), so the tree's own
/// capacity check is defensive.
pub const NPROC: usize = 64;

/// Minimum time, in timer ticks, a dispatched task is guaranteed to run
/// before it can be preempted by a fairer task (minimum granularity).
pub const MIN_GRANULARITY: u64 = 40;

/// Target latency, in timer ticks, within which every runnable task
/// should be dispatched at least once.
pub const SCHED_LATENCY: u64 = 320;

/// Weight assigned to `nice == 0`; the reference point the vruntime
/// advancement formula normalizes against.
pub const NOMINAL_WEIGHT: u32 = 1024;

const _: () = assert!(
	SCHED_LATENCY % MIN_GRANULARITY == 0,
	"SCHED_LATENCY must be a multiple of MIN_GRANULARITY"
);
