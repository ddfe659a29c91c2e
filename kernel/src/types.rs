// SPDX-License-Identifier: GPL-2.0

//! Common kernel types shared across the scheduler core and its
//! collaborators.

use core::fmt;
use core::ops::{Add, Sub};

/// Process ID — the small dense integer that identifies a task for the
/// lifetime of the system. Reused once a task's slot is reclaimed back
/// to `UNUSED` (by `process::wait`, when it reaps a zombie child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A CPU number. APIC/CPU enumeration is an external collaborator; this
/// is just the label the per-CPU scheduler loop logs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Timer ticks since boot. The unit `cruntime`/`vruntime`/`timeslice`
/// arithmetic is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Jiffies(pub u64);

impl Jiffies {
	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

impl Add<u64> for Jiffies {
	type Output = Jiffies;

	fn add(self, rhs: u64) -> Self::Output {
		Jiffies(self.0 + rhs)
	}
}

impl Sub<Jiffies> for Jiffies {
	type Output = Jiffies;

	fn sub(self, rhs: Jiffies) -> Self::Output {
		Jiffies(self.0.saturating_sub(rhs.0))
	}
}

/// Page size constants, used by the kernel-stack bump allocator in
/// `collab.rs`.
pub const PAGE_SIZE: usize = 4096;
