// SPDX-License-Identifier: GPL-2.0

//! Jiffies: the scheduler core's only notion of time.
//!
//! Everything here reduces to a single tick counter. Real wall-clock
//! time (TSC calibration, RTC reads, high-resolution timers) belongs to
//! a platform-timer collaborator outside this crate's scope (spec §1);
//! `timer::timer_tick` is this crate's only producer of ticks, and
//! `process::sleep_ticks` its only consumer of elapsed-ticks deadlines.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::types::Jiffies;

static JIFFIES_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Current tick count since boot.
pub fn get_jiffies() -> Jiffies {
	Jiffies(JIFFIES_COUNTER.load(Ordering::Relaxed))
}

/// Advance the tick count. Called once per timer interrupt by
/// `timer::timer_tick`.
pub fn update_jiffies() {
	JIFFIES_COUNTER.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn update_jiffies_advances_by_one() {
		let before = get_jiffies().as_u64();
		update_jiffies();
		assert_eq!(get_jiffies().as_u64(), before + 1);
	}
}
