// SPDX-License-Identifier: GPL-2.0

//! Synchronization primitives.
//!
//! The scheduler core needs an xv6-style interrupt-save spinlock:
//! acquiring disables local interrupts and bumps a nesting counter;
//! releasing decrements the counter and, on reaching zero, restores
//! whatever the interrupt-enable flag was before the outermost acquire.
//! `spin::Mutex`/`RwLock` don't model that save/restore, so the table
//! lock and tree lock are both instances of the `Spinlock<T>` defined
//! here instead.

pub use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub use spin::Mutex;
pub use spin::RwLock;

/// Per-CPU interrupt nesting state. APIC/CPU enumeration lives outside
/// this crate, so it only ever runs as a single logical CPU; a real SMP
/// port would replace this with one instance per CPU indexed by
/// `arch::cpu_id()`.
struct IntrState {
	/// Nesting depth of `push_off`/`pop_off` pairs.
	depth: AtomicUsize,
	/// Interrupt-enable flag as it was before the outermost `push_off`.
	was_enabled: AtomicBool,
}

static INTR: IntrState = IntrState {
	depth: AtomicUsize::new(0),
	was_enabled: AtomicBool::new(true),
};

#[cfg(target_arch = "x86_64")]
fn interrupts_enabled() -> bool {
	let flags: u64;
	unsafe {
		core::arch::asm!("pushfq; pop {}", out(reg) flags);
	}
	flags & 0x200 != 0
}

#[cfg(target_arch = "x86_64")]
fn disable_interrupts() {
	unsafe { core::arch::asm!("cli") };
}

#[cfg(target_arch = "x86_64")]
fn enable_interrupts() {
	unsafe { core::arch::asm!("sti") };
}

#[cfg(not(target_arch = "x86_64"))]
fn interrupts_enabled() -> bool {
	true
}

#[cfg(not(target_arch = "x86_64"))]
fn disable_interrupts() {}

#[cfg(not(target_arch = "x86_64"))]
fn enable_interrupts() {}

/// Disable interrupts, recording the prior state on the first (outermost)
/// call so `pop_off` can restore it.
fn push_off() {
	let was_enabled = interrupts_enabled();
	disable_interrupts();
	if INTR.depth.load(Ordering::Relaxed) == 0 {
		INTR.was_enabled.store(was_enabled, Ordering::Relaxed);
	}
	INTR.depth.fetch_add(1, Ordering::Relaxed);
}

/// Undo one `push_off`. Restores interrupts only once the nesting count
/// returns to zero.
fn pop_off() {
	let depth = INTR.depth.load(Ordering::Relaxed);
	assert!(depth > 0, "pop_off without matching push_off");
	let depth = depth - 1;
	INTR.depth.store(depth, Ordering::Relaxed);
	if depth == 0 && INTR.was_enabled.load(Ordering::Relaxed) {
		enable_interrupts();
	}
}

/// Current nesting depth; `sched()` asserts this is exactly 1 on entry.
pub fn intr_nesting_depth() -> usize {
	INTR.depth.load(Ordering::Relaxed)
}

/// Unconditionally enable interrupts, outside of any `push_off`/`pop_off`
/// nesting. Used only by `init.rs`'s per-CPU scheduler loop to satisfy
/// step 1 of the dispatch contract before it acquires the table lock.
pub fn enable_interrupts_unchecked() {
	enable_interrupts();
}

/// An interrupt-save spinlock. Both the task table lock and the CFS tree
/// lock (`process::TABLE` and `process::TREE`) are instances of this.
pub struct Spinlock<T> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

impl<T> Spinlock<T> {
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}

	pub fn lock(&self) -> SpinlockGuard<'_, T> {
		push_off();
		while self
			.locked
			.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
			.is_err()
		{
			while self.locked.load(Ordering::Relaxed) {
				core::hint::spin_loop();
			}
		}

		SpinlockGuard { lock: self }
	}

	pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
		push_off();
		if self
			.locked
			.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
			.is_ok()
		{
			Some(SpinlockGuard { lock: self })
		} else {
			pop_off();
			None
		}
	}

	/// Whether this lock is currently held by someone (racy outside a
	/// critical section; used only by `sched()`'s invariant assertions).
	pub fn is_locked(&self) -> bool {
		self.locked.load(Ordering::Relaxed)
	}
}

pub struct SpinlockGuard<'a, T> {
	lock: &'a Spinlock<T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.lock.data.get() }
	}
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.lock.data.get() }
	}
}

impl<T> Drop for SpinlockGuard<'_, T> {
	fn drop(&mut self) {
		self.lock.locked.store(false, Ordering::Release);
		pop_off();
	}
}
