// SPDX-License-Identifier: GPL-2.0

//! Thin stand-ins for the collaborators the scheduler core consumes but
//! does not itself implement: the kernel heap, per-task kernel stacks,
//! and address-space switching. Virtual memory is explicitly out of
//! scope (see spec §1) — this module exists only so the scheduler core
//! has something honest to call and test against, not as a VM subsystem.

use linked_list_allocator::LockedHeap;

use crate::config::NPROC;
use crate::error::{Error, Result};
use crate::types::PAGE_SIZE;

/// Backing storage for the kernel heap. 1 MiB is enough for the task
/// table, tree side-tables, and logging buffers this crate allocates;
/// a real kernel would size this from the memory map a boot collaborator
/// discovers, which is out of scope here.
const HEAP_SIZE: usize = 1024 * 1024;
static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the global allocator. Must run once, before any code that
/// touches `alloc::` types (`Vec`, `String`, the logger's entry buffer).
pub fn init_heap() {
	unsafe {
		ALLOCATOR
			.lock()
			.init(core::ptr::addr_of_mut!(HEAP) as *mut u8, HEAP_SIZE);
	}
}

/// Kernel stack size per task. xv6 uses one page; this crate's tasks
/// never actually run code, so this bounds the stand-in arena below
/// rather than reflecting a measured requirement.
const KERNEL_STACK_SIZE: usize = PAGE_SIZE * 2;

/// A static arena of `NPROC` kernel stacks, handed out by a simple bump
/// allocator keyed by task slot rather than a general-purpose allocator —
/// stacks are never freed independently of the task that owns them, so a
/// free list would buy nothing `process::TaskTable`'s own slot reuse
/// doesn't already provide.
static mut STACK_ARENA: [[u8; KERNEL_STACK_SIZE]; NPROC] = [[0; KERNEL_STACK_SIZE]; NPROC];

/// Hand out the kernel stack for task slot `slot`, returning the initial
/// (top-of-stack) stack pointer a fresh `Context::rsp` should use.
pub fn allocate_kernel_stack(slot: usize) -> Result<u64> {
	if slot >= NPROC {
		return Err(Error::InvalidArgument);
	}
	unsafe {
		let base = core::ptr::addr_of_mut!(STACK_ARENA[slot]) as *mut u8 as u64;
		Ok(base + KERNEL_STACK_SIZE as u64)
	}
}

/// Release the kernel stack for task slot `slot`. A no-op: the backing
/// memory is reclaimed implicitly when `process::allocate_task` reuses
/// the slot, since `allocate_kernel_stack` always re-derives the same
/// address from the slot index.
pub fn free_kernel_stack(_slot: usize) {}

/// Switch the MMU to `cr3`. A stand-in: without a VM subsystem there is
/// no page table to switch to, so this only updates the register — real
/// address-space isolation is a VM collaborator's job, out of scope here.
pub fn switch_address_space(cr3: u64) {
	unsafe {
		core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
	}
}

/// Switch back to the kernel's own address space (`cr3 == 0`, the
/// identity mapping this stand-in assumes throughout).
pub fn switch_to_kernel_address_space() {
	switch_address_space(0);
}

/// Duplicate an address space for `fork()`. Without a VM subsystem there
/// are no page tables to copy; this stand-in has the child share the
/// parent's `cr3` rather than perform a real copy-on-write clone.
pub fn copy_address_space(parent_cr3: u64, _size: usize) -> Result<u64> {
	Ok(parent_cr3)
}

/// Release an address space at `exit()`. A no-op for the same reason
/// `copy_address_space` does not allocate one.
pub fn free_address_space(_cr3: u64) {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn kernel_stack_addresses_are_distinct_per_slot() {
		let a = allocate_kernel_stack(0).unwrap();
		let b = allocate_kernel_stack(1).unwrap();
		assert_ne!(a, b);
	}

	#[test_case]
	fn kernel_stack_rejects_out_of_range_slot() {
		assert!(allocate_kernel_stack(NPROC).is_err());
	}

	#[test_case]
	fn copy_address_space_is_a_share_not_a_copy() {
		assert_eq!(copy_address_space(0x1000, PAGE_SIZE).unwrap(), 0x1000);
	}
}
