// SPDX-License-Identifier: GPL-2.0

//! `ps`/`procdump`: the scheduler core's one diagnostic surface (spec
//! §6). Walks the task table under the table lock, then the tree under
//! the tree lock, and writes the fixed line format spec.md §6 specifies
//! to the console. No state of its own to initialize; `init_diagnostics`
//! exists only so `init.rs` has a uniform subsystem-bringup call.

use alloc::format;

use crate::console;
use crate::process::{self, State};
use crate::types::Pid;

/// Nothing to set up; kept as a named entry point for `init.rs`'s
/// subsystem bring-up sequence.
pub fn init_diagnostics() {
	crate::logging::log_info("diagnostics", "diagnostics ready");
}

/// Up to ten saved caller program counters for a `SLEEPING` task.
/// Walking the saved stack to find them is the trap-frame collaborator's
/// job (out of scope per spec §1); this crate has nothing to walk, so
/// it honestly reports zero frames rather than fabricating addresses.
fn saved_pcs(_pid: Pid) -> alloc::vec::Vec<u64> {
	alloc::vec::Vec::new()
}

/// Emit the diagnostic listing: one line per non-`UNUSED` task slot,
/// then the tree's in-order contents bracketed by `Tree:`/`Tree done!`.
pub fn procdump() {
	let table = process::TABLE.lock();
	for (_idx, task) in table.iter_live() {
		let state = task.state();
		let mut line = format!(
			"{} {} {} {} {}",
			task.pid().0,
			state.as_str(),
			task.name_str(),
			task.nice(),
			task.truntime(),
		);
		if state == State::Runnable || state == State::Running {
			line.push_str(&format!(" [{} {}]", task.cruntime(), task.vruntime()));
		}
		if state == State::Sleeping {
			for pc in saved_pcs(task.pid()) {
				line.push_str(&format!(" {:#x}", pc));
			}
		}
		console::write_str(&line);
		console::write_str("\n");
	}
	drop(table);

	console::write_str("Tree:\n");
	let table = process::TABLE.lock();
	let tree = process::TREE.lock();
	for idx in tree.in_order() {
		let task = table.task(idx);
		console::write_str(&format!(
			"pid:{} vrun:{} name:{}\n",
			task.pid().0,
			tree.vruntime(idx),
			task.name_str(),
		));
	}
	drop(tree);
	drop(table);
	console::write_str("Tree done!\n");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn state_labels_are_uppercase() {
		assert_eq!(State::Runnable.as_str(), "RUNNABLE");
		assert_eq!(State::Sleeping.as_str(), "SLEEPING");
		assert_eq!(State::Zombie.as_str(), "ZOMBIE");
	}

	#[test_case]
	fn saved_pcs_is_honestly_empty() {
		assert!(saved_pcs(Pid(1)).is_empty());
	}
}
