// SPDX-License-Identifier: GPL-2.0

//! Error handling types and utilities

use core::fmt;

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// Generic error
	Generic,
	/// Invalid argument
	InvalidArgument,
	/// Task table (and therefore CFS tree) has no free slot
	TableFull,
	/// No such process (ESRCH)
	ESRCH,
	/// No child process (ECHILD)
	ECHILD,
	/// Function not implemented (ENOSYS)
	ENOSYS,
	/// Generic I/O error (EIO)
	EIO,
	/// Out of memory (ENOMEM)
	ENOMEM,
}

impl Error {
	/// Convert error to errno value
	pub fn to_errno(self) -> i32 {
		match self {
			Error::Generic => -1,         // EPERM
			Error::InvalidArgument => -22, // EINVAL
			Error::TableFull => -11,      // EAGAIN
			Error::ESRCH => -3,           // ESRCH
			Error::ECHILD => -10,         // ECHILD
			Error::ENOSYS => -38,         // ENOSYS
			Error::EIO => -5,             // EIO
			Error::ENOMEM => -12,         // ENOMEM
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Generic => write!(f, "Generic error"),
			Error::InvalidArgument => write!(f, "Invalid argument"),
			Error::TableFull => write!(f, "Task table full"),
			Error::ESRCH => write!(f, "No such process"),
			Error::ECHILD => write!(f, "No child processes"),
			Error::ENOSYS => write!(f, "Function not implemented"),
			Error::EIO => write!(f, "Input/output error"),
			Error::ENOMEM => write!(f, "Out of memory"),
		}
	}
}

/// Kernel result type
pub type Result<T> = core::result::Result<T, Error>;

impl From<()> for Error {
	fn from(_: ()) -> Self {
		Error::Generic
	}
}

impl From<core::alloc::AllocError> for Error {
	fn from(_: core::alloc::AllocError) -> Self {
		Error::ENOMEM
	}
}
