//! Process identity abstraction.
//!
//! # Implementors
//!
//! - `CurrentProcess` (ksock-module): the scheduler stores the running
//!   pid on every switch; the socket layer reads it.

use crate::ids::Pid;

/// Identity of the process on whose behalf a syscall is running.
pub trait ProcessContext: Send + Sync {
    /// The calling process. Never `Pid::NONE` inside a syscall.
    fn current_pid(&self) -> Pid;
}
