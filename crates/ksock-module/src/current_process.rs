//! `CurrentProcess`: default `ProcessContext` implementation.
//!
//! The scheduler calls `switch_to()` when it dispatches a process; syscalls
//! running afterwards read it back.

use ksock_core::ids::Pid;
use ksock_core::process::ProcessContext;

use std::sync::atomic::{AtomicU32, Ordering};

pub struct CurrentProcess {
    pid: AtomicU32,
}

impl CurrentProcess {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid: AtomicU32::new(pid.0),
        }
    }

    /// Record `pid` as the running process.
    pub fn switch_to(&self, pid: Pid) {
        self.pid.store(pid.0, Ordering::Release);
    }
}

impl ProcessContext for CurrentProcess {
    fn current_pid(&self) -> Pid {
        Pid(self.pid.load(Ordering::Acquire))
    }
}
