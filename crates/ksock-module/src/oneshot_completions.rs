//! `OneshotCompletions`: default `CompletionSink` implementation.
//!
//! One slot per pid: armed (`None`) until the stack delivers, then
//! holding the outcome until the process takes it. Taking removes the
//! slot, so the process can connect again.

use ksock_core::completion::CompletionSink;
use ksock_core::error::CompletionError;
use ksock_core::ids::Pid;
use ksock_core::spinlock::SpinLock;
use ksock_core::{kdebug, ktrace};

use std::collections::HashMap;

#[derive(Default)]
pub struct OneshotCompletions {
    slots: SpinLock<HashMap<Pid, Option<i32>>>,
}

impl OneshotCompletions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the delivered outcome for `pid`, if any. Leaves an armed but
    /// undelivered slot in place.
    pub fn try_take(&self, pid: Pid) -> Option<i32> {
        let mut slots = self.slots.lock();
        let result = (*slots.get(&pid)?)?;
        slots.remove(&pid);
        ktrace!("completion: {} took {}", pid, result);
        Some(result)
    }

    pub fn is_armed(&self, pid: Pid) -> bool {
        self.slots.lock().contains_key(&pid)
    }

    /// Number of slots armed or holding an untaken outcome.
    pub fn outstanding(&self) -> usize {
        self.slots.lock().len()
    }
}

impl CompletionSink for OneshotCompletions {
    fn arm(&self, pid: Pid) -> Result<(), CompletionError> {
        let mut slots = self.slots.lock();
        if slots.contains_key(&pid) {
            return Err(CompletionError::AlreadyArmed(pid));
        }
        slots.insert(pid, None);
        Ok(())
    }

    fn disarm(&self, pid: Pid) {
        self.slots.lock().remove(&pid);
    }

    fn complete(&self, pid: Pid, result: i32) -> Result<(), CompletionError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(&pid) {
            None => Err(CompletionError::NotArmed(pid)),
            Some(Some(_)) => Err(CompletionError::Delivered(pid)),
            Some(slot) => {
                *slot = Some(result);
                kdebug!("completion: {} <- {}", pid, result);
                Ok(())
            }
        }
    }
}
