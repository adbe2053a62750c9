//! Connect completion delivery.
//!
//! `connect` returns before the handshake finishes. The outcome is sent
//! to the connecting process later, from the stack's context, through a
//! one-shot slot keyed by pid.
//!
//! # Implementors
//!
//! - `OneshotCompletions` (default, ksock-module): one single-entry queue
//!   per armed pid. The process side polls `try_take`.

use crate::error::CompletionError;
use crate::ids::Pid;

/// One-shot delivery of connect outcomes to processes.
///
/// **Contract:**
/// - `arm(pid)` opens exactly one slot; arming again before the outcome
///   is taken fails with `AlreadyArmed`.
/// - `complete(pid, result)` fills the slot once. `result` is `0` on
///   success or a negative errno.
/// - `complete()` and `arm()` never block: they run in the stack's
///   context as well as the syscall path.
pub trait CompletionSink: Send + Sync {
    /// Open the slot for a connect about to be issued by `pid`.
    fn arm(&self, pid: Pid) -> Result<(), CompletionError>;

    /// Close an armed slot without delivering anything (connect rejected).
    fn disarm(&self, pid: Pid);

    /// Deliver the outcome for `pid`.
    fn complete(&self, pid: Pid, result: i32) -> Result<(), CompletionError>;
}
