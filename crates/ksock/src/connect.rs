//! Active open and its asynchronous completion.
//!
//! `connect` returns as soon as the stack accepts the request. The
//! outcome arrives later as a `Connected` event (or an `Err` event if the
//! attempt dies first) and is delivered to the connecting process
//! through its one-shot completion slot: `0` on success, a negative
//! errno otherwise.

use ksock_core::{
    kdebug, CompletionSink, Fd, Pid, ProcessContext, ProtocolStack, SockAddrIn, SockError,
    SockResult, SocketCache, SocketId, StackErr, StackResult,
};

use crate::layer::{Platform, SocketLayer};

/// Completion message for a connect outcome.
#[inline]
pub fn completion_code(outcome: StackResult<()>) -> i32 {
    match outcome {
        Ok(()) => 0,
        Err(e) => -e.errno(),
    }
}

impl<P: Platform> SocketLayer<P> {
    /// Start connecting to `remote`. TCP only.
    ///
    /// A second connect while one is outstanding fails with
    /// `Stack(Already)`.
    pub fn connect(&self, fd: Fd, remote: SockAddrIn) -> SockResult<()> {
        let id = self.lookup(fd)?;
        let pid = self.procs.current_pid();
        self.cache
            .with(id, |sock| {
                let pcb = match sock.pcb {
                    Some(pcb) if sock.is_tcp() && !sock.listening => pcb,
                    _ => return Err(SockError::InvalidArgument),
                };
                if !sock.owner.is_none() {
                    return Err(SockError::Stack(StackErr::Already));
                }
                // Armed first: the completion may fire before connect returns.
                self.completions
                    .arm(pid)
                    .map_err(|_| SockError::Stack(StackErr::Already))?;
                sock.owner = pid;
                match self.stack.connect(pcb, remote) {
                    Ok(()) => {
                        kdebug!("{}: {} connecting to {}", id, pid, remote);
                        Ok(())
                    }
                    Err(e) => {
                        sock.owner = Pid::NONE;
                        self.completions.disarm(pid);
                        kdebug!("{}: connect to {} refused: {}", id, remote, e);
                        Err(SockError::Stack(e))
                    }
                }
            })
            .ok_or(SockError::BadDescriptor)?
    }

    /// Deliver a connect outcome to `pid`.
    ///
    /// # Panics
    ///
    /// If the slot cannot take it: the one-completion-per-connect
    /// contract is broken.
    pub(crate) fn finish_connect(&self, id: SocketId, pid: Pid, outcome: StackResult<()>) {
        let code = completion_code(outcome);
        if let Err(e) = self.completions.complete(pid, code) {
            panic!("ksock: {}: connect completion undeliverable: {}", id, e);
        }
        kdebug!("{}: connect by {} finished with {}", id, pid, code);
    }
}
