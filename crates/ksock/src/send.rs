//! Send path.
//!
//! Writes never exceed the stack's send window at call time, so a large
//! buffer goes out over several calls. The returned count is what the
//! stack took.

use ksock_core::{ktrace, Fd, ProtocolStack, SockError, SockResult, SocketCache, StackErr};

use crate::layer::{Platform, SocketLayer};

impl<P: Platform> SocketLayer<P> {
    /// Queue up to `data.len()` bytes and push them out. `flags` are
    /// accepted and ignored.
    pub fn send(&self, fd: Fd, data: &[u8], _flags: i32) -> SockResult<usize> {
        let id = self.lookup(fd)?;
        self.cache
            .with(id, |sock| {
                let pcb = match sock.pcb {
                    Some(pcb) if sock.is_tcp() => pcb,
                    _ => return Err(SockError::InvalidArgument),
                };
                if data.is_empty() {
                    return Ok(0);
                }
                let window = self.stack.send_window(pcb);
                if window == 0 {
                    return Err(SockError::RetryLater);
                }
                let n = data.len().min(window);
                match self.stack.write(pcb, &data[..n]) {
                    Ok(()) => {
                        if let Err(e) = self.stack.output(pcb) {
                            ktrace!("{}: output deferred: {}", id, e);
                        }
                        ktrace!("{}: sent {}/{} bytes (window {})", id, n, data.len(), window);
                        Ok(n)
                    }
                    Err(StackErr::Mem) => Err(SockError::RetryLater),
                    Err(e) => {
                        ktrace!("{}: write refused: {}", id, e);
                        Err(SockError::InvalidArgument)
                    }
                }
            })
            .ok_or(SockError::BadDescriptor)?
    }
}
