//! Receive path and its backpressure buffer.
//!
//! A socket holds at most one received chunk. While it is held, the
//! event path refuses further data with a busy reply and the stack keeps
//! it; once a reader drains the chunk the next delivery is accepted.

use ksock_core::{ktrace, Fd, PacketBuf, SockError, SockResult, SocketCache};

use crate::layer::{Platform, SocketLayer};
use crate::socket::Protocol;

#[derive(Debug)]
pub struct RecvBuffer<B> {
    chunk: Option<B>,
    offset: usize,
    closed: bool,
}

impl<B> Default for RecvBuffer<B> {
    fn default() -> Self {
        Self {
            chunk: None,
            offset: 0,
            closed: false,
        }
    }
}

impl<B: PacketBuf> RecvBuffer<B> {
    /// Store a chunk, or hand it back if one is still pending. Empty
    /// chunks are accepted and dropped.
    pub fn offer(&mut self, chunk: B) -> Result<(), B> {
        if self.chunk.is_some() {
            return Err(chunk);
        }
        if chunk.total_len() > 0 {
            self.chunk = Some(chunk);
            self.offset = 0;
        }
        Ok(())
    }

    /// Copy pending bytes into `dst`.
    ///
    /// With nothing pending this is `EndOfStream` once the receive side
    /// is closed, `RetryLater` otherwise.
    pub fn read(&mut self, dst: &mut [u8]) -> SockResult<usize> {
        let chunk = match self.chunk.as_ref() {
            Some(c) => c,
            None if self.closed => return Err(SockError::EndOfStream),
            None => return Err(SockError::RetryLater),
        };
        let total = chunk.total_len();
        let n = chunk.copy_partial(dst, self.offset);
        self.offset += n;
        debug_assert!(self.offset <= total);
        if self.offset >= total {
            self.chunk = None;
            self.offset = 0;
        }
        Ok(n)
    }

    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn has_chunk(&self) -> bool {
        self.chunk.is_some()
    }

    /// Unread bytes of the pending chunk.
    pub fn pending_len(&self) -> usize {
        self.chunk.as_ref().map_or(0, |c| c.total_len() - self.offset)
    }

    /// Release the pending chunk.
    pub fn clear(&mut self) {
        self.chunk = None;
        self.offset = 0;
    }
}

impl<P: Platform> SocketLayer<P> {
    /// Read received bytes into `buf`. Returns the count copied.
    pub fn recv(&self, fd: Fd, buf: &mut [u8]) -> SockResult<usize> {
        let id = self.lookup(fd)?;
        self.cache
            .with(id, |sock| {
                if sock.protocol != Protocol::Tcp || buf.is_empty() {
                    return Err(SockError::InvalidArgument);
                }
                let n = sock.recv.read(buf)?;
                ktrace!("{}: recv {} bytes, {} left", id, n, sock.recv.pending_len());
                Ok(n)
            })
            .ok_or(SockError::BadDescriptor)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_reads_then_release() {
        let mut rb = RecvBuffer::default();
        rb.offer((0u8..10).collect::<Vec<u8>>()).unwrap();
        let mut dst = [0u8; 4];
        assert_eq!(rb.read(&mut dst), Ok(4));
        assert_eq!(dst, [0, 1, 2, 3]);
        assert_eq!(rb.pending_len(), 6);
        let mut rest = [0u8; 16];
        assert_eq!(rb.read(&mut rest), Ok(6));
        assert_eq!(&rest[..6], &[4, 5, 6, 7, 8, 9]);
        assert!(!rb.has_chunk());
        assert_eq!(rb.read(&mut rest), Err(SockError::RetryLater));
    }

    #[test]
    fn second_chunk_is_refused_while_pending() {
        let mut rb = RecvBuffer::default();
        rb.offer(vec![1u8]).unwrap();
        assert_eq!(rb.offer(vec![2u8, 3]), Err(vec![2, 3]));
        let mut dst = [0u8; 1];
        rb.read(&mut dst).unwrap();
        assert!(rb.offer(vec![2u8, 3]).is_ok());
    }

    #[test]
    fn closed_drains_then_ends() {
        let mut rb = RecvBuffer::default();
        rb.offer(vec![7u8; 3]).unwrap();
        rb.mark_closed();
        let mut dst = [0u8; 8];
        assert_eq!(rb.read(&mut dst), Ok(3));
        assert_eq!(rb.read(&mut dst), Err(SockError::EndOfStream));
    }

    #[test]
    fn empty_chunk_is_dropped() {
        let mut rb = RecvBuffer::default();
        rb.offer(Vec::<u8>::new()).unwrap();
        assert!(!rb.has_chunk());
    }
}
