//! Accept backlog: fixed slots of completed, unclaimed connections.
//!
//! Slots live inline in the listening socket, so queueing a connection
//! from the event path never allocates. Insertion takes the first empty
//! slot and `accept` takes the first occupied one; there is no age
//! ordering beyond that.

use ksock_core::{kdebug, SockAddrIn, SockError, SockResult, SocketCache, SocketId};
use ksock_core::{Descriptor, FileTable, Fd};

use crate::config::MAX_BACKLOG;
use crate::layer::{Platform, SocketLayer};
use crate::socket::Protocol;

/// A queued child connection and the peer it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub socket: SocketId,
    pub peer: SockAddrIn,
}

#[derive(Debug)]
pub struct Backlog {
    slots: [Option<Pending>; MAX_BACKLOG],
    capacity: usize,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [None; MAX_BACKLOG],
            capacity: capacity.clamp(1, MAX_BACKLOG),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue `entry` in the first empty slot. Gives it back when full.
    pub fn insert(&mut self, entry: Pending) -> Result<usize, Pending> {
        match self.slots[..self.capacity].iter().position(Option::is_none) {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                Ok(idx)
            }
            None => Err(entry),
        }
    }

    /// First occupied slot, left in place.
    pub fn first(&self) -> Option<(usize, Pending)> {
        self.slots[..self.capacity]
            .iter()
            .enumerate()
            .find_map(|(idx, slot)| slot.map(|p| (idx, p)))
    }

    pub fn take(&mut self, idx: usize) -> Option<Pending> {
        self.slots.get_mut(idx)?.take()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Empty every slot, yielding the queued entries.
    pub fn drain(&mut self) -> impl Iterator<Item = Pending> + '_ {
        self.slots.iter_mut().filter_map(Option::take)
    }
}

impl<P: Platform> SocketLayer<P> {
    /// Claim one queued connection from a listening socket.
    ///
    /// The child gets a fresh descriptor; its slot is emptied. An empty
    /// backlog is `RetryLater`, never a block.
    pub fn accept(&self, fd: Fd) -> SockResult<(Fd, SockAddrIn)> {
        let id = self.lookup(fd)?;
        let files = &self.files;
        self.cache
            .with(id, |sock| {
                if sock.protocol != Protocol::Tcp || !sock.listening {
                    return Err(SockError::InvalidArgument);
                }
                let (idx, pending) = sock.backlog.first().ok_or(SockError::RetryLater)?;
                let child_fd = files.alloc().ok_or(SockError::InvalidArgument)?;
                files.install(child_fd, Descriptor::socket(pending.socket));
                sock.backlog.take(idx);
                kdebug!("{}: accepted {} from {} as {}", id, pending.socket, pending.peer, child_fd);
                Ok((child_fd, pending.peer))
            })
            .ok_or(SockError::BadDescriptor)?
    }
}
