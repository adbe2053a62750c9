//! File-descriptor layer abstraction.
//!
//! The generic file layer hands out descriptor slots; a socket attaches
//! itself to one by installing a socket-backed `Descriptor`.

use crate::ids::{Fd, SocketId};

/// What a descriptor refers to. Only the socket case is this layer's
/// business; other kinds belong to the file layer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Allocated but not yet attached to anything.
    None,
    Socket(SocketId),
}

/// A process-visible descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub ty: FileType,
    pub readable: bool,
    pub writable: bool,
}

impl Descriptor {
    pub const EMPTY: Self = Self {
        ty: FileType::None,
        readable: false,
        writable: false,
    };

    /// A readable and writable descriptor backed by `socket`.
    pub const fn socket(socket: SocketId) -> Self {
        Self {
            ty: FileType::Socket(socket),
            readable: true,
            writable: true,
        }
    }

    #[inline]
    pub fn socket_id(&self) -> Option<SocketId> {
        match self.ty {
            FileType::Socket(id) => Some(id),
            FileType::None => None,
        }
    }
}

/// Allocates and tracks descriptors.
///
/// **Contract:**
/// - `alloc()` reserves a slot holding `Descriptor::EMPTY`.
/// - `release()` frees the slot and returns what it held, so the caller
///   can tear down whatever the descriptor referred to.
pub trait FileTable: Send + Sync {
    /// Reserve a descriptor. `None` when the table is full.
    fn alloc(&self) -> Option<Fd>;

    /// Fill a reserved descriptor.
    fn install(&self, fd: Fd, desc: Descriptor);

    /// Look up a descriptor.
    fn get(&self, fd: Fd) -> Option<Descriptor>;

    /// Free a descriptor, returning its contents.
    fn release(&self, fd: Fd) -> Option<Descriptor>;

    /// Number of descriptors in use.
    fn in_use(&self) -> usize;
}
