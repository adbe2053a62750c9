//! Socket object cache abstraction.
//!
//! Socket objects come from a process-wide, fixed-capacity cache created
//! once at startup. Every object sits behind its own lock, which is how
//! the syscall path and the stack's event path get mutual exclusion on a
//! single socket without sharing a global lock.
//!
//! # Implementors
//!
//! - `SlabCache` (default, ksock-module): boxed slot array, lock-free
//!   free list, one spinlock per slot.

use crate::ids::SocketId;

/// Fixed-size object allocation for socket structures.
///
/// **Contract:**
/// - `alloc()` never grows the cache; it returns `None` when full. It is
///   called from the event path, which must not trigger unbounded
///   allocation.
/// - `with()` gives exclusive access to one object for the duration of the
///   closure. Closures may call `alloc()`/`free()` for *other* ids but must
///   not re-enter the same id.
pub trait SocketCache<T>: Send + Sync {
    /// Store `obj` in a free slot.
    fn alloc(&self, obj: T) -> Option<SocketId>;

    /// Take the object out of its slot and free the slot.
    fn free(&self, id: SocketId) -> Option<T>;

    /// Run `f` with exclusive access to the object at `id`.
    /// `None` if the slot is empty.
    fn with<R>(&self, id: SocketId, f: impl FnOnce(&mut T) -> R) -> Option<R>;

    /// Number of live objects.
    fn in_use(&self) -> usize;

    /// Maximum number of live objects.
    fn capacity(&self) -> usize;
}
