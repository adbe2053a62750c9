//! `SlabCache`: default `SocketCache` implementation.
//!
//! A boxed array of slots fixed at creation, each behind its own
//! spinlock, plus a lock-free queue of free slot indices. `alloc()` pops
//! an index, `free()` pushes it back. Nothing is allocated after `new()`,
//! so the cache is safe to use from the stack's event context.

use ksock_core::cache::SocketCache;
use ksock_core::ids::SocketId;
use ksock_core::spinlock::SpinLock;
use ksock_core::{kdebug, kwarn};

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct SlabCache<T> {
    name: &'static str,
    slots: Box<[SpinLock<Option<T>>]>,
    /// Indices of empty slots.
    free: ArrayQueue<u32>,
    live: AtomicUsize,
}

impl<T: Send> SlabCache<T> {
    /// Create a cache holding at most `capacity` objects (at least one).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots: Vec<SpinLock<Option<T>>> = (0..capacity).map(|_| SpinLock::new(None)).collect();
        let free = ArrayQueue::new(capacity);
        for idx in 0..capacity as u32 {
            // Cannot fail: the queue was sized for exactly these indices.
            let _ = free.push(idx);
        }
        kdebug!("cache {}: {} slots", name, capacity);
        Self {
            name,
            slots: slots.into_boxed_slice(),
            free,
            live: AtomicUsize::new(0),
        }
    }

    fn slot(&self, id: SocketId) -> Option<&SpinLock<Option<T>>> {
        self.slots.get(id.as_usize())
    }
}

impl<T: Send> SocketCache<T> for SlabCache<T> {
    fn alloc(&self, obj: T) -> Option<SocketId> {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                kwarn!("cache {}: exhausted ({} live)", self.name, self.in_use());
                return None;
            }
        };
        let mut slot = self.slots[idx as usize].lock();
        debug_assert!(slot.is_none(), "free list handed out a live slot");
        *slot = Some(obj);
        self.live.fetch_add(1, Ordering::Relaxed);
        Some(SocketId::new(idx))
    }

    fn free(&self, id: SocketId) -> Option<T> {
        let obj = self.slot(id)?.lock().take()?;
        self.live.fetch_sub(1, Ordering::Relaxed);
        let _ = self.free.push(id.as_u32());
        Some(obj)
    }

    fn with<R>(&self, id: SocketId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slot = self.slot(id)?.lock();
        slot.as_mut().map(f)
    }

    fn in_use(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_until_full() {
        let cache = SlabCache::new("test", 3);
        let ids: Vec<_> = (0..3).map(|i| cache.alloc(i).unwrap()).collect();
        assert_eq!(cache.in_use(), 3);
        assert!(cache.alloc(99).is_none());
        assert_eq!(cache.free(ids[1]), Some(1));
        assert_eq!(cache.alloc(7), Some(ids[1]));
    }

    #[test]
    fn with_gives_mutable_access() {
        let cache = SlabCache::new("test", 2);
        let id = cache.alloc(String::from("a")).unwrap();
        cache.with(id, |s| s.push('b'));
        assert_eq!(cache.with(id, |s| s.clone()), Some("ab".to_string()));
    }

    #[test]
    fn freed_and_unknown_slots_are_empty() {
        let cache = SlabCache::new("test", 2);
        let id = cache.alloc(5u8).unwrap();
        assert_eq!(cache.free(id), Some(5));
        assert_eq!(cache.free(id), None);
        assert_eq!(cache.with(id, |v| *v), None);
        assert_eq!(cache.with(SocketId::new(40), |v| *v), None);
        assert_eq!(cache.in_use(), 0);
    }

    #[test]
    fn nested_access_to_other_slot() {
        let cache = SlabCache::new("test", 4);
        let parent = cache.alloc(Vec::<SocketId>::new()).unwrap();
        cache.with(parent, |children| {
            children.push(cache.alloc(Vec::new()).unwrap());
        });
        assert_eq!(cache.in_use(), 2);
    }
}
