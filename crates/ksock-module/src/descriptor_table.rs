//! `DescriptorTable`: default `FileTable` implementation.
//!
//! A fixed table of descriptor slots. Allocation takes the lowest free
//! number, as POSIX requires of `socket()`/`accept()`.

use ksock_core::file::{Descriptor, FileTable};
use ksock_core::ids::Fd;
use ksock_core::spinlock::SpinLock;

pub struct DescriptorTable {
    slots: SpinLock<Vec<Option<Descriptor>>>,
}

impl DescriptorTable {
    pub fn new(max_files: usize) -> Self {
        Self {
            slots: SpinLock::new(vec![None; max_files]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }
}

impl FileTable for DescriptorTable {
    fn alloc(&self) -> Option<Fd> {
        let mut slots = self.slots.lock();
        let idx = slots.iter().position(Option::is_none)?;
        slots[idx] = Some(Descriptor::EMPTY);
        Some(Fd(idx as i32))
    }

    fn install(&self, fd: Fd, desc: Descriptor) {
        if let Some(slot) = self.slots.lock().get_mut(fd.as_usize()) {
            debug_assert!(slot.is_some(), "install into unreserved {}", fd);
            *slot = Some(desc);
        }
    }

    fn get(&self, fd: Fd) -> Option<Descriptor> {
        if fd.0 < 0 {
            return None;
        }
        self.slots.lock().get(fd.as_usize()).copied().flatten()
    }

    fn release(&self, fd: Fd) -> Option<Descriptor> {
        if fd.0 < 0 {
            return None;
        }
        self.slots.lock().get_mut(fd.as_usize())?.take()
    }

    fn in_use(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksock_core::ids::SocketId;

    #[test]
    fn lowest_free_number_first() {
        let table = DescriptorTable::new(4);
        let a = table.alloc().unwrap();
        let b = table.alloc().unwrap();
        assert_eq!((a, b), (Fd(0), Fd(1)));
        table.release(a);
        assert_eq!(table.alloc(), Some(Fd(0)));
    }

    #[test]
    fn install_and_release_round_trip() {
        let table = DescriptorTable::new(2);
        let fd = table.alloc().unwrap();
        assert_eq!(table.get(fd), Some(Descriptor::EMPTY));
        table.install(fd, Descriptor::socket(SocketId::new(5)));
        let desc = table.release(fd).unwrap();
        assert_eq!(desc.socket_id(), Some(SocketId::new(5)));
        assert!(desc.readable && desc.writable);
        assert_eq!(table.get(fd), None);
        assert_eq!(table.in_use(), 0);
    }

    #[test]
    fn full_table_and_bad_numbers() {
        let table = DescriptorTable::new(1);
        assert!(table.alloc().is_some());
        assert!(table.alloc().is_none());
        assert_eq!(table.get(Fd(-1)), None);
        assert_eq!(table.release(Fd(9)), None);
    }
}
