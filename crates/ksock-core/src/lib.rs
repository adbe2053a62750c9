//! # ksock-core: Trait definitions for KSOCK
//!
//! KSOCK is the kernel-resident socket layer: it turns a process's
//! synchronous socket syscalls into commands against an event-driven
//! TCP/IP stack, and turns the stack's callbacks back into state a
//! process can observe.
//!
//! This crate defines the trait boundary for every collaborator the
//! socket layer talks to but does not own:
//!
//! | Trait            | Collaborator                                   |
//! |------------------|------------------------------------------------|
//! | `ProtocolStack`  | TCP/IP stack (control blocks, packet buffers)  |
//! | `FileTable`      | Generic file-descriptor layer                  |
//! | `ProcessContext` | Scheduler: identity of the calling process     |
//! | `CompletionSink` | Inter-process delivery of connect outcomes     |
//! | `SocketCache`    | Slab allocator for socket objects              |
//!
//! Default implementations live in `ksock-module`. The socket layer in
//! `ksock` is generic over all of them.

pub mod ids;
pub mod addr;
pub mod abi;
pub mod error;
pub mod stack;
pub mod file;
pub mod process;
pub mod completion;
pub mod cache;
pub mod spinlock;
pub mod kprint;
pub mod env;

pub use ids::{Fd, PcbId, Pid, SocketId};
pub use addr::SockAddrIn;
pub use error::{CompletionError, SockError, SockResult, StackErr, StackResult};
pub use stack::{EventKind, EventReply, PacketBuf, ProtocolStack, RawEvent, StackEvent};
pub use file::{Descriptor, FileTable, FileType};
pub use process::ProcessContext;
pub use completion::CompletionSink;
pub use cache::SocketCache;
pub use spinlock::SpinLock;
