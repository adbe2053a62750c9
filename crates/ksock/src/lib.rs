//! # ksock: Kernel socket layer
//!
//! Bridges a process's synchronous socket syscalls to an event-driven
//! TCP/IP stack that runs in its own context.
//!
//! ```text
//!   process ── sys_* / syscall(nr) ──► SocketLayer ── commands ──► ProtocolStack
//!                                          ▲                           │
//!                                          └──── dispatch(StackEvent) ◄┘
//! ```
//!
//! Both directions meet on the socket object, which lives in a
//! fixed-capacity cache with one lock per object. Nothing here blocks:
//! "not yet" is `SockError::RetryLater` and the caller decides whether
//! to wait. Connect outcomes reach the connecting process through a
//! one-shot completion slot.
//!
//! `SocketLayer` is generic over a `Platform` naming the collaborator
//! types; `SimPlatform` plugs in `ksock-module`'s defaults and the
//! in-memory `SimStack`.

pub mod config;
pub mod socket;
pub mod backlog;
pub mod recv;
pub mod layer;
pub mod lifecycle;
pub mod connect;
pub mod send;
pub mod event;
pub mod syscall;

#[cfg(test)]
mod scenarios;

pub use config::{SocketConfig, MAX_BACKLOG};
pub use layer::{BufOf, Platform, SimPlatform, SocketLayer};
pub use socket::{Protocol, Socket, SocketKind};
pub use connect::completion_code;
