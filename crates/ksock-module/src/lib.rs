//! # ksock-module: Default implementations
//!
//! One implementation for every ksock-core trait. Each favours
//! correctness and bounded memory over speed.
//!
//! ## Default stack
//!
//! | Trait           | Default Impl        | Notes                              |
//! |-----------------|---------------------|------------------------------------|
//! | SocketCache     | SlabCache           | fixed slots, lock-free free list   |
//! | FileTable       | DescriptorTable     | lowest-free-slot allocation        |
//! | ProcessContext  | CurrentProcess      | pid stored by the scheduler        |
//! | CompletionSink  | OneshotCompletions  | one single-entry queue per pid     |
//! | ProtocolStack   | SimStack            | in-memory model for tests/tools    |

pub mod slab_cache;
pub mod descriptor_table;
pub mod current_process;
pub mod oneshot_completions;
pub mod sim_stack;

pub use slab_cache::SlabCache;
pub use descriptor_table::DescriptorTable;
pub use current_process::CurrentProcess;
pub use oneshot_completions::OneshotCompletions;
pub use sim_stack::{SimChunk, SimStack};
