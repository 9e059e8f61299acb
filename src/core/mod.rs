//! Kernel core
//!
//! Scheduler, thread records, virtual timers and the shared plumbing
//! (pools, handle types, lock tokens) the sync primitives build on.

pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod pool;
pub mod sched;
pub mod thread;
pub mod types;
pub mod vt;
