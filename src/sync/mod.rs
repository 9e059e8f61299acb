//! Synchronization primitives
//!
//! Semaphores, mutexes with priority inheritance, condition variables,
//! event flags and synchronous messages.

pub mod condvar;
pub mod events;
pub mod msg;
pub mod mutex;
pub mod sem;
