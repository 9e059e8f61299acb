//! Compile-time configuration for the kernel core
//!
//! These constants size the static object pools and bound kernel algorithms.

use crate::types::{Prio, Tick};

/// Maximum number of thread records (including the idle and main threads)
pub const CFG_THREADS_MAX: usize = 16;

/// Maximum number of virtual timers
///
/// Every thread reserves one timer for its blocking timeouts at creation,
/// so this must be at least `CFG_THREADS_MAX` plus the number of
/// application timers armed concurrently.
pub const CFG_TIMERS_MAX: usize = CFG_THREADS_MAX + 16;

/// Maximum number of counting semaphores
pub const CFG_SEMAPHORES_MAX: usize = 16;

/// Maximum number of mutexes
pub const CFG_MUTEXES_MAX: usize = 16;

/// Maximum number of condition variables
pub const CFG_CONDVARS_MAX: usize = 8;

/// Maximum number of event sources
pub const CFG_EVENT_SOURCES_MAX: usize = 8;

/// Maximum number of event listener registrations
pub const CFG_LISTENERS_MAX: usize = 16;

/// Iteration cap for the priority-inheritance chain walk
///
/// Bounds the worst-case latency of a mutex lock that has to boost a
/// chain of owners each blocked on another mutex.
pub const CFG_PI_CHAIN_MAX: usize = 8;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Priority of the internal idle thread (lowest; reserved)
pub const IDLE_PRIO: Prio = 1;

/// Default priority for the main thread
pub const NORMAL_PRIO: Prio = 128;

/// Highest usable priority
pub const HIGH_PRIO: Prio = 255;

/// Minimum working-area size, in words, accepted at thread creation
pub const CFG_WA_WORDS_MIN: usize = 64;

/// Convert milliseconds to ticks at the configured tick rate
#[inline]
pub const fn ms_to_ticks(ms: u32) -> Tick {
    (ms * CFG_TICK_RATE_HZ) / 1000
}
