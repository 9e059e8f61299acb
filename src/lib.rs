//! Real-time kernel core
//!
//! A compact preemptive kernel core:
//! - Priority-based preemptive scheduling with round-robin among peers
//! - Delta-list one-shot virtual timers driving all timeouts
//! - Counting semaphores, mutexes with priority inheritance, condition
//!   variables, event flags and synchronous message rendezvous
//! - Explicit kernel context object; the port layer owns the actual
//!   context switch, so the whole kernel also runs hosted
//!
//! Blocking operations come in `_s` form, taking a [`critical::SysLock`]
//! token, plus self-locking wrappers. Operations legal from interrupt
//! handlers accept any lock token and never block.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;
pub mod sync;

// ============ Re-exports ============

pub use core::config;
pub use core::config::*;
pub use core::critical;
pub use core::critical::{with_isr_lock, with_lock, CsCell, IsrLock, LockToken, SysLock};
pub use core::error;
pub use core::error::{OsError, OsResult};
pub use core::kernel;
pub use core::kernel::{Kernel, System};
pub use core::pool;
pub use core::sched;
pub use core::thread;
pub use core::thread::{Thread, ThreadDescriptor, ThreadFn, WorkingArea};
pub use core::types;
pub use core::types::*;
pub use core::vt;
pub use core::vt::{VirtualTimer, VtFunc};

pub use port::{NullPort, Port};
