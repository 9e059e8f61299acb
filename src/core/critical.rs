//! Calling-context tokens and critical section entry
//!
//! Kernel operations come in three flavors: I-class (callable with the
//! kernel lock held, from ISR or thread context), S-class (thread context
//! with the lock held) and self-locking wrappers that scope-acquire the
//! lock around a single operation. The contract is encoded in the type
//! system: S-class operations take [`SysLock`], I-class operations accept
//! any [`LockToken`]. Blocking operations require `SysLock`, so calling
//! one from an ISR is a compile error rather than a latent fault.

use core::cell::UnsafeCell;

mod sealed {
    pub trait Sealed {}
}

/// Proof that the kernel lock is held in thread context
pub struct SysLock(());

/// Proof that the kernel lock is held in ISR context
pub struct IsrLock(());

/// Either lock token; bound used by I-class operations
pub trait LockToken: sealed::Sealed {}

impl sealed::Sealed for SysLock {}
impl sealed::Sealed for IsrLock {}
impl LockToken for SysLock {}
impl LockToken for IsrLock {}

impl SysLock {
    /// Conjure a token without entering a critical section.
    ///
    /// # Safety
    /// The caller must already hold the kernel lock in thread context,
    /// e.g. inside a port layer that masked interrupts by other means.
    #[inline(always)]
    pub unsafe fn assume() -> Self {
        SysLock(())
    }
}

impl IsrLock {
    /// Conjure a token without entering a critical section.
    ///
    /// # Safety
    /// The caller must be in ISR context with the kernel lock held.
    #[inline(always)]
    pub unsafe fn assume() -> Self {
        IsrLock(())
    }
}

/// Enter a critical section and run `f` with an S-class token.
///
/// The lock is released on every exit path, including unwinding.
#[inline]
pub fn with_lock<R>(f: impl FnOnce(&SysLock) -> R) -> R {
    critical_section::with(|_cs| f(&SysLock(())))
}

/// Enter a critical section and run `f` with an I-class token.
///
/// For use inside interrupt handlers that call I-class operations.
#[inline]
pub fn with_isr_lock<R>(f: impl FnOnce(&IsrLock) -> R) -> R {
    critical_section::with(|_cs| f(&IsrLock(())))
}

// ============ Lock-protected cell ============

/// A cell that can only be accessed under the kernel lock.
///
/// This is the embedding vehicle for a kernel shared with ISRs: the
/// embedder stores the [`System`](crate::kernel::System) in a static
/// `CsCell` and reaches it from thread code and tick handlers alike with
/// a lock token as proof.
pub struct CsCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Get a mutable reference to the inner value.
    ///
    /// Uniprocessor only: the lock token guarantees no other context is
    /// inside the cell.
    #[allow(clippy::mut_from_ref)]
    #[inline(always)]
    pub fn borrow_mut(&self, _tok: &impl LockToken) -> &mut T {
        unsafe { &mut *self.0.get() }
    }

    /// Get a raw pointer to the inner value
    #[inline(always)]
    pub const fn as_ptr(&self) -> *mut T {
        self.0.get()
    }
}
