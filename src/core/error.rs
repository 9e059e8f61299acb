//! Error types for the kernel core
//!
//! Expected run-time failures surface as `Result`s; calling-context and
//! ordering violations are debug assertions, and fatal invariant
//! violations go through [`system_halt`].

/// Kernel error type for fallible (creation-time) operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OsError {
    /// The backing object pool is exhausted
    PoolExhausted,
    /// Priority outside the usable range
    BadPriority,
    /// Working area missing or below the minimum size
    BadWorkingArea,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

/// Non-returning fatal error hook
///
/// Invoked on kernel invariant violations; there is no recovery path.
/// The reason string is the only diagnostic carried out.
#[cold]
#[inline(never)]
pub fn system_halt(reason: &'static str) -> ! {
    crate::error!("system halt: {}", reason);
    panic!("system halt: {}", reason);
}
