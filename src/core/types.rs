//! Core type definitions
//!
//! Strongly-typed handles, wake messages and timeout specifications used
//! across the kernel.

/// Thread priority. Larger values outrank smaller ones; 0 is reserved.
pub type Prio = u8;

/// Tick counter type
pub type Tick = u32;

/// Event flags type
pub type EventMask = u32;

// ============ Object handles ============

macro_rules! define_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Raw pool index of this handle
            #[inline(always)]
            pub(crate) fn raw(self) -> usize {
                self.0
            }
        }
    };
}

define_handle!(
    /// Handle of a thread record
    Tid
);
define_handle!(
    /// Handle of a virtual timer
    TimerId
);
define_handle!(
    /// Handle of a counting semaphore
    SemId
);
define_handle!(
    /// Handle of a mutex
    MutexId
);
define_handle!(
    /// Handle of a condition variable
    CondId
);
define_handle!(
    /// Handle of an event source
    EventSourceId
);
define_handle!(
    /// Handle of an event listener registration
    ListenerId
);

// ============ Thread state ============

/// Thread state machine
///
/// `Current` is the single distinguished `Ready` instance actually
/// executing. `Final` is terminal; the record is reclaimed once the last
/// reference is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ThreadState {
    /// Created, not yet started
    Start = 0,
    /// Runnable, in the ready queue
    Ready = 1,
    /// Running on the CPU
    Current = 2,
    /// Delayed by a timed sleep
    Sleeping = 3,
    /// Blocked on a semaphore
    WtSem = 4,
    /// Blocked on a mutex
    WtMtx = 5,
    /// Blocked on a condition variable
    WtCond = 6,
    /// Waiting for another thread to terminate
    WtExit = 7,
    /// Waiting for any of a set of event flags
    WtAnyEvt = 8,
    /// Waiting for all of a set of event flags
    WtAllEvt = 9,
    /// Queued in a receiver's message queue
    SndMsgQ = 10,
    /// Message fetched, waiting for the receiver's reply
    SndMsg = 11,
    /// Waiting for a message to arrive
    WtMsg = 12,
    /// Suspended, waiting for an explicit resume
    Suspended = 13,
    /// Terminated
    Final = 14,
}

impl ThreadState {
    /// True for every state reachable only through the sleep primitive
    #[inline]
    pub fn is_waiting(self) -> bool {
        !matches!(
            self,
            ThreadState::Start
                | ThreadState::Ready
                | ThreadState::Current
                | ThreadState::Final
        )
    }
}

// ============ Wake messages ============

/// Outcome of a blocking operation, and the currency of explicit wakeups
///
/// The code a thread observes after a wait is authoritative; there are no
/// spurious wakeups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Msg {
    /// The wait condition was satisfied
    Ok,
    /// The timeout expired first
    Timeout,
    /// The object was reset while waiting
    Reset,
    /// Application-chosen code (message replies, exit codes, resumes)
    Custom(isize),
}

// ============ Timeouts ============

/// Timeout specification for blocking operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Do not block; fail with [`Msg::Timeout`] if the condition is unmet
    Immediate,
    /// Block for at most this many ticks (must be non-zero)
    Ticks(Tick),
    /// Block until explicitly woken; never touches the timer engine
    Infinite,
}

impl Timeout {
    #[inline]
    pub fn is_infinite(self) -> bool {
        matches!(self, Timeout::Infinite)
    }

    /// `Ticks(0)` counts as immediate; the timer engine never arms a
    /// zero delay.
    #[inline]
    pub fn is_immediate(self) -> bool {
        matches!(self, Timeout::Immediate | Timeout::Ticks(0))
    }
}
