//! Port boundary
//!
//! The kernel never saves or restores CPU state itself; it hands the
//! outgoing and incoming thread to a [`Port`] and resumes whatever the
//! port gives back. A real port performs the stack switch (on Cortex-M,
//! by pending PendSV); [`NullPort`] merely records the request, which
//! lets the whole kernel run and be tested hosted.

use crate::thread::Thread;
use crate::types::Tid;

pub trait Port {
    /// Prepare the initial context of a freshly created thread.
    ///
    /// Called once per thread before it first becomes runnable. The
    /// default does nothing, which suits ports that build the frame
    /// lazily and hosted runs.
    fn setup_context(&mut self, tid: Tid, thread: &Thread) {
        let _ = (tid, thread);
    }

    /// Switch from `otp` to `ntp`.
    ///
    /// On hardware this returns only when `otp` is scheduled again. A
    /// stub implementation returns immediately, so callers must not
    /// assume any time has passed when it does.
    fn context_switch(&mut self, ntp: Tid, otp: Tid);
}

/// Recording stub port for hosted runs.
pub struct NullPort {
    /// Number of context switches requested
    pub switches: usize,
    /// Last requested switch as (incoming, outgoing)
    pub last: Option<(Tid, Tid)>,
}

impl NullPort {
    pub const fn new() -> Self {
        NullPort {
            switches: 0,
            last: None,
        }
    }
}

impl Default for NullPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for NullPort {
    fn context_switch(&mut self, ntp: Tid, otp: Tid) {
        self.switches += 1;
        self.last = Some((ntp, otp));
    }
}
