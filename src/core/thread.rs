//! Thread records and lifecycle
//!
//! A thread is a slot in the kernel's thread pool. Its queue linkage is a
//! single pair of explicit `prev`/`next` indices plus a [`WaitOn`] tag
//! naming the queue the linkage currently belongs to; a thread is in at
//! most one queue at a time. The wake payload is a tagged variant keyed
//! by the thread state, so only the interpretation valid for the current
//! state is reachable.

use crate::config::{CFG_WA_WORDS_MIN, HIGH_PRIO, IDLE_PRIO};
use crate::critical::{LockToken, SysLock};
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::sched::queue::{self, WaitQueue};
use crate::types::{CondId, EventMask, Msg, MutexId, Prio, SemId, ThreadState, Tid, Timeout, TimerId};

/// Thread entry point function type
pub type ThreadFn = fn(*mut ());

// ============ Wait linkage ============

/// Which queue a thread's linkage currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOn {
    /// Not linked anywhere
    Nothing,
    /// In the ready queue
    Ready,
    /// In a semaphore's wait queue
    Sem(SemId),
    /// In a mutex's wait queue
    Mutex(MutexId),
    /// In a condition variable's wait queue
    Cond(CondId),
    /// In another thread's message queue
    MsgQueue(Tid),
    /// In another thread's joiner queue
    Join(Tid),
}

// ============ Wake payload ============

/// Per-thread wake payload, interpreted according to the thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakePayload {
    None,
    /// Wake message delivered by the last wakeup (READY after a wait)
    Rdy(Msg),
    /// Exit code (FINAL)
    Exit(isize),
    /// Mutex to re-acquire when leaving a condvar wait (WTCOND)
    CondMutex(MutexId),
    /// Events awaited, served when any is pending (WTANYEVT)
    EwAny(EventMask),
    /// Events awaited, only the lowest served (WTANYEVT, wait-one)
    EwOne(EventMask),
    /// Events awaited, served when all are pending (WTALLEVT)
    EwAll(EventMask),
    /// Events delivered by the wakeup (READY after an event wait)
    Served(EventMask),
    /// Message being carried to a receiver (SNDMSGQ/SNDMSG)
    Sent(isize),
}

// ============ Thread record ============

/// Thread record
pub struct Thread {
    pub(crate) name: &'static str,
    pub(crate) state: ThreadState,
    /// Current (possibly inherited) priority; never below `real_prio`
    pub(crate) prio: Prio,
    /// Base priority, restored when inherited boosts expire
    pub(crate) real_prio: Prio,
    /// Reference count; the record is reclaimed at zero once FINAL
    pub(crate) refs: u8,

    // Single wait-linkage slot
    pub(crate) next: Option<Tid>,
    pub(crate) prev: Option<Tid>,
    pub(crate) wait_on: WaitOn,

    pub(crate) payload: WakePayload,
    /// Pending event flags; persistent until served
    pub(crate) epending: EventMask,
    /// Head of the LIFO list of mutexes this thread owns
    pub(crate) mtx_list: Option<MutexId>,
    /// Timer reserved at creation for this thread's blocking timeouts
    pub(crate) timeout_vt: TimerId,
    /// Senders blocked on this thread, priority ordered
    pub(crate) msg_queue: WaitQueue,
    /// Threads waiting for this thread to terminate
    pub(crate) joiners: WaitQueue,

    // Captured descriptor
    pub(crate) entry: ThreadFn,
    pub(crate) arg: *mut (),
    pub(crate) wa_base: *mut usize,
    pub(crate) wa_words: usize,
}

// Raw descriptor fields are only touched by the port layer.
unsafe impl Send for Thread {}

impl Thread {
    pub(crate) fn new(name: &'static str, prio: Prio, timeout_vt: TimerId) -> Self {
        Thread {
            name,
            state: ThreadState::Start,
            prio,
            real_prio: prio,
            refs: 1,
            next: None,
            prev: None,
            wait_on: WaitOn::Nothing,
            payload: WakePayload::None,
            epending: 0,
            mtx_list: None,
            timeout_vt,
            msg_queue: WaitQueue::new(),
            joiners: WaitQueue::new(),
            entry: idle_entry,
            arg: core::ptr::null_mut(),
            wa_base: core::ptr::null_mut(),
            wa_words: 0,
        }
    }

    /// Wake message as left by the last wakeup
    #[inline]
    pub(crate) fn rdy_msg(&self) -> Msg {
        match self.payload {
            WakePayload::Rdy(msg) => msg,
            _ => Msg::Ok,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ThreadState::Ready | ThreadState::Current)
    }

    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.state.is_waiting()
    }
}

/// Entry placeholder for the internal idle thread
pub(crate) fn idle_entry(_arg: *mut ()) {}

// ============ Working area & descriptor ============

/// Caller-supplied working area for a thread's stack and port context
pub struct WorkingArea {
    pub(crate) base: *mut usize,
    pub(crate) words: usize,
}

unsafe impl Send for WorkingArea {}

impl WorkingArea {
    pub fn new(buf: &'static mut [usize]) -> Self {
        WorkingArea {
            base: buf.as_mut_ptr(),
            words: buf.len(),
        }
    }
}

/// Thread creation descriptor, captured into the record
pub struct ThreadDescriptor {
    pub name: &'static str,
    pub prio: Prio,
    pub entry: ThreadFn,
    pub arg: *mut (),
    pub wa: WorkingArea,
}

// ============ Lifecycle operations ============

impl<P: Port> System<P> {
    /// Create a thread in the `Start` state.
    ///
    /// The new record holds the captured descriptor and one reference,
    /// owned by the creator. The thread does not run until
    /// [`thread_start`](Self::thread_start).
    pub fn thread_create(&mut self, desc: ThreadDescriptor) -> OsResult<Tid> {
        if desc.prio <= IDLE_PRIO || desc.prio > HIGH_PRIO {
            return Err(OsError::BadPriority);
        }
        if desc.wa.base.is_null() || desc.wa.words < CFG_WA_WORDS_MIN {
            return Err(OsError::BadWorkingArea);
        }

        let tid = self.kernel.thread_alloc(desc.name, desc.prio)?;
        let t = &mut self.kernel.threads[tid.raw()];
        t.entry = desc.entry;
        t.arg = desc.arg;
        t.wa_base = desc.wa.base;
        t.wa_words = desc.wa.words;

        self.port.setup_context(tid, &self.kernel.threads[tid.raw()]);
        crate::trace!("thread_create: {} prio {}", desc.name, desc.prio);
        Ok(tid)
    }

    /// Make a `Start` thread runnable and reschedule.
    pub fn thread_start(&mut self, tid: Tid) {
        crate::critical::with_lock(|tok| {
            debug_assert_eq!(self.kernel.threads[tid.raw()].state, ThreadState::Start);
            self.kernel.ready_i(tok, tid);
            self.reschedule_s(tok);
        });
    }

    /// Terminate the current thread with `code`.
    ///
    /// Joiners are woken with `Msg::Custom(code)` and their references
    /// dropped. Under a real port this call does not return.
    pub fn exit_s(&mut self, tok: &SysLock, code: isize) {
        let cur = self.kernel.current;
        debug_assert!(
            self.kernel.threads[cur.raw()].mtx_list.is_none(),
            "exit while holding mutexes"
        );
        self.kernel.threads[cur.raw()].payload = WakePayload::Exit(code);

        // Senders still queued for a rendezvous will never be served.
        let mut senders = self.kernel.threads[cur.raw()].msg_queue;
        while let Some(s) = queue::pop_front(&mut self.kernel.threads, &mut senders) {
            self.kernel.threads[s.raw()].wait_on = WaitOn::Nothing;
            self.kernel.wakeup_msg_i(tok, s, Msg::Reset);
        }
        self.kernel.threads[cur.raw()].msg_queue = senders;

        // Wake joiners; each consumed reference may allow reclamation.
        let mut joiners = self.kernel.threads[cur.raw()].joiners;
        while let Some(j) = queue::pop_front(&mut self.kernel.threads, &mut joiners) {
            self.kernel.threads[j.raw()].wait_on = WaitOn::Nothing;
            self.kernel.wakeup_msg_i(tok, j, Msg::Custom(code));
            let t = &mut self.kernel.threads[cur.raw()];
            debug_assert!(t.refs > 0);
            t.refs -= 1;
        }
        self.kernel.threads[cur.raw()].joiners = joiners;

        self.go_sleep_s(tok, ThreadState::Final);
        // Reclamation happens in thread_release / thread_wait once the
        // last reference is dropped; the record stays FINAL until then.
    }

    /// Self-locking wrapper for [`exit_s`](Self::exit_s).
    pub fn exit(&mut self, code: isize) {
        crate::critical::with_lock(|tok| self.exit_s(tok, code));
    }

    /// Wait for `tid` to terminate and fetch its exit code.
    ///
    /// Drops the caller's reference to `tid`; the record is reclaimed
    /// here if that was the last one. Infinite wait, no timeout variant.
    pub fn thread_wait_s(&mut self, tok: &SysLock, tid: Tid) -> Msg {
        let cur = self.kernel.current;
        debug_assert_ne!(cur, tid, "thread_wait on self");

        if self.kernel.threads[tid.raw()].state != ThreadState::Final {
            let mut joiners = self.kernel.threads[tid.raw()].joiners;
            queue::append(&mut self.kernel.threads, &mut joiners, cur);
            self.kernel.threads[tid.raw()].joiners = joiners;
            self.kernel.threads[cur.raw()].wait_on = WaitOn::Join(tid);
            self.go_sleep_s(tok, ThreadState::WtExit);
            // The exiting thread dropped our reference when it woke us.
            self.kernel.reclaim_if_dead(tid);
            return self.kernel.threads[cur.raw()].rdy_msg();
        }

        let code = match self.kernel.threads[tid.raw()].payload {
            WakePayload::Exit(code) => code,
            _ => 0,
        };
        self.kernel.thread_release_i(tok, tid);
        Msg::Custom(code)
    }

    /// Self-locking wrapper for [`thread_wait_s`](Self::thread_wait_s).
    pub fn thread_wait(&mut self, tid: Tid) -> Msg {
        crate::critical::with_lock(|tok| self.thread_wait_s(tok, tid))
    }

    /// Suspend the current thread until resumed or the timeout expires.
    pub fn suspend_timeout_s(&mut self, tok: &SysLock, timeout: Timeout) -> Msg {
        self.go_sleep_timeout_s(tok, ThreadState::Suspended, timeout)
    }

    /// Voluntarily yield the CPU to an equal or higher priority thread.
    pub fn thread_yield(&mut self) {
        crate::critical::with_lock(|tok| self.yield_s(tok));
    }
}

impl Kernel {
    /// Drop one reference to `tid`, reclaiming the record when the last
    /// reference to a FINAL thread goes away.
    pub fn thread_release_i(&mut self, _tok: &impl LockToken, tid: Tid) {
        let t = &mut self.threads[tid.raw()];
        debug_assert!(t.refs > 0, "release on zero refs");
        t.refs -= 1;
        self.reclaim_if_dead(tid);
    }

    /// Resume a `Suspended` thread with an application-chosen message.
    pub fn resume_i(&mut self, tok: &impl LockToken, tid: Tid, msg: Msg) {
        debug_assert_eq!(self.threads[tid.raw()].state, ThreadState::Suspended);
        self.wakeup_msg_i(tok, tid, msg);
    }

    pub(crate) fn reclaim_if_dead(&mut self, tid: Tid) {
        if !self.threads.contains(tid.raw()) {
            return;
        }
        let t = &self.threads[tid.raw()];
        if t.refs == 0 && t.state == ThreadState::Final {
            let vt = t.timeout_vt;
            self.timers.remove(vt.raw());
            self.threads.remove(tid.raw());
        }
    }

    pub(crate) fn thread_alloc(&mut self, name: &'static str, prio: Prio) -> OsResult<Tid> {
        let vt = self
            .timers
            .insert(crate::vt::VirtualTimer::new())
            .ok_or(OsError::PoolExhausted)?;
        match self.threads.insert(Thread::new(name, prio, TimerId(vt))) {
            Some(idx) => Ok(Tid(idx)),
            None => {
                self.timers.remove(vt);
                Err(OsError::PoolExhausted)
            }
        }
    }
}
