//! Scheduler core
//!
//! The ready queue is a single priority-ordered list; the running
//! thread is cached in `Kernel::current` and never sits on the queue.
//! Two insertion flavors exist for the ready queue: `ready_i` places a
//! thread behind peers of equal priority (the normal round-robin case)
//! and `ready_ahead_i` places it in front of them, which is how a
//! preempted thread keeps the remainder of its turn.
//!
//! Blocking is two-phase. The caller queues itself on a wait list,
//! records what it waits on, then calls `go_sleep_s`, which hands the
//! CPU to the ready head through the port. Whoever wakes the sleeper
//! (a signal path or the timeout callback) deposits the outcome in the
//! thread record before readying it; the sleeper only reads that
//! outcome after the port returns control.

pub(crate) mod queue;

use crate::critical::{LockToken, SysLock};
use crate::error::system_halt;
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::thread::{WaitOn, WakePayload};
use crate::types::{Msg, ThreadState, Timeout, Tid};

impl Kernel {
    /// Make `tid` runnable, behind equal-priority peers.
    pub fn ready_i(&mut self, _tok: &impl LockToken, tid: Tid) {
        let t = &mut self.threads[tid.raw()];
        debug_assert!(
            !t.is_ready(),
            "ready_i: thread is already runnable"
        );
        t.state = ThreadState::Ready;
        t.wait_on = WaitOn::Ready;
        queue::insert_prio(&mut self.threads, &mut self.ready, tid);
    }

    /// Make `tid` runnable, in front of equal-priority peers.
    ///
    /// Used when a thread loses the CPU through no action of its own
    /// and must not also lose its position in the round-robin.
    pub fn ready_ahead_i(&mut self, _tok: &impl LockToken, tid: Tid) {
        let t = &mut self.threads[tid.raw()];
        debug_assert!(!t.is_ready(), "ready_ahead_i: thread is already runnable");
        t.state = ThreadState::Ready;
        t.wait_on = WaitOn::Ready;
        queue::insert_ahead(&mut self.threads, &mut self.ready, tid);
    }

    /// Wake a sleeping thread with message `msg`.
    ///
    /// Cancels the thread's pending timeout, if armed. The caller must
    /// already have removed `tid` from whatever wait list it sat on.
    /// Does not reschedule; S-class wrappers follow up with
    /// [`System::reschedule_s`].
    pub fn wakeup_i(&mut self, tok: &impl LockToken, tid: Tid) {
        self.wakeup_msg_i(tok, tid, Msg::Ok)
    }

    pub fn wakeup_msg_i(&mut self, tok: &impl LockToken, tid: Tid, msg: Msg) {
        let vt = self.threads[tid.raw()].timeout_vt;
        self.vt_reset_i(tok, vt);
        self.threads[tid.raw()].payload = WakePayload::Rdy(msg);
        self.ready_i(tok, tid);
    }

    /// Like [`Kernel::wakeup_msg_i`] but keeps the payload already
    /// stored in the thread record. Ownership-transfer paths (mutex
    /// grant, message handoff) stash their result before the wake.
    pub(crate) fn ready_wake(&mut self, tok: &impl LockToken, tid: Tid) {
        let vt = self.threads[tid.raw()].timeout_vt;
        self.vt_reset_i(tok, vt);
        self.ready_i(tok, tid);
    }

    /// Whether the ready head outranks the current thread.
    pub(crate) fn preemption_required(&self) -> bool {
        match self.ready.front() {
            Some(head) => {
                self.threads[head.raw()].prio > self.threads[self.current.raw()].prio
            }
            None => false,
        }
    }
}

impl<P: Port> System<P> {
    /// Put the current thread to sleep in `state` and run the ready
    /// head. Returns when this thread is next scheduled.
    ///
    /// The caller has already queued itself wherever it is waiting and
    /// set its `wait_on` tag.
    pub fn go_sleep_s(&mut self, _tok: &SysLock, state: ThreadState) {
        let otp = self.kernel.current;
        self.kernel.threads[otp.raw()].state = state;

        let ntp = match queue::pop_front(&mut self.kernel.threads, &mut self.kernel.ready)
        {
            Some(t) => t,
            None => system_halt("scheduler: ready queue empty"),
        };
        self.kernel.threads[ntp.raw()].state = ThreadState::Current;
        self.kernel.threads[ntp.raw()].wait_on = WaitOn::Nothing;
        self.kernel.current = ntp;

        crate::trace!(
            "switch: {} -> {}",
            self.kernel.threads[otp.raw()].name,
            self.kernel.threads[ntp.raw()].name
        );
        self.port.context_switch(ntp, otp);
    }

    /// Sleep in `state` with a timeout, returning the wake message.
    ///
    /// `Timeout::Immediate` does not sleep at all and reports
    /// [`Msg::Timeout`]; the caller undoes its queue insertion first.
    /// `Ticks(0)` is the same thing, since the timer engine rejects a
    /// zero delay. `Timeout::Infinite` arms no timer.
    pub fn go_sleep_timeout_s(
        &mut self,
        tok: &SysLock,
        state: ThreadState,
        timeout: Timeout,
    ) -> Msg {
        let cur = self.kernel.current;
        match timeout {
            Timeout::Immediate | Timeout::Ticks(0) => return Msg::Timeout,
            Timeout::Ticks(ticks) => {
                let vt = self.kernel.threads[cur.raw()].timeout_vt;
                self.kernel.vt_set_i(tok, vt, ticks, timeout_cb, cur.raw());
            }
            Timeout::Infinite => {}
        }
        self.go_sleep_s(tok, state);
        self.kernel.threads[cur.raw()].rdy_msg()
    }

    /// Preempt the current thread if the ready head strictly outranks
    /// it. The outgoing thread keeps its round-robin turn.
    pub fn reschedule_s(&mut self, tok: &SysLock) {
        if self.kernel.preemption_required() {
            let otp = self.kernel.current;
            self.do_switch(tok, otp, true);
        }
    }

    /// Yield the CPU if the ready head has priority >= the current
    /// thread's. The outgoing thread goes behind its peers.
    pub fn yield_s(&mut self, tok: &SysLock) {
        let give_up = match self.kernel.ready.front() {
            Some(head) => {
                self.kernel.threads[head.raw()].prio
                    >= self.kernel.threads[self.kernel.current.raw()].prio
            }
            None => false,
        };
        if give_up {
            let otp = self.kernel.current;
            self.do_switch(tok, otp, false);
        }
    }

    fn do_switch(&mut self, _tok: &SysLock, otp: Tid, keep_turn: bool) {
        let ntp = match queue::pop_front(&mut self.kernel.threads, &mut self.kernel.ready)
        {
            Some(t) => t,
            None => system_halt("scheduler: ready queue empty"),
        };
        self.kernel.threads[otp.raw()].state = ThreadState::Ready;
        self.kernel.threads[otp.raw()].wait_on = WaitOn::Ready;
        if keep_turn {
            queue::insert_ahead(&mut self.kernel.threads, &mut self.kernel.ready, otp);
        } else {
            queue::insert_prio(&mut self.kernel.threads, &mut self.kernel.ready, otp);
        }

        self.kernel.threads[ntp.raw()].state = ThreadState::Current;
        self.kernel.threads[ntp.raw()].wait_on = WaitOn::Nothing;
        self.kernel.current = ntp;

        crate::trace!(
            "preempt: {} -> {}",
            self.kernel.threads[otp.raw()].name,
            self.kernel.threads[ntp.raw()].name
        );
        self.port.context_switch(ntp, otp);
    }
}

/// Timeout expiry: runs from the tick path with the lock held.
///
/// Detaches the thread from whatever it waits on, undoes any state the
/// pended operation reserved, and wakes it with [`Msg::Timeout`].
pub(crate) fn timeout_cb(k: &mut Kernel, arg: usize) {
    let tid = Tid(arg);
    if !k.threads.contains(tid.raw()) {
        return;
    }

    // Token is sound: callbacks only run from tick_i, inside the lock.
    let tok = unsafe { crate::critical::SysLock::assume() };

    match k.threads[tid.raw()].wait_on {
        WaitOn::Sem(s) => {
            let mut q = k.sems[s.raw()].queue;
            queue::dequeue(&mut k.threads, &mut q, tid);
            k.sems[s.raw()].queue = q;
            // Give back the count the wait had consumed.
            k.sems[s.raw()].ctr += 1;
        }
        WaitOn::Mutex(m) => {
            let mut q = k.mutexes[m.raw()].queue;
            queue::dequeue(&mut k.threads, &mut q, tid);
            k.mutexes[m.raw()].queue = q;
        }
        WaitOn::Cond(c) => {
            let mut q = k.condvars[c.raw()].queue;
            queue::dequeue(&mut k.threads, &mut q, tid);
            k.condvars[c.raw()].queue = q;
            // A condition wait still owes the caller its mutex back.
            k.cond_regrab(&tok, tid, Msg::Timeout);
            return;
        }
        WaitOn::MsgQueue(dst) => {
            if k.threads.contains(dst.raw()) {
                let mut q = k.threads[dst.raw()].msg_queue;
                queue::dequeue(&mut k.threads, &mut q, tid);
                k.threads[dst.raw()].msg_queue = q;
            }
        }
        WaitOn::Join(target) => {
            // The caller keeps its reference; only a completed join
            // consumes it.
            if k.threads.contains(target.raw()) {
                let mut q = k.threads[target.raw()].joiners;
                queue::dequeue(&mut k.threads, &mut q, tid);
                k.threads[target.raw()].joiners = q;
            }
        }
        // Sleeping, Suspended and the event waits sit on no list.
        WaitOn::Nothing | WaitOn::Ready => {}
    }

    k.threads[tid.raw()].wait_on = WaitOn::Nothing;
    k.threads[tid.raw()].payload = WakePayload::Rdy(Msg::Timeout);
    k.ready_i(&tok, tid);
}
