//! Condition variables
//!
//! A wait releases the associated mutex and re-takes it before the
//! call returns, on every path out of the wait including timeout. The
//! re-take happens on the waker's side: whoever releases a waiter
//! either grants it the mutex immediately or moves it onto the mutex
//! queue with its final verdict already stored, so the waiter returns
//! holding the mutex with no window in between.

use crate::critical::{LockToken, SysLock};
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::sched::queue;
use crate::thread::{WaitOn, WakePayload};
use crate::types::{CondId, Msg, MutexId, ThreadState, Tid, Timeout};

pub struct Condvar {
    pub(crate) queue: queue::WaitQueue,
}

impl Kernel {
    pub fn cond_create(&mut self) -> OsResult<CondId> {
        let cond = Condvar {
            queue: queue::WaitQueue::new(),
        };
        match self.condvars.insert(cond) {
            Some(idx) => Ok(CondId(idx)),
            None => Err(OsError::PoolExhausted),
        }
    }

    /// Destroy the condition variable. It must have no waiters.
    pub fn cond_release(&mut self, c: CondId) {
        debug_assert!(self.condvars[c.raw()].queue.is_empty(), "cond_release: has waiters");
        self.condvars.remove(c.raw());
    }

    /// Release the highest-priority waiter with [`Msg::Ok`].
    ///
    /// Does not reschedule.
    pub fn cond_signal_i(&mut self, tok: &impl LockToken, c: CondId) {
        let mut q = self.condvars[c.raw()].queue;
        let front = queue::pop_front(&mut self.threads, &mut q);
        self.condvars[c.raw()].queue = q;
        if let Some(t) = front {
            self.threads[t.raw()].wait_on = WaitOn::Nothing;
            self.cond_regrab(tok, t, Msg::Ok);
        }
    }

    /// Release every waiter with [`Msg::Reset`], in queue order.
    ///
    /// Does not reschedule.
    pub fn cond_broadcast_i(&mut self, tok: &impl LockToken, c: CondId) {
        loop {
            let mut q = self.condvars[c.raw()].queue;
            let front = queue::pop_front(&mut self.threads, &mut q);
            self.condvars[c.raw()].queue = q;
            match front {
                Some(t) => {
                    self.threads[t.raw()].wait_on = WaitOn::Nothing;
                    self.cond_regrab(tok, t, Msg::Reset);
                }
                None => break,
            }
        }
    }

    /// Route a released waiter back through its mutex.
    ///
    /// `tid` has been dequeued from the condition queue and `verdict`
    /// is what its wait call must report. If the mutex is free the
    /// thread gets it and wakes now; otherwise it joins the mutex
    /// queue as an ordinary acquirer carrying the verdict with it.
    pub(crate) fn cond_regrab(&mut self, tok: &impl LockToken, tid: Tid, verdict: Msg) {
        let m = match self.threads[tid.raw()].payload {
            WakePayload::CondMutex(m) => m,
            _ => {
                // Wait record was corrupted; fail loudly in debug.
                debug_assert!(false, "cond_regrab: no mutex recorded");
                self.wakeup_msg_i(tok, tid, verdict);
                return;
            }
        };

        if self.mutexes[m.raw()].owner.is_none() {
            self.mtx_assign(m, tid);
            self.wakeup_msg_i(tok, tid, verdict);
            return;
        }

        let vt = self.threads[tid.raw()].timeout_vt;
        self.vt_reset_i(tok, vt);
        let prio = self.threads[tid.raw()].prio;
        self.mtx_boost_chain(tok, m, prio);

        let mut q = self.mutexes[m.raw()].queue;
        queue::insert_prio(&mut self.threads, &mut q, tid);
        self.mutexes[m.raw()].queue = q;
        self.threads[tid.raw()].wait_on = WaitOn::Mutex(m);
        self.threads[tid.raw()].payload = WakePayload::Rdy(verdict);
        self.threads[tid.raw()].state = ThreadState::WtMtx;
    }
}

impl<P: Port> System<P> {
    /// Release `m`, wait on `c` up to `timeout`, re-take `m`, return
    /// the wait verdict.
    ///
    /// The caller must hold `m` as its most recently taken mutex.
    /// Returns [`Msg::Ok`] after a signal, [`Msg::Reset`] after a
    /// broadcast and [`Msg::Timeout`] if the deadline passed; the
    /// mutex is held again in every case. An immediate timeout is not
    /// meaningful here and is rejected in debug builds.
    pub fn cond_wait_timeout_s(
        &mut self,
        tok: &SysLock,
        c: CondId,
        m: MutexId,
        timeout: Timeout,
    ) -> Msg {
        debug_assert!(
            !timeout.is_immediate(),
            "cond_wait_timeout_s: immediate timeout"
        );
        let cur = self.kernel.current;
        debug_assert!(
            self.kernel.mutexes[m.raw()].owner == Some(cur),
            "cond_wait_timeout_s: mutex not held"
        );

        self.mtx_unlock_s(tok, m);

        let mut q = self.kernel.condvars[c.raw()].queue;
        queue::insert_prio(&mut self.kernel.threads, &mut q, cur);
        self.kernel.condvars[c.raw()].queue = q;
        self.kernel.threads[cur.raw()].wait_on = WaitOn::Cond(c);
        self.kernel.threads[cur.raw()].payload = WakePayload::CondMutex(m);

        self.go_sleep_timeout_s(tok, ThreadState::WtCond, timeout)
    }

    pub fn cond_wait_s(&mut self, tok: &SysLock, c: CondId, m: MutexId) -> Msg {
        self.cond_wait_timeout_s(tok, c, m, Timeout::Infinite)
    }

    /// Signal and reschedule.
    pub fn cond_signal(&mut self, c: CondId) {
        crate::critical::with_lock(|tok| {
            self.kernel.cond_signal_i(tok, c);
            self.reschedule_s(tok);
        });
    }

    /// Broadcast and reschedule.
    pub fn cond_broadcast(&mut self, c: CondId) {
        crate::critical::with_lock(|tok| {
            self.kernel.cond_broadcast_i(tok, c);
            self.reschedule_s(tok);
        });
    }
}
