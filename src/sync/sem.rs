//! Counting semaphores
//!
//! The counter doubles as the wait census: while negative, its
//! magnitude is the number of queued threads. Waiters queue by
//! priority and a signal hands the count to the queue front.

use crate::critical::{LockToken, SysLock};
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::sched::queue;
use crate::thread::WaitOn;
use crate::types::{Msg, SemId, ThreadState, Timeout};

pub struct Sem {
    pub(crate) ctr: i32,
    pub(crate) queue: queue::WaitQueue,
}

impl Kernel {
    /// Create a semaphore with initial count `n`.
    pub fn sem_create(&mut self, n: i32) -> OsResult<SemId> {
        debug_assert!(n >= 0, "sem_create: negative initial count");
        let sem = Sem {
            ctr: n,
            queue: queue::WaitQueue::new(),
        };
        match self.sems.insert(sem) {
            Some(idx) => Ok(SemId(idx)),
            None => Err(OsError::PoolExhausted),
        }
    }

    /// Signal the semaphore, waking the highest-priority waiter if any.
    ///
    /// Does not reschedule.
    pub fn sem_signal_i(&mut self, tok: &impl LockToken, s: SemId) {
        self.sems[s.raw()].ctr += 1;
        if self.sems[s.raw()].ctr <= 0 {
            let mut q = self.sems[s.raw()].queue;
            let front = queue::pop_front(&mut self.threads, &mut q);
            self.sems[s.raw()].queue = q;
            if let Some(t) = front {
                self.threads[t.raw()].wait_on = WaitOn::Nothing;
                self.wakeup_i(tok, t);
            }
        }
    }

    /// Reset the counter to `n`, waking every waiter with [`Msg::Reset`].
    ///
    /// Waiters are released in queue order. Does not reschedule.
    pub fn sem_reset_i(&mut self, tok: &impl LockToken, s: SemId, n: i32) {
        debug_assert!(n >= 0, "sem_reset_i: negative count");
        let waiters = -self.sems[s.raw()].ctr;
        self.sems[s.raw()].ctr = n;
        for _ in 0..waiters {
            let mut q = self.sems[s.raw()].queue;
            let front = queue::pop_front(&mut self.threads, &mut q);
            self.sems[s.raw()].queue = q;
            match front {
                Some(t) => {
                    self.threads[t.raw()].wait_on = WaitOn::Nothing;
                    self.wakeup_msg_i(tok, t, Msg::Reset);
                }
                None => break,
            }
        }
    }

    /// Destroy the semaphore, waking every waiter with [`Msg::Reset`].
    pub fn sem_release(&mut self, tok: &impl LockToken, s: SemId) {
        self.sem_reset_i(tok, s, 0);
        self.sems.remove(s.raw());
    }
}

impl<P: Port> System<P> {
    /// Take the semaphore, sleeping up to `timeout` if the count is
    /// exhausted.
    ///
    /// Returns [`Msg::Ok`] on a successful take, [`Msg::Timeout`] if
    /// the deadline passed (including `Timeout::Immediate` with no
    /// count available) and [`Msg::Reset`] if the semaphore was reset
    /// while waiting.
    pub fn sem_wait_timeout_s(
        &mut self,
        tok: &SysLock,
        s: SemId,
        timeout: Timeout,
    ) -> Msg {
        self.kernel.sems[s.raw()].ctr -= 1;
        if self.kernel.sems[s.raw()].ctr >= 0 {
            return Msg::Ok;
        }
        if timeout.is_immediate() {
            self.kernel.sems[s.raw()].ctr += 1;
            return Msg::Timeout;
        }

        let cur = self.kernel.current;
        let mut q = self.kernel.sems[s.raw()].queue;
        queue::insert_prio(&mut self.kernel.threads, &mut q, cur);
        self.kernel.sems[s.raw()].queue = q;
        self.kernel.threads[cur.raw()].wait_on = WaitOn::Sem(s);

        self.go_sleep_timeout_s(tok, ThreadState::WtSem, timeout)
    }

    pub fn sem_wait_s(&mut self, tok: &SysLock, s: SemId) -> Msg {
        self.sem_wait_timeout_s(tok, s, Timeout::Infinite)
    }

    pub fn sem_wait(&mut self, s: SemId) -> Msg {
        crate::critical::with_lock(|tok| self.sem_wait_s(tok, s))
    }

    /// Signal and reschedule.
    pub fn sem_signal(&mut self, s: SemId) {
        crate::critical::with_lock(|tok| {
            self.kernel.sem_signal_i(tok, s);
            self.reschedule_s(tok);
        });
    }

    /// Atomically signal `signal` and wait on `wait`.
    ///
    /// No window exists in which a higher-priority thread released by
    /// the signal could run before this thread is queued on `wait`.
    pub fn sem_signal_wait_s(&mut self, tok: &SysLock, signal: SemId, wait: SemId) -> Msg {
        self.kernel.sem_signal_i(tok, signal);
        let msg = self.sem_wait_timeout_s(tok, wait, Timeout::Infinite);
        // If the wait was satisfied without sleeping, the signal's
        // wakeup still needs a scheduler pass.
        self.reschedule_s(tok);
        msg
    }
}
