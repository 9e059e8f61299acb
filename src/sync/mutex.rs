//! Mutexes with priority inheritance
//!
//! Ownership is tracked both ways: the mutex records its owner and the
//! owner keeps a stack of held mutexes, most recently taken first.
//! Unlocks must follow that stack order.
//!
//! When a thread blocks on an owned mutex, the owner (and transitively
//! whatever the owner itself blocks on) inherits the blocker's
//! priority. On unlock the priority falls back only as far as the
//! remaining held mutexes allow: the restored priority is the maximum
//! of the base priority and the front waiter of every mutex still held.

use crate::config::CFG_PI_CHAIN_MAX;
use crate::critical::{LockToken, SysLock};
use crate::error::{system_halt, OsError, OsResult};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::sched::queue;
use crate::thread::{WaitOn, WakePayload};
use crate::types::{Msg, MutexId, Prio, ThreadState, Tid};

pub struct Mutex {
    pub(crate) owner: Option<Tid>,
    /// Blocked acquirers, priority order
    pub(crate) queue: queue::WaitQueue,
    /// Link in the owner's held stack
    pub(crate) next_owned: Option<MutexId>,
}

impl Kernel {
    pub fn mtx_create(&mut self) -> OsResult<MutexId> {
        let mtx = Mutex {
            owner: None,
            queue: queue::WaitQueue::new(),
            next_owned: None,
        };
        match self.mutexes.insert(mtx) {
            Some(idx) => Ok(MutexId(idx)),
            None => Err(OsError::PoolExhausted),
        }
    }

    /// Destroy the mutex. It must be unowned with no waiters.
    pub fn mtx_release(&mut self, m: MutexId) {
        debug_assert!(self.mutexes[m.raw()].owner.is_none(), "mtx_release: still owned");
        debug_assert!(self.mutexes[m.raw()].queue.is_empty(), "mtx_release: has waiters");
        self.mutexes.remove(m.raw());
    }

    /// Record `tid` as owner of `m`, pushing it on the held stack.
    pub(crate) fn mtx_assign(&mut self, m: MutexId, tid: Tid) {
        self.mutexes[m.raw()].owner = Some(tid);
        self.mutexes[m.raw()].next_owned = self.threads[tid.raw()].mtx_list;
        self.threads[tid.raw()].mtx_list = Some(m);
    }

    /// Propagate `prio` along the blocking chain starting at the owner
    /// of `m`. The walk is capped at [`CFG_PI_CHAIN_MAX`] hops.
    pub(crate) fn mtx_boost_chain(&mut self, _tok: &impl LockToken, m: MutexId, prio: Prio) {
        let mut cur = self.mutexes[m.raw()].owner;
        for _ in 0..CFG_PI_CHAIN_MAX {
            let tp = match cur {
                Some(t) => t,
                None => return,
            };
            if self.threads[tp.raw()].prio >= prio {
                return;
            }
            self.threads[tp.raw()].prio = prio;

            match self.threads[tp.raw()].wait_on {
                WaitOn::Ready => {
                    let mut q = self.ready;
                    queue::dequeue(&mut self.threads, &mut q, tp);
                    queue::insert_prio(&mut self.threads, &mut q, tp);
                    self.ready = q;
                    return;
                }
                WaitOn::Mutex(next_m) => {
                    let mut q = self.mutexes[next_m.raw()].queue;
                    queue::dequeue(&mut self.threads, &mut q, tp);
                    queue::insert_prio(&mut self.threads, &mut q, tp);
                    self.mutexes[next_m.raw()].queue = q;
                    cur = self.mutexes[next_m.raw()].owner;
                }
                WaitOn::Sem(s) => {
                    let mut q = self.sems[s.raw()].queue;
                    queue::dequeue(&mut self.threads, &mut q, tp);
                    queue::insert_prio(&mut self.threads, &mut q, tp);
                    self.sems[s.raw()].queue = q;
                    return;
                }
                WaitOn::Cond(c) => {
                    let mut q = self.condvars[c.raw()].queue;
                    queue::dequeue(&mut self.threads, &mut q, tp);
                    queue::insert_prio(&mut self.threads, &mut q, tp);
                    self.condvars[c.raw()].queue = q;
                    return;
                }
                WaitOn::MsgQueue(dst) => {
                    let mut q = self.threads[dst.raw()].msg_queue;
                    queue::dequeue(&mut self.threads, &mut q, tp);
                    queue::insert_prio(&mut self.threads, &mut q, tp);
                    self.threads[dst.raw()].msg_queue = q;
                    return;
                }
                // Running, or on a FIFO list; nothing to requeue.
                WaitOn::Nothing | WaitOn::Join(_) => return,
            }
        }
    }

    /// Hand `m` to its front waiter, if any, and wake it. Returns the
    /// new owner.
    pub(crate) fn mtx_pass_on(&mut self, tok: &impl LockToken, m: MutexId) -> Option<Tid> {
        let mut q = self.mutexes[m.raw()].queue;
        let next = queue::pop_front(&mut self.threads, &mut q);
        self.mutexes[m.raw()].queue = q;
        match next {
            Some(w) => {
                self.threads[w.raw()].wait_on = WaitOn::Nothing;
                self.mtx_assign(m, w);
                // The wake outcome was stored when the waiter queued.
                self.ready_wake(tok, w);
                Some(w)
            }
            None => {
                self.mutexes[m.raw()].owner = None;
                None
            }
        }
    }

    /// Priority `tid` may fall back to given the mutexes it still
    /// holds: its base priority, raised to any front waiter's.
    pub(crate) fn mtx_restore_prio(&self, tid: Tid) -> Prio {
        let mut prio = self.threads[tid.raw()].real_prio;
        let mut cur = self.threads[tid.raw()].mtx_list;
        while let Some(m) = cur {
            if let Some(w) = self.mutexes[m.raw()].queue.front() {
                let wp = self.threads[w.raw()].prio;
                if wp > prio {
                    prio = wp;
                }
            }
            cur = self.mutexes[m.raw()].next_owned;
        }
        prio
    }
}

impl<P: Port> System<P> {
    /// Take the mutex, boosting the owner chain and sleeping if it is
    /// already owned.
    pub fn mtx_lock_s(&mut self, tok: &SysLock, m: MutexId) {
        let cur = self.kernel.current;
        if self.kernel.mutexes[m.raw()].owner.is_none() {
            self.kernel.mtx_assign(m, cur);
            return;
        }
        debug_assert!(
            self.kernel.mutexes[m.raw()].owner != Some(cur),
            "mtx_lock_s: recursive lock"
        );

        let prio = self.kernel.threads[cur.raw()].prio;
        self.kernel.mtx_boost_chain(tok, m, prio);

        let mut q = self.kernel.mutexes[m.raw()].queue;
        queue::insert_prio(&mut self.kernel.threads, &mut q, cur);
        self.kernel.mutexes[m.raw()].queue = q;
        self.kernel.threads[cur.raw()].wait_on = WaitOn::Mutex(m);
        self.kernel.threads[cur.raw()].payload = WakePayload::Rdy(Msg::Ok);

        self.go_sleep_s(tok, ThreadState::WtMtx);
    }

    pub fn mtx_lock(&mut self, m: MutexId) {
        crate::critical::with_lock(|tok| self.mtx_lock_s(tok, m));
    }

    /// Take the mutex only if it is free.
    pub fn mtx_try_lock_s(&mut self, _tok: &SysLock, m: MutexId) -> bool {
        if self.kernel.mutexes[m.raw()].owner.is_some() {
            return false;
        }
        let cur = self.kernel.current;
        self.kernel.mtx_assign(m, cur);
        true
    }

    /// Drop the mutex and hand it to the front waiter.
    ///
    /// `m` must be the most recently taken mutex still held. Does not
    /// reschedule.
    pub fn mtx_unlock_s(&mut self, tok: &SysLock, m: MutexId) {
        let cur = self.kernel.current;
        debug_assert!(
            self.kernel.mutexes[m.raw()].owner == Some(cur),
            "mtx_unlock_s: not the owner"
        );
        match self.kernel.threads[cur.raw()].mtx_list {
            Some(head) if head == m => {
                self.kernel.threads[cur.raw()].mtx_list =
                    self.kernel.mutexes[m.raw()].next_owned;
                self.kernel.mutexes[m.raw()].next_owned = None;
            }
            _ => system_halt("mutex unlocked out of order"),
        }

        self.kernel.threads[cur.raw()].prio = self.kernel.mtx_restore_prio(cur);
        self.kernel.mtx_pass_on(tok, m);
    }

    /// Unlock and reschedule.
    pub fn mtx_unlock(&mut self, m: MutexId) {
        crate::critical::with_lock(|tok| {
            self.mtx_unlock_s(tok, m);
            self.reschedule_s(tok);
        });
    }

    /// Release every held mutex, most recent first.
    pub fn mtx_unlock_all_s(&mut self, tok: &SysLock) {
        let cur = self.kernel.current;
        while let Some(m) = self.kernel.threads[cur.raw()].mtx_list {
            self.kernel.threads[cur.raw()].mtx_list =
                self.kernel.mutexes[m.raw()].next_owned;
            self.kernel.mutexes[m.raw()].next_owned = None;
            self.kernel.mtx_pass_on(tok, m);
        }
        self.kernel.threads[cur.raw()].prio = self.kernel.threads[cur.raw()].real_prio;
    }

    pub fn mtx_unlock_all(&mut self) {
        crate::critical::with_lock(|tok| {
            self.mtx_unlock_all_s(tok);
            self.reschedule_s(tok);
        });
    }
}
