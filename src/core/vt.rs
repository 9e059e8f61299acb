//! Virtual timers
//!
//! One-shot countdown timers kept in a delta-encoded list: each entry
//! stores only the ticks remaining after its predecessor fires, so a
//! tick touches the head entry alone. Entries with equal deadlines
//! keep their arming order.
//!
//! Callbacks are plain functions over the kernel so they can run from
//! the tick path without knowing the port type. They run with the list
//! already detached from the fired entry, so re-arming from inside a
//! callback is legal.

use crate::critical::{LockToken, SysLock};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::types::{ThreadState, Tick, Timeout, TimerId};

/// Timer expiry callback
pub type VtFunc = fn(&mut Kernel, usize);

/// A one-shot timer entry
pub struct VirtualTimer {
    pub(crate) next: Option<TimerId>,
    pub(crate) prev: Option<TimerId>,
    /// Ticks after the predecessor fires; absolute for the list head
    pub(crate) delta: Tick,
    /// `None` while disarmed
    pub(crate) func: Option<VtFunc>,
    pub(crate) arg: usize,
}

impl VirtualTimer {
    pub(crate) const fn new() -> Self {
        VirtualTimer {
            next: None,
            prev: None,
            delta: 0,
            func: None,
            arg: 0,
        }
    }

    #[inline]
    pub(crate) fn is_armed(&self) -> bool {
        self.func.is_some()
    }
}

impl Kernel {
    /// Allocate a timer entry, initially disarmed.
    pub fn vt_create(&mut self) -> crate::error::OsResult<TimerId> {
        match self.timers.insert(VirtualTimer::new()) {
            Some(idx) => Ok(TimerId(idx)),
            None => Err(crate::error::OsError::PoolExhausted),
        }
    }

    /// Release a timer entry, disarming it first.
    pub fn vt_release(&mut self, tok: &impl LockToken, vt: TimerId) {
        self.vt_reset_i(tok, vt);
        self.timers.remove(vt.raw());
    }

    /// Arm `vt` to fire `func(arg)` after `delay` ticks.
    ///
    /// Re-arming an armed timer replaces its deadline. `delay` must be
    /// non-zero: a zero delta at the list head would swallow the tick
    /// meant for its successor. Callers express "now" without the timer
    /// engine ([`crate::types::Timeout::Immediate`]).
    pub fn vt_set_i(
        &mut self,
        tok: &impl LockToken,
        vt: TimerId,
        delay: Tick,
        func: VtFunc,
        arg: usize,
    ) {
        debug_assert!(delay > 0, "vt_set_i: zero delay");
        if self.timers[vt.raw()].is_armed() {
            self.vt_reset_i(tok, vt);
        }
        self.timers[vt.raw()].func = Some(func);
        self.timers[vt.raw()].arg = arg;

        // Walk to the insertion point, consuming deltas. Entries with
        // the same deadline are passed, preserving arming order.
        let mut remaining = delay;
        let mut prev: Option<TimerId> = None;
        let mut cur = self.vt_first;
        while let Some(c) = cur {
            let d = self.timers[c.raw()].delta;
            if remaining < d {
                break;
            }
            remaining -= d;
            prev = Some(c);
            cur = self.timers[c.raw()].next;
        }

        self.timers[vt.raw()].delta = remaining;
        self.timers[vt.raw()].prev = prev;
        self.timers[vt.raw()].next = cur;
        match prev {
            Some(p) => self.timers[p.raw()].next = Some(vt),
            None => self.vt_first = Some(vt),
        }
        if let Some(n) = cur {
            self.timers[n.raw()].prev = Some(vt);
            self.timers[n.raw()].delta -= remaining;
        }
    }

    /// Disarm `vt`. A no-op if it is not armed.
    pub fn vt_reset_i(&mut self, _tok: &impl LockToken, vt: TimerId) {
        if !self.timers[vt.raw()].is_armed() {
            return;
        }
        let prev = self.timers[vt.raw()].prev;
        let next = self.timers[vt.raw()].next;
        let delta = self.timers[vt.raw()].delta;

        match prev {
            Some(p) => self.timers[p.raw()].next = next,
            None => self.vt_first = next,
        }
        if let Some(n) = next {
            self.timers[n.raw()].prev = prev;
            // The successor absorbs the removed entry's wait.
            self.timers[n.raw()].delta += delta;
        }

        let t = &mut self.timers[vt.raw()];
        t.next = None;
        t.prev = None;
        t.delta = 0;
        t.func = None;
    }

    /// Advance the system clock one tick and fire due timers.
    ///
    /// The head delta is decremented once; every leading entry that
    /// reaches zero then fires, in list order, each detached before its
    /// callback runs.
    pub fn tick_i(&mut self, tok: &impl LockToken) {
        self.time = self.time.wrapping_add(1);

        let head = match self.vt_first {
            Some(h) => h,
            None => return,
        };
        if self.timers[head.raw()].delta > 0 {
            self.timers[head.raw()].delta -= 1;
        }

        while let Some(h) = self.vt_first {
            if self.timers[h.raw()].delta != 0 {
                break;
            }
            let func = self.timers[h.raw()].func;
            let arg = self.timers[h.raw()].arg;
            self.vt_reset_i(tok, h);
            if let Some(f) = func {
                f(self, arg);
            }
        }
    }

    /// Whether `vt` is counting down
    pub fn vt_is_armed(&self, vt: TimerId) -> bool {
        self.timers[vt.raw()].is_armed()
    }

    /// Ticks until `vt` fires; zero if disarmed
    pub fn vt_remaining(&self, vt: TimerId) -> Tick {
        if !self.timers[vt.raw()].is_armed() {
            return 0;
        }
        let mut sum: Tick = 0;
        let mut cur = self.vt_first;
        while let Some(c) = cur {
            sum += self.timers[c.raw()].delta;
            if c == vt {
                return sum;
            }
            cur = self.timers[c.raw()].next;
        }
        0
    }

    /// Number of armed timers
    pub fn vt_armed_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.vt_first;
        while let Some(c) = cur {
            n += 1;
            cur = self.timers[c.raw()].next;
        }
        n
    }
}

impl<P: Port> System<P> {
    /// Sleep for `timeout`. `Timeout::Infinite` is rejected in debug
    /// builds; `Timeout::Immediate` returns without sleeping.
    pub fn sleep_s(&mut self, tok: &SysLock, timeout: Timeout) {
        debug_assert!(
            !timeout.is_infinite(),
            "sleep_s: infinite sleep requested"
        );
        if timeout.is_immediate() {
            return;
        }
        let _ = self.go_sleep_timeout_s(tok, ThreadState::Sleeping, timeout);
    }

    pub fn sleep(&mut self, timeout: Timeout) {
        crate::critical::with_lock(|tok| self.sleep_s(tok, timeout));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::NullPort;

    fn fired_nothing(_k: &mut Kernel, _arg: usize) {}

    fn sys() -> System<NullPort> {
        System::new(NullPort::new())
    }

    #[test]
    fn delta_list_orders_by_deadline() {
        let mut s = sys();
        crate::critical::with_lock(|tok| {
            let a = s.vt_create().unwrap();
            let b = s.vt_create().unwrap();
            let c = s.vt_create().unwrap();
            s.vt_set_i(tok, a, 10, fired_nothing, 0);
            s.vt_set_i(tok, b, 4, fired_nothing, 0);
            s.vt_set_i(tok, c, 7, fired_nothing, 0);
            assert_eq!(s.vt_remaining(b), 4);
            assert_eq!(s.vt_remaining(c), 7);
            assert_eq!(s.vt_remaining(a), 10);
            assert_eq!(s.vt_armed_count(), 3);
        });
    }

    #[test]
    fn equal_deadlines_keep_arming_order() {
        static ORDER: core::sync::atomic::AtomicUsize =
            core::sync::atomic::AtomicUsize::new(0);
        fn record(_k: &mut Kernel, arg: usize) {
            let n = ORDER.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
            // arg carries the expected firing rank
            assert_eq!(arg, n);
        }

        let mut s = sys();
        crate::critical::with_lock(|tok| {
            let a = s.vt_create().unwrap();
            let b = s.vt_create().unwrap();
            let c = s.vt_create().unwrap();
            s.vt_set_i(tok, a, 5, record, 0);
            s.vt_set_i(tok, b, 5, record, 1);
            s.vt_set_i(tok, c, 5, record, 2);
            for _ in 0..5 {
                s.tick_i(tok);
            }
            assert_eq!(ORDER.load(core::sync::atomic::Ordering::SeqCst), 3);
            assert_eq!(s.vt_armed_count(), 0);
        });
    }

    #[test]
    #[should_panic(expected = "zero delay")]
    fn zero_delay_is_rejected() {
        let mut s = sys();
        crate::critical::with_lock(|tok| {
            let a = s.vt_create().unwrap();
            s.vt_set_i(tok, a, 0, fired_nothing, 0);
        });
    }

    #[test]
    fn reset_rebases_successor() {
        let mut s = sys();
        crate::critical::with_lock(|tok| {
            let a = s.vt_create().unwrap();
            let b = s.vt_create().unwrap();
            s.vt_set_i(tok, a, 3, fired_nothing, 0);
            s.vt_set_i(tok, b, 9, fired_nothing, 0);
            s.vt_reset_i(tok, a);
            assert!(!s.vt_is_armed(a));
            assert_eq!(s.vt_remaining(b), 9);
            assert_eq!(s.vt_armed_count(), 1);
        });
    }

    #[test]
    fn rearm_replaces_deadline() {
        let mut s = sys();
        crate::critical::with_lock(|tok| {
            let a = s.vt_create().unwrap();
            s.vt_set_i(tok, a, 100, fired_nothing, 0);
            s.vt_set_i(tok, a, 2, fired_nothing, 0);
            assert_eq!(s.vt_remaining(a), 2);
            s.tick_i(tok);
            s.tick_i(tok);
            assert!(!s.vt_is_armed(a));
        });
    }
}
