//! Event flags
//!
//! Every thread carries a pending-events mask. Other threads (or
//! timers and ISRs) set bits in it directly, or broadcast through an
//! event source whose registered listeners map the broadcast onto
//! per-thread bits. A thread waits for any, exactly one, or all of a
//! set of bits; served bits are cleared from the pending mask by the
//! waker and handed over in the wake record.

use crate::critical::{LockToken, SysLock};
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::thread::WakePayload;
use crate::types::{EventMask, EventSourceId, ListenerId, ThreadState, Tid, Timeout};

pub struct EventSource {
    pub(crate) first: Option<ListenerId>,
}

pub struct EventListener {
    pub(crate) tid: Tid,
    /// Bits set on the thread when the source fires
    pub(crate) events: EventMask,
    /// Flags accumulated by broadcasts, fetched with
    /// [`Kernel::evt_get_and_clear_flags`]
    pub(crate) flags: EventMask,
    pub(crate) next: Option<ListenerId>,
    pub(crate) src: EventSourceId,
}

impl Kernel {
    pub fn evt_source_create(&mut self) -> OsResult<EventSourceId> {
        match self.sources.insert(EventSource { first: None }) {
            Some(idx) => Ok(EventSourceId(idx)),
            None => Err(OsError::PoolExhausted),
        }
    }

    /// Destroy the source, detaching all listeners.
    pub fn evt_source_release(&mut self, src: EventSourceId) {
        let mut cur = self.sources[src.raw()].first;
        while let Some(l) = cur {
            cur = self.listeners[l.raw()].next;
            self.listeners.remove(l.raw());
        }
        self.sources.remove(src.raw());
    }

    /// Attach `tid` to `src`: each broadcast will set `events` in the
    /// thread's pending mask.
    pub fn evt_register(
        &mut self,
        src: EventSourceId,
        tid: Tid,
        events: EventMask,
    ) -> OsResult<ListenerId> {
        let listener = EventListener {
            tid,
            events,
            flags: 0,
            next: self.sources[src.raw()].first,
            src,
        };
        match self.listeners.insert(listener) {
            Some(idx) => {
                let lid = ListenerId(idx);
                self.sources[src.raw()].first = Some(lid);
                Ok(lid)
            }
            None => Err(OsError::PoolExhausted),
        }
    }

    /// Detach a listener from its source.
    pub fn evt_unregister(&mut self, lid: ListenerId) {
        let src = self.listeners[lid.raw()].src;
        let mut cur = self.sources[src.raw()].first;
        let mut prev: Option<ListenerId> = None;
        while let Some(l) = cur {
            if l == lid {
                let next = self.listeners[l.raw()].next;
                match prev {
                    Some(p) => self.listeners[p.raw()].next = next,
                    None => self.sources[src.raw()].first = next,
                }
                self.listeners.remove(l.raw());
                return;
            }
            prev = cur;
            cur = self.listeners[l.raw()].next;
        }
    }

    /// Fire the source: every listener accumulates `flags` and its
    /// thread receives the listener's event bits.
    ///
    /// Does not reschedule.
    pub fn evt_broadcast_flags_i(
        &mut self,
        tok: &impl LockToken,
        src: EventSourceId,
        flags: EventMask,
    ) {
        let mut cur = self.sources[src.raw()].first;
        while let Some(l) = cur {
            self.listeners[l.raw()].flags |= flags;
            let tid = self.listeners[l.raw()].tid;
            let events = self.listeners[l.raw()].events;
            cur = self.listeners[l.raw()].next;
            self.evt_signal_i(tok, tid, events);
        }
    }

    /// Fetch and clear the flags a listener accumulated.
    pub fn evt_get_and_clear_flags(&mut self, lid: ListenerId) -> EventMask {
        let flags = self.listeners[lid.raw()].flags;
        self.listeners[lid.raw()].flags = 0;
        flags
    }

    /// Set event bits on a thread, waking it if they complete a wait.
    ///
    /// Does not reschedule.
    pub fn evt_signal_i(&mut self, tok: &impl LockToken, tid: Tid, mask: EventMask) {
        self.threads[tid.raw()].epending |= mask;
        let pending = self.threads[tid.raw()].epending;

        let served = match self.threads[tid.raw()].payload {
            WakePayload::EwAny(w) if pending & w != 0 => pending & w,
            WakePayload::EwOne(w) if pending & w != 0 => {
                let hit = pending & w;
                hit & hit.wrapping_neg()
            }
            WakePayload::EwAll(w) if pending & w == w => w,
            _ => return,
        };
        debug_assert!(matches!(
            self.threads[tid.raw()].state,
            ThreadState::WtAnyEvt | ThreadState::WtAllEvt
        ));

        self.threads[tid.raw()].epending &= !served;
        self.threads[tid.raw()].payload = WakePayload::Served(served);
        self.ready_wake(tok, tid);
    }
}

impl<P: Port> System<P> {
    fn evt_wait_common(
        &mut self,
        tok: &SysLock,
        pend: WakePayload,
        state: ThreadState,
        timeout: Timeout,
    ) -> EventMask {
        let cur = self.kernel.current;
        let pending = self.kernel.threads[cur.raw()].epending;

        // Fast path: already satisfied, serve without sleeping.
        let served = match pend {
            WakePayload::EwAny(w) if pending & w != 0 => Some(pending & w),
            WakePayload::EwOne(w) if pending & w != 0 => {
                let hit = pending & w;
                Some(hit & hit.wrapping_neg())
            }
            WakePayload::EwAll(w) if pending & w == w => Some(w),
            _ => None,
        };
        if let Some(served) = served {
            self.kernel.threads[cur.raw()].epending &= !served;
            return served;
        }
        if timeout.is_immediate() {
            return 0;
        }

        self.kernel.threads[cur.raw()].payload = pend;
        let _ = self.go_sleep_timeout_s(tok, state, timeout);
        match self.kernel.threads[cur.raw()].payload {
            WakePayload::Served(mask) => mask,
            // Timed out before a matching signal arrived.
            _ => 0,
        }
    }

    /// Wait for any of `mask`; returns the served bits, 0 on timeout.
    pub fn evt_wait_any_timeout_s(
        &mut self,
        tok: &SysLock,
        mask: EventMask,
        timeout: Timeout,
    ) -> EventMask {
        self.evt_wait_common(tok, WakePayload::EwAny(mask), ThreadState::WtAnyEvt, timeout)
    }

    /// Wait for one of `mask`; serves only the lowest pending bit.
    pub fn evt_wait_one_timeout_s(
        &mut self,
        tok: &SysLock,
        mask: EventMask,
        timeout: Timeout,
    ) -> EventMask {
        self.evt_wait_common(tok, WakePayload::EwOne(mask), ThreadState::WtAnyEvt, timeout)
    }

    /// Wait until all of `mask` are pending; serves exactly `mask`.
    pub fn evt_wait_all_timeout_s(
        &mut self,
        tok: &SysLock,
        mask: EventMask,
        timeout: Timeout,
    ) -> EventMask {
        self.evt_wait_common(tok, WakePayload::EwAll(mask), ThreadState::WtAllEvt, timeout)
    }

    pub fn evt_wait_any(&mut self, mask: EventMask) -> EventMask {
        crate::critical::with_lock(|tok| {
            self.evt_wait_any_timeout_s(tok, mask, Timeout::Infinite)
        })
    }

    /// Broadcast and reschedule.
    pub fn evt_broadcast_flags(&mut self, src: EventSourceId, flags: EventMask) {
        crate::critical::with_lock(|tok| {
            self.kernel.evt_broadcast_flags_i(tok, src, flags);
            self.reschedule_s(tok);
        });
    }

    /// Signal a thread directly and reschedule.
    pub fn evt_signal(&mut self, tid: Tid, mask: EventMask) {
        crate::critical::with_lock(|tok| {
            self.kernel.evt_signal_i(tok, tid, mask);
            self.reschedule_s(tok);
        });
    }
}
