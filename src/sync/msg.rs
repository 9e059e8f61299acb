//! Synchronous messages
//!
//! A sender queues on the receiver's message queue and sleeps until
//! the receiver has both fetched the message and posted a reply; the
//! rendezvous passes one machine word each way. Senders queue by
//! priority, so the receiver serves the most urgent first.

use crate::critical::{LockToken, SysLock};
use crate::kernel::{Kernel, System};
use crate::port::Port;
use crate::sched::queue;
use crate::thread::{WaitOn, WakePayload};
use crate::types::{Msg, ThreadState, Tid};

impl Kernel {
    /// Fetch the next queued sender, if any, moving it into the
    /// in-rendezvous state. Returns the sender and its message.
    pub fn msg_fetch_i(&mut self, _tok: &impl LockToken) -> Option<(Tid, isize)> {
        let cur = self.current;
        let mut q = self.threads[cur.raw()].msg_queue;
        let sender = queue::pop_front(&mut self.threads, &mut q);
        self.threads[cur.raw()].msg_queue = q;

        let sender = sender?;
        self.threads[sender.raw()].wait_on = WaitOn::Nothing;
        self.threads[sender.raw()].state = ThreadState::SndMsg;
        match self.threads[sender.raw()].payload {
            WakePayload::Sent(m) => Some((sender, m)),
            _ => {
                debug_assert!(false, "msg_fetch_i: sender has no message");
                Some((sender, 0))
            }
        }
    }

    /// Reply to a fetched sender and wake it. The sender's send call
    /// returns [`Msg::Custom`] carrying `reply`.
    ///
    /// Does not reschedule.
    pub fn msg_release_i(&mut self, tok: &impl LockToken, sender: Tid, reply: isize) {
        debug_assert!(
            self.threads[sender.raw()].state == ThreadState::SndMsg,
            "msg_release_i: thread is not in a rendezvous"
        );
        self.wakeup_msg_i(tok, sender, Msg::Custom(reply));
    }
}

impl<P: Port> System<P> {
    /// Send `msg` to `dst` and sleep until it replies.
    ///
    /// Returns [`Msg::Custom`] with the reply word, or [`Msg::Reset`]
    /// if `dst` terminated first.
    pub fn msg_send_s(&mut self, tok: &SysLock, dst: Tid, msg: isize) -> Msg {
        let cur = self.kernel.current;
        debug_assert!(cur != dst, "msg_send_s: sending to self");

        self.kernel.threads[cur.raw()].payload = WakePayload::Sent(msg);
        self.kernel.threads[cur.raw()].wait_on = WaitOn::MsgQueue(dst);
        let mut q = self.kernel.threads[dst.raw()].msg_queue;
        queue::insert_prio(&mut self.kernel.threads, &mut q, cur);
        self.kernel.threads[dst.raw()].msg_queue = q;

        if self.kernel.threads[dst.raw()].state == ThreadState::WtMsg {
            self.kernel.wakeup_i(tok, dst);
        }
        self.go_sleep_s(tok, ThreadState::SndMsgQ);
        self.kernel.threads[cur.raw()].rdy_msg()
    }

    pub fn msg_send(&mut self, dst: Tid, msg: isize) -> Msg {
        crate::critical::with_lock(|tok| self.msg_send_s(tok, dst, msg))
    }

    /// Wait for a sender and fetch its message.
    ///
    /// Returns `None` only if the sleep was cut short with no sender
    /// queued, which cannot happen under a real port; callers there
    /// may treat `None` as unreachable.
    pub fn msg_wait_s(&mut self, tok: &SysLock) -> Option<(Tid, isize)> {
        if let Some(hit) = self.kernel.msg_fetch_i(tok) {
            return Some(hit);
        }
        self.go_sleep_s(tok, ThreadState::WtMsg);
        self.kernel.msg_fetch_i(tok)
    }

    pub fn msg_wait(&mut self) -> Option<(Tid, isize)> {
        crate::critical::with_lock(|tok| self.msg_wait_s(tok))
    }

    /// Reply and reschedule.
    pub fn msg_release(&mut self, sender: Tid, reply: isize) {
        crate::critical::with_lock(|tok| {
            self.kernel.msg_release_i(tok, sender, reply);
            self.reschedule_s(tok);
        });
    }
}
