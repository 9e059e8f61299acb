//! Wait queues over the thread pool
//!
//! A wait queue is a head/tail pair of thread indices; the links live in
//! the thread records themselves. Queues are embedded in the owning
//! object (primitive, receiver thread, or the ready queue) and hold
//! thread identity only, never thread storage.
//!
//! All operations take the thread pool and the queue as separate
//! borrows, so an owner embedded next to the pool can be updated
//! in place.

use crate::config::CFG_THREADS_MAX;
use crate::pool::Pool;
use crate::thread::Thread;
use crate::types::Tid;

pub(crate) type Threads = Pool<Thread, CFG_THREADS_MAX>;

/// Doubly-linked queue of blocked (or ready) threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitQueue {
    pub(crate) first: Option<Tid>,
    pub(crate) last: Option<Tid>,
}

impl WaitQueue {
    pub(crate) const fn new() -> Self {
        WaitQueue {
            first: None,
            last: None,
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Highest-priority / oldest entry
    #[inline]
    pub(crate) fn front(&self) -> Option<Tid> {
        self.first
    }
}

/// Link `tid` between `prev` and `next`, updating the queue ends.
fn link(threads: &mut Threads, q: &mut WaitQueue, tid: Tid, prev: Option<Tid>, next: Option<Tid>) {
    debug_assert!(threads[tid.raw()].prev.is_none() && threads[tid.raw()].next.is_none());
    threads[tid.raw()].prev = prev;
    threads[tid.raw()].next = next;
    match prev {
        Some(p) => threads[p.raw()].next = Some(tid),
        None => q.first = Some(tid),
    }
    match next {
        Some(n) => threads[n.raw()].prev = Some(tid),
        None => q.last = Some(tid),
    }
}

/// Priority-ordered insert, FIFO among equal priorities.
///
/// The queue stays sorted by descending priority; a new entry goes after
/// every existing entry of the same priority.
pub(crate) fn insert_prio(threads: &mut Threads, q: &mut WaitQueue, tid: Tid) {
    let prio = threads[tid.raw()].prio;
    let mut prev: Option<Tid> = None;
    let mut cur = q.first;
    while let Some(c) = cur {
        if threads[c.raw()].prio < prio {
            break;
        }
        prev = cur;
        cur = threads[c.raw()].next;
    }
    link(threads, q, tid, prev, cur);
}

/// Priority-ordered insert ahead of the equal-priority band.
///
/// Used when a preempted thread goes back to the ready queue without
/// losing its turn.
pub(crate) fn insert_ahead(threads: &mut Threads, q: &mut WaitQueue, tid: Tid) {
    let prio = threads[tid.raw()].prio;
    let mut prev: Option<Tid> = None;
    let mut cur = q.first;
    while let Some(c) = cur {
        if threads[c.raw()].prio <= prio {
            break;
        }
        prev = cur;
        cur = threads[c.raw()].next;
    }
    link(threads, q, tid, prev, cur);
}

/// FIFO insert at the tail.
pub(crate) fn append(threads: &mut Threads, q: &mut WaitQueue, tid: Tid) {
    let prev = q.last;
    link(threads, q, tid, prev, None);
}

/// Pop the front entry (FIFO order; highest priority in a sorted queue).
pub(crate) fn pop_front(threads: &mut Threads, q: &mut WaitQueue) -> Option<Tid> {
    let tid = q.first?;
    dequeue(threads, q, tid);
    Some(tid)
}

/// Remove an arbitrary entry; used by timeout expiry and resets.
pub(crate) fn dequeue(threads: &mut Threads, q: &mut WaitQueue, tid: Tid) {
    let prev = threads[tid.raw()].prev;
    let next = threads[tid.raw()].next;
    match prev {
        Some(p) => threads[p.raw()].next = next,
        None => {
            debug_assert_eq!(q.first, Some(tid));
            q.first = next;
        }
    }
    match next {
        Some(n) => threads[n.raw()].prev = prev,
        None => {
            debug_assert_eq!(q.last, Some(tid));
            q.last = prev;
        }
    }
    threads[tid.raw()].prev = None;
    threads[tid.raw()].next = None;
}

/// Iterator over a queue from front to back
pub(crate) struct QueueIter<'a> {
    threads: &'a Threads,
    cur: Option<Tid>,
}

pub(crate) fn iter<'a>(threads: &'a Threads, q: &WaitQueue) -> QueueIter<'a> {
    QueueIter {
        threads,
        cur: q.first,
    }
}

impl Iterator for QueueIter<'_> {
    type Item = Tid;

    fn next(&mut self) -> Option<Tid> {
        let tid = self.cur?;
        self.cur = self.threads[tid.raw()].next;
        Some(tid)
    }
}
