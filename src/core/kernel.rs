//! Kernel context object
//!
//! All kernel state lives in one explicit [`Kernel`] value: the thread
//! pool, the primitive pools, the ready queue with its cached current
//! thread, and the virtual-timer delta list. There are no hidden
//! statics; the embedder owns the kernel for the length of the process
//! (on hardware, typically inside a [`CsCell`](crate::critical::CsCell)).
//!
//! [`System`] pairs the kernel with the port layer. Operations that can
//! transfer control (the S-class, blocking surface) live on `System`;
//! everything else (the I-class surface, callable from timer callbacks
//! and ISRs) lives on `Kernel`, which `System` derefs to.

use core::ops::{Deref, DerefMut};

use crate::config::{
    CFG_CONDVARS_MAX, CFG_EVENT_SOURCES_MAX, CFG_LISTENERS_MAX, CFG_MUTEXES_MAX,
    CFG_SEMAPHORES_MAX, CFG_THREADS_MAX, CFG_TIMERS_MAX, IDLE_PRIO, NORMAL_PRIO,
};
use crate::error::system_halt;
use crate::pool::Pool;
use crate::port::Port;
use crate::sched::queue::{self, Threads, WaitQueue};
use crate::sync::condvar::Condvar;
use crate::sync::events::{EventListener, EventSource};
use crate::sync::mutex::Mutex;
use crate::sync::sem::Sem;
use crate::thread::WakePayload;
use crate::types::{
    EventMask, Msg, MutexId, Prio, SemId, ThreadState, Tick, Tid, TimerId,
};
use crate::vt::VirtualTimer;

/// Kernel state: object pools, ready queue, timer list, system clock
pub struct Kernel {
    pub(crate) threads: Threads,
    pub(crate) timers: Pool<VirtualTimer, CFG_TIMERS_MAX>,
    pub(crate) sems: Pool<Sem, CFG_SEMAPHORES_MAX>,
    pub(crate) mutexes: Pool<Mutex, CFG_MUTEXES_MAX>,
    pub(crate) condvars: Pool<Condvar, CFG_CONDVARS_MAX>,
    pub(crate) sources: Pool<EventSource, CFG_EVENT_SOURCES_MAX>,
    pub(crate) listeners: Pool<EventListener, CFG_LISTENERS_MAX>,

    /// Runnable threads, descending priority, FIFO among equals
    pub(crate) ready: WaitQueue,
    /// The running thread; its priority is >= the ready head's
    pub(crate) current: Tid,
    /// Head of the delta-encoded virtual timer list
    pub(crate) vt_first: Option<TimerId>,
    /// System clock in ticks
    pub(crate) time: Tick,
}

/// The kernel paired with its context-switch port
pub struct System<P: Port> {
    pub(crate) kernel: Kernel,
    pub(crate) port: P,
}

impl<P: Port> Deref for System<P> {
    type Target = Kernel;

    #[inline(always)]
    fn deref(&self) -> &Kernel {
        &self.kernel
    }
}

impl<P: Port> DerefMut for System<P> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }
}

impl<P: Port> System<P> {
    /// Initialize the kernel.
    ///
    /// Creates the internal idle thread and a record for the calling
    /// context ("main", [`NORMAL_PRIO`]), which becomes the current
    /// thread. The idle thread guarantees the ready queue is never empty
    /// when the current thread blocks.
    pub fn new(port: P) -> Self {
        let mut kernel = Kernel {
            threads: Threads::new(),
            timers: Pool::new(),
            sems: Pool::new(),
            mutexes: Pool::new(),
            condvars: Pool::new(),
            sources: Pool::new(),
            listeners: Pool::new(),
            ready: WaitQueue::new(),
            current: Tid(0),
            vt_first: None,
            time: 0,
        };

        let idle = kernel
            .thread_alloc("idle", IDLE_PRIO)
            .unwrap_or_else(|_| system_halt("init: thread pool too small"));
        let main = kernel
            .thread_alloc("main", NORMAL_PRIO)
            .unwrap_or_else(|_| system_halt("init: thread pool too small"));

        kernel.threads[idle.raw()].state = ThreadState::Ready;
        kernel.threads[idle.raw()].wait_on = crate::thread::WaitOn::Ready;
        queue::insert_prio(&mut kernel.threads, &mut kernel.ready, idle);

        kernel.threads[main.raw()].state = ThreadState::Current;
        kernel.current = main;

        System { kernel, port }
    }

    /// Deliver one system tick and preempt if a wakeup calls for it.
    ///
    /// On hardware this is the body of the tick ISR: `tick_i` under the
    /// ISR lock, preemption on exit.
    pub fn tick(&mut self) {
        crate::critical::with_lock(|tok| {
            self.kernel.tick_i(tok);
            self.reschedule_s(tok);
        });
    }
}

// ============ Read accessors ============

impl Kernel {
    /// The running thread
    #[inline]
    pub fn current(&self) -> Tid {
        self.current
    }

    /// System clock in ticks
    #[inline]
    pub fn system_time(&self) -> Tick {
        self.time
    }

    /// Whether `tid` still addresses a live record
    #[inline]
    pub fn thread_exists(&self, tid: Tid) -> bool {
        self.threads.contains(tid.raw())
    }

    pub fn thread_name(&self, tid: Tid) -> &'static str {
        self.threads[tid.raw()].name
    }

    pub fn thread_state(&self, tid: Tid) -> ThreadState {
        self.threads[tid.raw()].state
    }

    /// Current (possibly inherited) priority
    pub fn thread_priority(&self, tid: Tid) -> Prio {
        self.threads[tid.raw()].prio
    }

    /// Base priority
    pub fn thread_real_priority(&self, tid: Tid) -> Prio {
        self.threads[tid.raw()].real_prio
    }

    /// Wake message left by the last wakeup of `tid`.
    ///
    /// This is the authoritative outcome of the thread's last blocking
    /// call; under a stub port it is how tests (and simulators) observe
    /// what a suspended call will return.
    pub fn wake_message(&self, tid: Tid) -> Msg {
        self.threads[tid.raw()].rdy_msg()
    }

    /// Events delivered by the last event wakeup of `tid`
    pub fn served_events(&self, tid: Tid) -> EventMask {
        match self.threads[tid.raw()].payload {
            WakePayload::Served(mask) => mask,
            _ => 0,
        }
    }

    /// Pending (not yet served) event flags of `tid`
    pub fn pending_events(&self, tid: Tid) -> EventMask {
        self.threads[tid.raw()].epending
    }

    /// Mutexes currently owned by `tid`, most recent first
    pub fn owned_mutexes(&self, tid: Tid) -> OwnedMutexIter<'_> {
        OwnedMutexIter {
            kernel: self,
            cur: self.threads[tid.raw()].mtx_list,
        }
    }

    /// Runnable threads from highest priority to lowest
    pub fn ready_order(&self) -> ReadyIter<'_> {
        ReadyIter {
            inner: queue::iter(&self.threads, &self.ready),
        }
    }
}

/// See [`Kernel::ready_order`]
pub struct ReadyIter<'a> {
    inner: queue::QueueIter<'a>,
}

impl Iterator for ReadyIter<'_> {
    type Item = Tid;

    fn next(&mut self) -> Option<Tid> {
        self.inner.next()
    }
}

/// See [`Kernel::owned_mutexes`]
pub struct OwnedMutexIter<'a> {
    kernel: &'a Kernel,
    cur: Option<MutexId>,
}

impl Iterator for OwnedMutexIter<'_> {
    type Item = MutexId;

    fn next(&mut self) -> Option<MutexId> {
        let m = self.cur?;
        self.cur = self.kernel.mutexes[m.raw()].next_owned;
        Some(m)
    }
}

/// Semaphore handles needed by accessors live next to their primitives;
/// the counter is the one piece of state tests and monitors peek at.
impl Kernel {
    /// Semaphore counter; negative values count waiters
    pub fn sem_count(&self, s: SemId) -> i32 {
        self.sems[s.raw()].ctr
    }

    /// Owner of a mutex, if any
    pub fn mutex_owner(&self, m: MutexId) -> Option<Tid> {
        self.mutexes[m.raw()].owner
    }
}
