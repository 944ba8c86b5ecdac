// src/sim/kernel.rs

//! Single-threaded cooperative executor with virtual time.
//!
//! Processes are plain `'static` futures. Suspension points are channel
//! receives, [`Sim::sleep`] timers, and awaiting another process's
//! completion handle; nothing here ever blocks on the outside world.
//!
//! The run loop polls every woken process before touching the clock. Only
//! when no process is ready does it pop the earliest `(deadline, seq)`
//! timer, advance `now`, and wake the sleeper. [`Sim::run`] returns at
//! quiescence: no process ready and no timer pending. Processes still
//! parked on a channel at that point are abandoned, which is exactly the
//! termination condition the simulation relies on when a dead cluster can
//! make no further progress.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use super::clock;

type ProcId = u64;
type ProcFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Handle to the kernel; cheap to clone and share between processes.
#[derive(Clone)]
pub struct Sim {
    inner: Rc<RefCell<Inner>>,
    woken: Arc<Mutex<VecDeque<ProcId>>>,
}

struct Inner {
    now: Duration,
    next_proc_id: ProcId,
    next_timer_seq: u64,
    procs: HashMap<ProcId, ProcSlot>,
    ready: VecDeque<ProcId>,
    queued: HashSet<ProcId>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
}

/// The future is taken out of its slot while being polled, so a process can
/// reach back into the kernel (spawn, sleep) without a double borrow.
struct ProcSlot {
    fut: Option<ProcFuture>,
}

struct TimerEntry {
    deadline: Duration,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Pushes the woken process id onto the shared wake queue.
///
/// Channel primitives clone the [`Waker`] and may wake from wherever they
/// please; the queue is the only state they touch, so waking never contends
/// with a kernel borrow.
struct WakeHandle {
    id: ProcId,
    woken: Arc<Mutex<VecDeque<ProcId>>>,
}

impl Wake for WakeHandle {
    fn wake(self: Arc<Self>) {
        self.woken.lock().unwrap().push_back(self.id);
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl Sim {
    pub fn new() -> Self {
        clock::set_now(Duration::ZERO);
        Self {
            inner: Rc::new(RefCell::new(Inner {
                now: Duration::ZERO,
                next_proc_id: 0,
                next_timer_seq: 0,
                procs: HashMap::new(),
                ready: VecDeque::new(),
                queued: HashSet::new(),
                timers: BinaryHeap::new(),
            })),
            woken: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Register a logical process. It is polled for the first time during
    /// the next [`Sim::run`] iteration, before the clock moves.
    pub fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_proc_id;
        inner.next_proc_id += 1;
        inner.procs.insert(id, ProcSlot { fut: Some(Box::pin(fut)) });
        inner.ready.push_back(id);
        inner.queued.insert(id);
    }

    /// A future that completes once virtual time reaches `now + duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        let deadline = self.now() + duration;
        Sleep {
            inner: Rc::clone(&self.inner),
            deadline,
        }
    }

    /// Drive the simulation to quiescence.
    pub fn run(&self) {
        loop {
            self.drain_woken();
            while let Some(id) = self.next_ready() {
                self.poll_proc(id);
                self.drain_woken();
            }
            if !self.advance_clock() {
                break;
            }
        }
        // Abandon processes still parked on a channel; dropping them here
        // also breaks any handle cycles back into the kernel.
        let abandoned = {
            let mut inner = self.inner.borrow_mut();
            std::mem::take(&mut inner.procs)
        };
        drop(abandoned);
    }

    fn drain_woken(&self) {
        loop {
            let id = match self.woken.lock().unwrap().pop_front() {
                Some(id) => id,
                None => break,
            };
            let mut inner = self.inner.borrow_mut();
            if inner.procs.contains_key(&id) && inner.queued.insert(id) {
                inner.ready.push_back(id);
            }
        }
    }

    fn next_ready(&self) -> Option<ProcId> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.ready.pop_front()?;
        inner.queued.remove(&id);
        Some(id)
    }

    fn poll_proc(&self, id: ProcId) {
        let fut = {
            let mut inner = self.inner.borrow_mut();
            inner.procs.get_mut(&id).and_then(|slot| slot.fut.take())
        };
        let Some(mut fut) = fut else { return };

        let waker = Waker::from(Arc::new(WakeHandle {
            id,
            woken: Arc::clone(&self.woken),
        }));
        let mut cx = Context::from_waker(&waker);

        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.inner.borrow_mut().procs.remove(&id);
            }
            Poll::Pending => {
                if let Some(slot) = self.inner.borrow_mut().procs.get_mut(&id) {
                    slot.fut = Some(fut);
                }
            }
        }
    }

    /// Advance to the earliest pending timer. Returns false at quiescence.
    fn advance_clock(&self) -> bool {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            let Some(Reverse(timer)) = inner.timers.pop() else {
                return false;
            };
            debug_assert!(timer.deadline >= inner.now);
            inner.now = timer.deadline;
            clock::set_now(inner.now);
            timer.waker
        };
        waker.wake();
        true
    }
}

/// Timer future returned by [`Sim::sleep`].
///
/// Re-polling registers a fresh heap entry; superseded entries fire into a
/// stale waker and are ignored by the run loop.
pub struct Sleep {
    inner: Rc<RefCell<Inner>>,
    deadline: Duration,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.now >= self.deadline {
            return Poll::Ready(());
        }
        let seq = inner.next_timer_seq;
        inner.next_timer_seq += 1;
        inner.timers.push(Reverse(TimerEntry {
            deadline: self.deadline,
            seq,
            waker: cx.waker().clone(),
        }));
        Poll::Pending
    }
}
