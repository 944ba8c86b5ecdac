// src/exec/executor.rs

//! A logical cluster node.
//!
//! Each executor runs one inbox loop plus one sub-process per active launch
//! and per in-flight shuffle fetch served from its local output. Interrupts
//! are delivered through per-process `oneshot` channels; `kill` takes the
//! senders but leaves the map keys, because the scheduler still inspects
//! which launches were live when it processes the `ExecutorKilled` event.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::dag::{ExecutorId, SharedDag, StageId, Tid};
use crate::engine::{
    Cluster, ExecutorEvent, ExecutorRx, ExecutorTx, Interrupt, SchedulerEvent, SchedulerTx,
    StatusUpdate, TerminalStatus,
};
use crate::exec::task_proc;
use crate::sim::Sim;

/// Result of awaiting a shuffle fetch served by a remote executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Served,
    Disconnected,
}

/// Handle for a currently-running launch sub-process.
struct TaskProc {
    cancel: Option<oneshot::Sender<Interrupt>>,
}

/// Handle for an in-flight shuffle fetch served from this executor.
struct FetchProc {
    disconnect: Option<oneshot::Sender<Interrupt>>,
}

pub struct Executor {
    pub id: ExecutorId,
    pub cores: usize,
    available_slots: Cell<usize>,
    sim: Sim,
    dag: SharedDag,
    cluster: Cluster,
    self_tx: ExecutorTx,
    scheduler_tx: SchedulerTx,
    taskprocs: RefCell<HashMap<Tid, TaskProc>>,
    fetchprocs: RefCell<HashMap<Tid, FetchProc>>,
    // Metric accounting, written by the scheduler and read by the controller.
    commissioned_at: f64,
    killed_at: Cell<Option<f64>>,
    computed: Cell<f64>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("cores", &self.cores)
            .field("available_slots", &self.available_slots.get())
            .finish()
    }
}

impl Executor {
    pub fn new(
        id: ExecutorId,
        cores: usize,
        sim: Sim,
        dag: SharedDag,
        cluster: Cluster,
        scheduler_tx: SchedulerTx,
    ) -> (Rc<Self>, ExecutorRx) {
        let (self_tx, inbox) = mpsc::unbounded_channel();
        let commissioned_at = sim.now().as_secs_f64();
        let executor = Rc::new(Self {
            id,
            cores,
            available_slots: Cell::new(cores),
            sim,
            dag,
            cluster,
            self_tx,
            scheduler_tx,
            taskprocs: RefCell::new(HashMap::new()),
            fetchprocs: RefCell::new(HashMap::new()),
            commissioned_at,
            killed_at: Cell::new(None),
            computed: Cell::new(0.0),
        });
        (executor, inbox)
    }

    /// Inbox loop. Runs until the simulation is torn down; a dead executor
    /// keeps draining its inbox so in-flight terminal messages still reach
    /// the scheduler (where the stale check disposes of them).
    pub async fn run(self: Rc<Self>, mut inbox: ExecutorRx) {
        while let Some(event) = inbox.recv().await {
            info!(target: "executor", "[{}] {event:?}", self.id);
            match event {
                ExecutorEvent::Launch(launch) => {
                    let (cancel_tx, cancel_rx) = oneshot::channel();
                    self.taskprocs.borrow_mut().insert(
                        launch.tid,
                        TaskProc {
                            cancel: Some(cancel_tx),
                        },
                    );
                    self.sim
                        .spawn(task_proc::run_launch(Rc::clone(&self), launch, cancel_rx));
                }
                ExecutorEvent::StatusUpdate(update) => {
                    self.taskprocs.borrow_mut().remove(&update.tid);
                    let _ = self
                        .scheduler_tx
                        .send(SchedulerEvent::StatusUpdate(update));
                }
                ExecutorEvent::FetchFailed(failure) => {
                    self.taskprocs.borrow_mut().remove(&failure.tid);
                    let _ = self
                        .scheduler_tx
                        .send(SchedulerEvent::FetchFailed(failure));
                }
                ExecutorEvent::KillTask { tid } => match self.taskprocs.borrow_mut().remove(&tid) {
                    Some(mut proc) => {
                        if let Some(cancel) = proc.cancel.take() {
                            let _ = cancel.send(Interrupt::Killed);
                        }
                        let _ = self.scheduler_tx.send(SchedulerEvent::StatusUpdate(
                            StatusUpdate {
                                tid,
                                status: TerminalStatus::Killed,
                                eid: self.id,
                            },
                        ));
                    }
                    None => {
                        warn!(target: "executor", "[{}] task={tid} not found in taskprocs", self.id);
                    }
                },
            }
        }
    }

    /// Serve a shuffle fetch for downstream launch `tid` of `stage`.
    ///
    /// The fetch cost is the reading stage's `stats.shuffle.avg`; the
    /// returned receiver resolves when the transfer completes or when this
    /// executor dies mid-transfer.
    pub fn fetch(&self, tid: Tid, stage: StageId) -> oneshot::Receiver<FetchOutcome> {
        let (done_tx, done_rx) = oneshot::channel();
        let (disconnect_tx, disconnect_rx) = oneshot::channel();
        self.fetchprocs.borrow_mut().insert(
            tid,
            FetchProc {
                disconnect: Some(disconnect_tx),
            },
        );
        let duration = {
            let dag = self.dag.borrow();
            Duration::from_secs_f64(dag.stages[stage].stats.shuffle_avg.unwrap_or(0.0))
        };
        let sim = self.sim.clone();
        self.sim
            .spawn(fetch_proc(sim, duration, disconnect_rx, done_tx));
        done_rx
    }

    /// Interrupt every live sub-process: launches with `Killed`, served
    /// fetches with `Disconnect`. The disconnect is what surfaces as
    /// `FetchFailed` inside remote task bodies waiting on this executor's
    /// shuffle output. Interrupts go out in ascending `tid` order so wake
    /// order, and with it the whole run, stays reproducible.
    pub fn kill(&self) {
        let mut taskprocs = self.taskprocs.borrow_mut();
        let mut tids: Vec<Tid> = taskprocs.keys().copied().collect();
        tids.sort_unstable();
        for tid in tids {
            if let Some(cancel) = taskprocs.get_mut(&tid).and_then(|proc| proc.cancel.take()) {
                let _ = cancel.send(Interrupt::Killed);
            }
        }
        drop(taskprocs);

        let mut fetchprocs = self.fetchprocs.borrow_mut();
        let mut tids: Vec<Tid> = fetchprocs.keys().copied().collect();
        tids.sort_unstable();
        for tid in tids {
            if let Some(disconnect) = fetchprocs
                .get_mut(&tid)
                .and_then(|proc| proc.disconnect.take())
            {
                let _ = disconnect.send(Interrupt::Disconnect);
            }
        }
    }

    pub fn send(&self, event: ExecutorEvent) {
        let _ = self.self_tx.send(event);
    }

    pub fn reserve(&self) {
        let slots = self.available_slots.get();
        debug_assert!(slots > 0);
        self.available_slots.set(slots - 1);
    }

    pub fn release(&self) {
        let slots = self.available_slots.get() + 1;
        debug_assert!(slots <= self.cores);
        self.available_slots.set(slots);
    }

    pub fn available_slots(&self) -> usize {
        self.available_slots.get()
    }

    /// Launch attempts currently tracked as live on this executor, in
    /// ascending `tid` order.
    pub fn running_tids(&self) -> Vec<Tid> {
        let mut tids: Vec<Tid> = self.taskprocs.borrow().keys().copied().collect();
        tids.sort_unstable();
        tids
    }

    pub fn taskproc_count(&self) -> usize {
        self.taskprocs.borrow().len()
    }

    pub(crate) fn sim(&self) -> &Sim {
        &self.sim
    }

    pub(crate) fn dag(&self) -> &SharedDag {
        &self.dag
    }

    pub(crate) fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn add_computed(&self, seconds: f64) {
        self.computed.set(self.computed.get() + seconds);
    }

    pub fn computed(&self) -> f64 {
        self.computed.get()
    }

    pub fn record_killed(&self, now: f64) {
        self.killed_at.set(Some(now));
    }

    pub fn killed_at(&self) -> Option<f64> {
        self.killed_at.get()
    }

    pub fn commissioned_at(&self) -> f64 {
        self.commissioned_at
    }
}

/// Transfer process serving one shuffle fetch.
async fn fetch_proc(
    sim: Sim,
    duration: Duration,
    mut disconnect: oneshot::Receiver<Interrupt>,
    done: oneshot::Sender<FetchOutcome>,
) {
    tokio::select! {
        biased;
        _ = &mut disconnect => {
            let _ = done.send(FetchOutcome::Disconnected);
        }
        _ = sim.sleep(duration) => {
            let _ = done.send(FetchOutcome::Served);
        }
    }
}
