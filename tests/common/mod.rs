#![allow(dead_code)]

//! Hand-rolled cluster wiring for tests that need to inject messages or
//! inspect executors mid-run, mirroring what the lifecycle controller does
//! in production.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;

use dagsim::dag::{Dag, ExecutorId, SharedDag};
use dagsim::engine::{Cluster, Scheduler, SchedulerEvent, SchedulerTx};
use dagsim::exec::Executor;
use dagsim::sim::Sim;

/// Shared handles; cloned into scripted test processes.
#[derive(Clone)]
pub struct TestCluster {
    pub sim: Sim,
    pub dag: SharedDag,
    pub cluster: Cluster,
    pub scheduler_tx: SchedulerTx,
    pub completed_at: Rc<Cell<Option<f64>>>,
    pub roster: Rc<RefCell<Vec<Rc<Executor>>>>,
    cores: usize,
}

impl TestCluster {
    /// Wire a scheduler plus `executors` executors of `cores` cores each and
    /// leave the kernel ready to run.
    pub fn start(dag: Dag, executors: usize, cores: usize) -> Self {
        let sim = Sim::new();
        let dag: SharedDag = Rc::new(RefCell::new(dag));
        let cluster: Cluster = Rc::new(RefCell::new(BTreeMap::new()));
        let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();
        let completed_at = Rc::new(Cell::new(None));

        let this = Self {
            sim: sim.clone(),
            dag: Rc::clone(&dag),
            cluster: Rc::clone(&cluster),
            scheduler_tx,
            completed_at: Rc::clone(&completed_at),
            roster: Rc::new(RefCell::new(Vec::new())),
            cores,
        };

        for _ in 0..executors {
            this.commission();
        }
        let scheduler = Scheduler::new(sim.clone(), dag, cluster, completed_at);
        sim.spawn(scheduler.run(scheduler_rx));
        this
    }

    pub fn commission(&self) -> Rc<Executor> {
        let id = self.roster.borrow().len() as ExecutorId;
        let (executor, inbox) = Executor::new(
            id,
            self.cores,
            self.sim.clone(),
            Rc::clone(&self.dag),
            Rc::clone(&self.cluster),
            self.scheduler_tx.clone(),
        );
        self.roster.borrow_mut().push(Rc::clone(&executor));
        self.sim.spawn(Rc::clone(&executor).run(inbox));
        let _ = self
            .scheduler_tx
            .send(SchedulerEvent::ExecutorRegistered(Rc::clone(&executor)));
        executor
    }

    /// Kill executor `eid` at virtual time `at`; optionally commission a
    /// replacement `replace_after` seconds later.
    pub fn schedule_failure(&self, eid: ExecutorId, at: f64, replace_after: Option<f64>) {
        let this = self.clone();
        self.sim.spawn(async move {
            this.sim.sleep(Duration::from_secs_f64(at)).await;
            let target = { this.cluster.borrow().get(&eid).cloned() };
            let Some(executor) = target else { return };
            executor.kill();
            let _ = this
                .scheduler_tx
                .send(SchedulerEvent::ExecutorKilled { eid });
            if let Some(delay) = replace_after {
                this.sim.sleep(Duration::from_secs_f64(delay)).await;
                this.commission();
            }
        });
    }

    pub fn schedule_autoscale(&self, at: f64) {
        let this = self.clone();
        self.sim.spawn(async move {
            this.sim.sleep(Duration::from_secs_f64(at)).await;
            this.commission();
        });
    }

    /// Run the kernel to quiescence and return the job completion time.
    pub fn run(&self) -> Option<f64> {
        self.sim.run();
        self.completed_at.get()
    }

    pub fn executor(&self, id: ExecutorId) -> Rc<Executor> {
        Rc::clone(&self.roster.borrow()[id as usize])
    }
}
