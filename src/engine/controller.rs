// src/engine/controller.rs

//! Lifecycle driver.
//!
//! Builds the cluster at `t = 0`, wires the scheduler, injects scripted
//! failure and autoscale events as their own simulation processes, runs the
//! kernel to quiescence, and aggregates the final report. The controller
//! keeps a roster of every executor ever commissioned so the utilization
//! denominator covers dead ones too.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::dag::{Dag, ExecutorId, SharedDag};
use crate::engine::{Cluster, Scheduler, SchedulerEvent, SchedulerTx};
use crate::exec::Executor;
use crate::sim::Sim;

/// Final report printed as a JSON object on stdout.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Report {
    pub utilization: f64,
    pub runtime: f64,
}

/// A scripted executor failure: kill `eid` at virtual time `at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureSpec {
    pub eid: ExecutorId,
    pub at: f64,
}

impl FromStr for FailureSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (eid, at) = s
            .split_once(',')
            .ok_or_else(|| format!("expected EID,T, got {s:?}"))?;
        let eid = eid
            .trim()
            .parse::<ExecutorId>()
            .map_err(|e| format!("invalid executor id {eid:?}: {e}"))?;
        let at = at
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid failure time {at:?}: {e}"))?;
        if !at.is_finite() || at < 0.0 {
            return Err(format!("failure time must be non-negative, got {at}"));
        }
        Ok(Self { eid, at })
    }
}

/// Cluster configuration for one simulation run.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub executors: usize,
    pub cores: usize,
    pub failures: Vec<FailureSpec>,
    pub autoscale: Vec<f64>,
    pub auto_replace: bool,
    pub replace_delay: f64,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            executors: 1,
            cores: 1,
            failures: Vec::new(),
            autoscale: Vec::new(),
            auto_replace: false,
            replace_delay: 1.0,
        }
    }
}

/// Shared handles the commissioning helper needs; cloned into each scripted
/// lifecycle process.
#[derive(Clone)]
struct Lifecycle {
    sim: Sim,
    dag: SharedDag,
    cluster: Cluster,
    scheduler_tx: SchedulerTx,
    roster: Rc<RefCell<Vec<Rc<Executor>>>>,
    cores: usize,
}

impl Lifecycle {
    /// Bring up a new executor under the next free id and announce it to the
    /// scheduler. Ids are never reused, dead or alive.
    fn commission(&self) -> Rc<Executor> {
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
        info!(target: "controller", "commissioned executor {id} with {} cores", self.cores);
        executor
    }
}

/// Run one job to completion (or to cluster quiescence) and report.
pub fn run_simulation(dag: Dag, spec: &ClusterSpec) -> Report {
    let sim = Sim::new();
    let dag: SharedDag = Rc::new(RefCell::new(dag));
    let cluster: Cluster = Rc::new(RefCell::new(BTreeMap::new()));
    let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();
    let completed_at = Rc::new(Cell::new(None));

    let lifecycle = Lifecycle {
        sim: sim.clone(),
        dag: Rc::clone(&dag),
        cluster: Rc::clone(&cluster),
        scheduler_tx,
        roster: Rc::new(RefCell::new(Vec::new())),
        cores: spec.cores,
    };

    info!(target: "controller", "starting {} executors", spec.executors);
    for _ in 0..spec.executors {
        lifecycle.commission();
    }

    info!(target: "controller", "starting scheduler");
    let scheduler = Scheduler::new(
        sim.clone(),
        Rc::clone(&dag),
        Rc::clone(&cluster),
        Rc::clone(&completed_at),
    );
    sim.spawn(scheduler.run(scheduler_rx));

    for failure in &spec.failures {
        let failure = *failure;
        let lifecycle = lifecycle.clone();
        let auto_replace = spec.auto_replace;
        let replace_delay = spec.replace_delay;
        sim.spawn(async move {
            lifecycle
                .sim
                .sleep(Duration::from_secs_f64(failure.at))
                .await;
            let target = { lifecycle.cluster.borrow().get(&failure.eid).cloned() };
            let Some(executor) = target else {
                info!(
                    target: "controller",
                    "executor {} already gone at scripted failure time", failure.eid
                );
                return;
            };
            info!(target: "controller", "killing executor {}", failure.eid);
            executor.kill();
            let _ = lifecycle
                .scheduler_tx
                .send(SchedulerEvent::ExecutorKilled { eid: failure.eid });
            if auto_replace {
                lifecycle
                    .sim
                    .sleep(Duration::from_secs_f64(replace_delay))
                    .await;
                lifecycle.commission();
            }
        });
    }

    for &at in &spec.autoscale {
        let lifecycle = lifecycle.clone();
        sim.spawn(async move {
            lifecycle.sim.sleep(Duration::from_secs_f64(at)).await;
            lifecycle.commission();
        });
    }

    sim.run();

    let runtime = completed_at
        .get()
        .unwrap_or_else(|| sim.now().as_secs_f64());
    let mut computed = 0.0;
    let mut capacity = 0.0;
    for executor in lifecycle.roster.borrow().iter() {
        let end = executor.killed_at().unwrap_or(runtime).min(runtime);
        let alive = (end - executor.commissioned_at()).max(0.0);
        capacity += alive * executor.cores as f64;
        computed += executor.computed();
    }
    let utilization = if capacity > 0.0 {
        computed / capacity
    } else {
        0.0
    };

    // The membership map and the executors reference each other through Rc;
    // clearing it lets the whole cluster drop with the roster.
    cluster.borrow_mut().clear();

    Report {
        utilization,
        runtime,
    }
}
