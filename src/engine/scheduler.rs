// src/engine/scheduler.rs

//! The single coordinator.
//!
//! Owns the global launch registry, the cluster membership, and the event
//! loop that drives the DAG to completion. Each iteration sweeps
//! `schedule_runnable_tasks` until it stalls, then suspends on the inbox.
//!
//! Terminal messages are deduplicated solely by the `task.current != tid`
//! check: once a launch stops being authoritative (executor death, stage
//! reset), any update it still manages to deliver is logged and discarded.
//! This relies on the scheduler's mutations and message arrivals never
//! interleaving within one event, which the single-threaded kernel
//! guarantees.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{info, warn};

use crate::dag::{
    ExecutorId, LaunchRecord, LaunchStatus, SharedDag, StageId, StageStatus, TaskStatus, Tid,
};
use crate::engine::logic;
use crate::engine::{
    Cluster, ExecutorEvent, FetchFailed, LaunchTask, SchedulerEvent, SchedulerRx, StatusUpdate,
    TerminalStatus,
};
use crate::exec::Executor;
use crate::sim::Sim;

/// Coordinates of a launch in the scheduler's registry.
#[derive(Debug, Clone, Copy)]
struct ScheduledRef {
    stage: StageId,
    index: usize,
    eid: ExecutorId,
}

pub struct Scheduler {
    sim: Sim,
    dag: SharedDag,
    cluster: Cluster,
    scheduled: HashMap<Tid, ScheduledRef>,
    next_tid: Tid,
    /// Virtual time at which every stage completed, for the final report.
    completed_at: Rc<Cell<Option<f64>>>,
}

impl Scheduler {
    pub fn new(
        sim: Sim,
        dag: SharedDag,
        cluster: Cluster,
        completed_at: Rc<Cell<Option<f64>>>,
    ) -> Self {
        Self {
            sim,
            dag,
            cluster,
            scheduled: HashMap::new(),
            next_tid: 0,
            completed_at,
        }
    }

    /// Main loop: sweep, then suspend on the inbox. Exits when the job is
    /// complete or the inbox closes.
    pub async fn run(mut self, mut inbox: SchedulerRx) {
        loop {
            self.schedule_runnable_tasks();
            if self.dag.borrow().all_completed() {
                let now = self.sim.now().as_secs_f64();
                info!(target: "scheduler", "all stages completed, runtime {now:.2}s");
                self.completed_at.set(Some(now));
                break;
            }
            let Some(event) = inbox.recv().await else {
                break;
            };
            info!(target: "scheduler", "{event:?}");
            match event {
                SchedulerEvent::ExecutorRegistered(executor) => self.register_executor(executor),
                SchedulerEvent::ExecutorKilled { eid } => self.executor_killed(eid),
                SchedulerEvent::StatusUpdate(update) => self.status_update(update),
                SchedulerEvent::FetchFailed(failure) => self.fetch_failed(failure),
            }
        }
    }

    /// Dispatch tasks while a free executor and a runnable task both exist.
    /// First-fit on both sides keeps dispatch stable and starvation-free.
    fn schedule_runnable_tasks(&mut self) {
        loop {
            let executor = {
                let cluster = self.cluster.borrow();
                match logic::next_available_executor(&cluster) {
                    Some(executor) => executor,
                    None => break,
                }
            };
            let slot = {
                let dag = self.dag.borrow();
                logic::next_runnable_task(&dag)
            };
            let Some((stage_id, index)) = slot else { break };

            let tid = self.next_tid;
            self.next_tid += 1;
            {
                let mut dag = self.dag.borrow_mut();
                let stage = &mut dag.stages[stage_id];
                stage.status = StageStatus::Running;
                let task = &mut stage.tasks[index];
                task.status = TaskStatus::Running;
                task.current = Some(tid);
                task.launched_tasks.insert(
                    tid,
                    LaunchRecord {
                        tid,
                        eid: executor.id,
                        status: LaunchStatus::Running,
                    },
                );
            }
            self.scheduled.insert(
                tid,
                ScheduledRef {
                    stage: stage_id,
                    index,
                    eid: executor.id,
                },
            );
            info!(
                target: "scheduler",
                "launch tid={tid} stage={stage_id} partition={index} on executor {}",
                executor.id
            );
            executor.send(ExecutorEvent::Launch(LaunchTask {
                tid,
                eid: executor.id,
                stage: stage_id,
                index,
            }));
            executor.reserve();
        }
    }

    fn register_executor(&mut self, executor: Rc<Executor>) {
        self.cluster.borrow_mut().insert(executor.id, executor);
    }

    /// Externally-triggered executor death: every launch the dead executor
    /// still tracked loses its slot in the registry and its task reverts to
    /// `killed`. Map output it produced stays recorded but ceases to be
    /// fetchable once the executor leaves the membership map.
    fn executor_killed(&mut self, eid: ExecutorId) {
        let executor = { self.cluster.borrow().get(&eid).cloned() };
        let Some(executor) = executor else {
            warn!(target: "scheduler", "stale ExecutorKilled eid={eid}");
            return;
        };
        for tid in executor.running_tids() {
            if let Some(launch) = self.scheduled.remove(&tid) {
                let mut dag = self.dag.borrow_mut();
                let task = &mut dag.stages[launch.stage].tasks[launch.index];
                task.status = TaskStatus::Killed;
                task.current = None;
                if let Some(record) = task.launched_tasks.get_mut(&tid) {
                    record.status = LaunchStatus::Killed;
                }
            }
        }
        executor.record_killed(self.sim.now().as_secs_f64());
        self.cluster.borrow_mut().remove(&eid);
    }

    fn status_update(&mut self, update: StatusUpdate) {
        let Some(launch) = self.scheduled.remove(&update.tid) else {
            warn!(target: "scheduler", "stale {update:?}");
            return;
        };
        let is_current = {
            let dag = self.dag.borrow();
            dag.stages[launch.stage].tasks[launch.index].current == Some(update.tid)
        };
        if !is_current {
            warn!(target: "scheduler", "stale {update:?}");
            return;
        }

        let avg = match update.status {
            TerminalStatus::Completed => {
                let mut dag = self.dag.borrow_mut();
                let stage = &mut dag.stages[launch.stage];
                let avg = stage.stats.avg;
                let task = &mut stage.tasks[launch.index];
                task.status = TaskStatus::Completed;
                if let Some(record) = task.launched_tasks.get_mut(&update.tid) {
                    record.status = LaunchStatus::Completed;
                }
                if stage.all_tasks_completed() {
                    stage.status = StageStatus::Completed;
                    info!(target: "scheduler", "stage {} completed", launch.stage);
                }
                Some(avg)
            }
            TerminalStatus::Killed => {
                let mut dag = self.dag.borrow_mut();
                let task = &mut dag.stages[launch.stage].tasks[launch.index];
                task.status = TaskStatus::Killed;
                task.current = None;
                if let Some(record) = task.launched_tasks.get_mut(&update.tid) {
                    record.status = LaunchStatus::Killed;
                }
                None
            }
        };

        if let Some(executor) = self.cluster.borrow().get(&launch.eid) {
            executor.release();
            if let Some(avg) = avg {
                executor.add_computed(avg);
            }
        }
    }

    /// A downstream task observed that parent map output is unreachable.
    ///
    /// The current stage is reset in full: its partial state may depend on a
    /// consistent parent snapshot. The parent stage flips to `failed` and
    /// only the partitions whose authoritative executor left the membership
    /// map are reset; output on live executors stays fetchable and is not
    /// recomputed.
    fn fetch_failed(&mut self, failure: FetchFailed) {
        let Some(launch) = self.scheduled.remove(&failure.tid) else {
            warn!(target: "scheduler", "stale {failure:?}");
            return;
        };
        let alive: HashSet<ExecutorId> = self.cluster.borrow().keys().copied().collect();
        {
            let mut dag = self.dag.borrow_mut();

            let current_stage = &mut dag.stages[launch.stage];
            current_stage.status = StageStatus::Pending;
            for task in &mut current_stage.tasks {
                task.status = TaskStatus::Pending;
                task.current = None;
            }

            let parent_stage = &mut dag.stages[failure.dep];
            parent_stage.status = StageStatus::Failed;
            for task in &mut parent_stage.tasks {
                let Some(current) = task.current else {
                    // Already reset by an earlier failure.
                    continue;
                };
                let lost = task
                    .launched_tasks
                    .get(&current)
                    .is_none_or(|record| !alive.contains(&record.eid));
                if lost {
                    task.status = TaskStatus::Pending;
                    task.current = None;
                }
            }
            info!(
                target: "scheduler",
                "fetch failure: reset stage {} and lost partitions of parent {}",
                launch.stage,
                failure.dep
            );
        }
        if let Some(executor) = self.cluster.borrow().get(&launch.eid) {
            executor.release();
        }
    }
}
