// src/dag/model.rs

//! Stage / task / launch-attempt entities.
//!
//! The DAG is an arena: a vector of stages indexed by stage id, with tasks
//! stored inline in their stage. Launch attempts live by value in a per-task
//! map keyed by `tid`, and everything above refers to them through
//! `(stage, index, tid)` coordinates rather than pointers, so no reference
//! ever crosses an event boundary.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::dist::DistributionSpec;

pub type StageId = usize;
pub type Tid = u64;
pub type ExecutorId = u64;

/// DAG shared between the scheduler and executor task bodies. Everything
/// runs on one cooperative kernel, so a plain `RefCell` suffices as long as
/// no borrow is held across a suspension point.
pub type SharedDag = Rc<RefCell<Dag>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStatus {
    Running,
    Completed,
    Killed,
}

/// Per-stage runtime statistics.
#[derive(Debug, Clone)]
pub struct StageStats {
    /// Average task-body duration in seconds.
    pub avg: f64,
    /// Average shuffle-read duration per remote fetch, for stages with
    /// dependencies.
    pub shuffle_avg: Option<f64>,
}

/// Input or output data distribution of a stage, with its precomputed
/// per-partition byte splits. Carried for accounting only.
#[derive(Debug, Clone)]
pub struct DataSplits {
    pub size: u64,
    pub partitions: usize,
    pub distribution: DistributionSpec,
    pub splits: Vec<f64>,
}

/// One bulk-parallel step of the job.
#[derive(Debug)]
pub struct Stage {
    pub id: StageId,
    /// Parent stage ids; all strictly less than `id` (topological input).
    pub deps: Vec<StageId>,
    pub status: StageStatus,
    pub partitions: usize,
    pub stats: StageStats,
    pub input: Option<DataSplits>,
    pub output: Option<DataSplits>,
    pub tasks: Vec<Task>,
}

/// One partition of a stage; the unit of scheduling.
#[derive(Debug)]
pub struct Task {
    pub index: usize,
    pub status: TaskStatus,
    /// The currently authoritative launch attempt, if any.
    pub current: Option<Tid>,
    /// Every launch attempt this task has ever had, kept for audit.
    pub launched_tasks: HashMap<Tid, LaunchRecord>,
}

/// A single attempt to run a task on an executor. `tid` and `eid` never
/// change once minted; only `status` moves.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub tid: Tid,
    pub eid: ExecutorId,
    pub status: LaunchStatus,
}

#[derive(Debug)]
pub struct Dag {
    pub stages: Vec<Stage>,
}

impl Dag {
    pub fn all_completed(&self) -> bool {
        self.stages
            .iter()
            .all(|stage| stage.status == StageStatus::Completed)
    }
}

impl Stage {
    pub fn all_tasks_completed(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Completed)
    }
}

impl Task {
    /// Executor id of the authoritative launch, if the task has one.
    pub fn authoritative_eid(&self) -> Option<ExecutorId> {
        let current = self.current?;
        self.launched_tasks.get(&current).map(|launch| launch.eid)
    }
}
