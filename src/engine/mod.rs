// src/engine/mod.rs

//! Scheduler / executor coordination.
//!
//! This module ties together:
//! - the message protocol between the scheduler and the executors
//! - the scheduler event loop that drives the DAG toward completion
//! - the lifecycle controller that builds the cluster, injects scripted
//!   failure and autoscale events, and aggregates metrics
//!
//! Pure scheduling decisions (executor pick, runnable-task pick) live in
//! [`logic`]; the stateful event loop is implemented in [`scheduler`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::dag::{ExecutorId, StageId, Tid};
use crate::exec::Executor;

/// Cluster membership map, shared between the scheduler (sole writer) and
/// executor task bodies (readers, for remote liveness checks).
///
/// Executor ids are minted monotonically and never reused, so `BTreeMap`
/// iteration order is insertion order and the first-fit executor pick is
/// stable across runs.
pub type Cluster = Rc<RefCell<BTreeMap<ExecutorId, Rc<Executor>>>>;

pub type SchedulerTx = mpsc::UnboundedSender<SchedulerEvent>;
pub type SchedulerRx = mpsc::UnboundedReceiver<SchedulerEvent>;
pub type ExecutorTx = mpsc::UnboundedSender<ExecutorEvent>;
pub type ExecutorRx = mpsc::UnboundedReceiver<ExecutorEvent>;

/// Terminal state a launch attempt reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Killed,
}

/// A launch attempt reached a terminal state on its executor.
#[derive(Debug, Clone, Copy)]
pub struct StatusUpdate {
    pub tid: Tid,
    pub status: TerminalStatus,
    pub eid: ExecutorId,
}

/// Downstream launch `tid` could not read the shuffle output of parent
/// stage `dep` from executor `eid`'s vantage point.
#[derive(Debug, Clone, Copy)]
pub struct FetchFailed {
    pub tid: Tid,
    pub dep: StageId,
    pub eid: ExecutorId,
}

/// Dispatch of one task partition onto one executor.
#[derive(Debug, Clone, Copy)]
pub struct LaunchTask {
    pub tid: Tid,
    pub eid: ExecutorId,
    pub stage: StageId,
    pub index: usize,
}

/// Messages accepted on the scheduler inbox.
#[derive(Debug)]
pub enum SchedulerEvent {
    ExecutorRegistered(Rc<Executor>),
    ExecutorKilled { eid: ExecutorId },
    StatusUpdate(StatusUpdate),
    FetchFailed(FetchFailed),
}

/// Messages accepted on an executor inbox. `StatusUpdate` / `FetchFailed`
/// are self-posted by the executor's own sub-processes and forwarded to the
/// scheduler after bookkeeping.
#[derive(Debug)]
pub enum ExecutorEvent {
    Launch(LaunchTask),
    StatusUpdate(StatusUpdate),
    FetchFailed(FetchFailed),
    KillTask { tid: Tid },
}

/// Cause raised into a suspended sub-process at its next suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The launch attempt itself is being killed.
    Killed,
    /// The executor serving a shuffle fetch died.
    Disconnect,
}

pub mod controller;
pub mod logic;
pub mod scheduler;

pub use controller::{ClusterSpec, FailureSpec, Report, run_simulation};
pub use scheduler::Scheduler;
