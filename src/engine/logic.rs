// src/engine/logic.rs

//! Pure scheduling decisions, factored out of the event loop so they can be
//! exercised without a kernel.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::dag::{Dag, ExecutorId, StageId, StageStatus, TaskStatus};
use crate::exec::Executor;

/// First executor with a free slot, in membership iteration order.
/// Ids are monotonic, so this is insertion order; no affinity, no locality.
pub fn next_available_executor(
    executors: &BTreeMap<ExecutorId, Rc<Executor>>,
) -> Option<Rc<Executor>> {
    executors
        .values()
        .find(|executor| executor.available_slots() > 0)
        .cloned()
}

/// First runnable task in topological stage order, then task index order.
///
/// A stage is eligible iff it is not completed and every parent stage is;
/// within an eligible stage, any task that is neither completed nor running
/// is runnable.
pub fn next_runnable_task(dag: &Dag) -> Option<(StageId, usize)> {
    for stage in &dag.stages {
        if stage.status == StageStatus::Completed {
            continue;
        }
        if !stage
            .deps
            .iter()
            .all(|dep| dag.stages[*dep].status == StageStatus::Completed)
        {
            continue;
        }
        for task in &stage.tasks {
            if !matches!(task.status, TaskStatus::Completed | TaskStatus::Running) {
                return Some((stage.id, task.index));
            }
        }
    }
    None
}
