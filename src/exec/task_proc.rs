// src/exec/task_proc.rs

//! Body of a single launch attempt.
//!
//! A launch runs as its own simulation process: fetch every parent stage's
//! shuffle output, sleep the stage's average compute duration, then post a
//! terminal status to the owning executor's inbox. The executor forwards it
//! to the scheduler after removing the launch from its live map.
//!
//! Cancellation arrives on the per-launch interrupt channel. A `Killed`
//! interrupt surfaces as a synthesized killed status update, the same way a
//! remote disconnect mid-fetch surfaces as `FetchFailed`.

use std::rc::Rc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::dag::{StageId, StageStatus};
use crate::engine::{ExecutorEvent, FetchFailed, Interrupt, LaunchTask, StatusUpdate, TerminalStatus};
use crate::exec::executor::{Executor, FetchOutcome};

pub async fn run_launch(
    executor: Rc<Executor>,
    launch: LaunchTask,
    mut cancel: oneshot::Receiver<Interrupt>,
) {
    tokio::select! {
        biased;
        _ = &mut cancel => {
            executor.send(ExecutorEvent::StatusUpdate(StatusUpdate {
                tid: launch.tid,
                status: TerminalStatus::Killed,
                eid: executor.id,
            }));
        }
        _ = run_body(&executor, launch) => {}
    }
}

async fn run_body(executor: &Executor, launch: LaunchTask) {
    let tid = launch.tid;
    let deps = { executor.dag().borrow().stages[launch.stage].deps.clone() };

    for dep in deps {
        if !fetch_dep(executor, launch, dep).await {
            executor.send(ExecutorEvent::FetchFailed(FetchFailed {
                tid,
                dep,
                eid: executor.id,
            }));
            return;
        }
    }

    let avg = { executor.dag().borrow().stages[launch.stage].stats.avg };
    executor.sim().sleep(Duration::from_secs_f64(avg)).await;

    executor.send(ExecutorEvent::StatusUpdate(StatusUpdate {
        tid,
        status: TerminalStatus::Completed,
        eid: executor.id,
    }));
}

/// Read the map output of one parent stage. Returns false as soon as any
/// partition of it is unreachable: the stage is not completed, a partition
/// has no live authoritative launch, or the serving executor disconnects
/// mid-transfer.
async fn fetch_dep(executor: &Executor, launch: LaunchTask, dep: StageId) -> bool {
    let partitions = {
        let dag = executor.dag().borrow();
        if dag.stages[dep].status != StageStatus::Completed {
            return false;
        }
        dag.stages[dep].tasks.len()
    };

    for index in 0..partitions {
        let source = {
            let dag = executor.dag().borrow();
            dag.stages[dep].tasks[index].authoritative_eid()
        };
        let Some(source_eid) = source else {
            return false;
        };
        let remote = { executor.cluster().borrow().get(&source_eid).cloned() };
        let Some(remote) = remote else {
            return false;
        };
        if source_eid == executor.id {
            // Local fetch, no cost.
            continue;
        }
        debug!(
            target: "executor",
            "[{}] tid={} fetching stage {dep} partition {index} from executor {source_eid}",
            executor.id,
            launch.tid
        );
        match remote.fetch(launch.tid, launch.stage).await {
            Ok(FetchOutcome::Served) => {}
            Ok(FetchOutcome::Disconnected) | Err(_) => return false,
        }
    }
    true
}
