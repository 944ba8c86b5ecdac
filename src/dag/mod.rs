// src/dag/mod.rs

//! Job DAG representation.
//!
//! - [`model`] holds the stage/task/launch-attempt entities the scheduler
//!   and executors mutate during a run.
//! - [`loader`] parses and validates the JSON DAG document and precomputes
//!   per-stage input/output split vectors.

pub mod loader;
pub mod model;

pub use loader::load_from_path;
pub use model::{
    Dag, DataSplits, ExecutorId, LaunchRecord, LaunchStatus, SharedDag, Stage, StageId, StageStats,
    StageStatus, Task, TaskStatus, Tid,
};
