// src/dag/loader.rs

//! JSON DAG loader.
//!
//! The input document is a top-level array of stage objects in topological
//! order; structural violations fail fast. Input/output data descriptors get
//! their per-partition byte splits precomputed from the run RNG, so a fixed
//! seed reproduces the same skew.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::debug;

use crate::dag::model::{
    Dag, DataSplits, Stage, StageStats, StageStatus, Task, TaskStatus,
};
use crate::dist::{self, DistributionSpec};
use crate::errors::{DagsimError, Result};

/// Raw stage object as it appears in the DAG document.
#[derive(Debug, Deserialize)]
pub struct StageSpec {
    pub id: usize,
    #[serde(default)]
    pub deps: Vec<usize>,
    #[serde(default)]
    pub status: Option<String>,
    pub partitions: usize,
    pub stats: StatsSpec,
    #[serde(default)]
    pub input: Option<DataDescSpec>,
    #[serde(default)]
    pub output: Option<DataDescSpec>,
}

#[derive(Debug, Deserialize)]
pub struct StatsSpec {
    pub avg: f64,
    #[serde(default)]
    pub shuffle: Option<ShuffleSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ShuffleSpec {
    pub avg: f64,
}

#[derive(Debug, Deserialize)]
pub struct DataDescSpec {
    pub size: SizeSpec,
    pub partitions: usize,
    pub distribution: DistributionSpec,
}

/// Byte size given either as a JSON integer or a human-readable string
/// such as `"64 MB"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Bytes(u64),
    Human(String),
}

impl SizeSpec {
    fn into_bytes(self) -> Result<u64> {
        match self {
            SizeSpec::Bytes(n) => Ok(n),
            SizeSpec::Human(s) => parse_size::parse_size(&s)
                .map_err(|e| DagsimError::InvalidDag(format!("invalid size {s:?}: {e}"))),
        }
    }
}

/// Load and validate a DAG document from disk.
pub fn load_from_path(path: impl AsRef<Path>, rng: &mut StdRng) -> Result<Dag> {
    let contents = fs::read_to_string(path.as_ref())?;
    let specs: Vec<StageSpec> = serde_json::from_str(&contents)?;
    build_dag(specs, rng)
}

/// Validate stage specs and materialize the DAG arena.
pub fn build_dag(specs: Vec<StageSpec>, rng: &mut StdRng) -> Result<Dag> {
    let mut stages = Vec::with_capacity(specs.len());

    for (position, spec) in specs.into_iter().enumerate() {
        if spec.id != position {
            return Err(DagsimError::InvalidDag(format!(
                "stage at position {position} has id {}",
                spec.id
            )));
        }
        if let Some(dep) = spec.deps.iter().find(|dep| **dep >= spec.id) {
            return Err(DagsimError::InvalidDag(format!(
                "stage {} depends on stage {dep}, which does not precede it",
                spec.id
            )));
        }
        if spec.partitions == 0 {
            return Err(DagsimError::InvalidDag(format!(
                "stage {} has 0 partitions",
                spec.id
            )));
        }
        if !spec.stats.avg.is_finite() || spec.stats.avg < 0.0 {
            return Err(DagsimError::InvalidDag(format!(
                "stage {} has invalid stats.avg {}",
                spec.id, spec.stats.avg
            )));
        }
        let shuffle_avg = match spec.stats.shuffle {
            Some(shuffle) => {
                if !shuffle.avg.is_finite() || shuffle.avg < 0.0 {
                    return Err(DagsimError::InvalidDag(format!(
                        "stage {} has invalid stats.shuffle.avg {}",
                        spec.id, shuffle.avg
                    )));
                }
                Some(shuffle.avg)
            }
            None => {
                if !spec.deps.is_empty() {
                    return Err(DagsimError::InvalidDag(format!(
                        "stage {} has dependencies but no stats.shuffle",
                        spec.id
                    )));
                }
                None
            }
        };

        let input = spec
            .input
            .map(|desc| build_splits(spec.id, "input", desc, rng))
            .transpose()?;
        let output = spec
            .output
            .map(|desc| build_splits(spec.id, "output", desc, rng))
            .transpose()?;

        let tasks = (0..spec.partitions)
            .map(|index| Task {
                index,
                status: TaskStatus::Pending,
                current: None,
                launched_tasks: HashMap::new(),
            })
            .collect();

        stages.push(Stage {
            id: spec.id,
            deps: spec.deps,
            status: StageStatus::Pending,
            partitions: spec.partitions,
            stats: StageStats {
                avg: spec.stats.avg,
                shuffle_avg,
            },
            input,
            output,
            tasks,
        });
    }

    Ok(Dag { stages })
}

fn build_splits(
    stage: usize,
    side: &str,
    desc: DataDescSpec,
    rng: &mut StdRng,
) -> Result<DataSplits> {
    if desc.partitions == 0 {
        return Err(DagsimError::InvalidDag(format!(
            "stage {stage} {side} has 0 partitions"
        )));
    }
    let size = desc.size.into_bytes()?;
    let weights = dist::weights(&desc.distribution, desc.partitions, rng)?;
    let splits: Vec<f64> = weights.iter().map(|w| w * size as f64).collect();
    debug!(
        target: "loader",
        "stage {stage} {side}: size={size} partitions={} splits={splits:?}",
        desc.partitions
    );
    Ok(DataSplits {
        size,
        partitions: desc.partitions,
        distribution: desc.distribution,
        splits,
    })
}
