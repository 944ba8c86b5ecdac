// src/lib.rs

pub mod cli;
pub mod dag;
pub mod dist;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sim;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::cli::CliArgs;
use crate::engine::{ClusterSpec, Report, run_simulation};
use crate::errors::Result;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - RNG seeding
/// - DAG loading (with split precomputation)
/// - cluster construction, scripted events, and the simulation run
pub fn run(args: CliArgs) -> Result<Report> {
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(target: "main", "seed = {seed}");
    let mut rng = StdRng::seed_from_u64(seed);

    let dag = dag::load_from_path(&args.file, &mut rng)?;
    info!(target: "main", "loaded DAG with {} stages from {}", dag.stages.len(), args.file);

    let spec = ClusterSpec {
        executors: args.executors,
        cores: args.cores,
        failures: args.scripted_failures.clone(),
        autoscale: args.scripted_autoscale.clone(),
        auto_replace: args.auto_replace,
        replace_delay: args.replace_delay,
    };

    let report = run_simulation(dag, &spec);
    info!(target: "main", "simulation completed");
    Ok(report)
}
