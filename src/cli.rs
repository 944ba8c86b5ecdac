// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{ArgAction, Parser, ValueEnum};

use crate::engine::FailureSpec;

/// Command-line arguments for `dagsim`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagsim",
    version,
    about = "Discrete-event simulator of a Spark-like DAG execution engine.",
    long_about = None
)]
pub struct CliArgs {
    /// Number of executors at t=0.
    #[arg(short = 'e', long = "executors", value_name = "N", default_value_t = 1)]
    pub executors: usize,

    /// Cores per executor.
    #[arg(short = 'c', long = "cores", value_name = "N", default_value_t = 1)]
    pub cores: usize,

    /// Path to the DAG file (JSON).
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: String,

    /// Scripted executor failure as `EID,T` (repeatable).
    #[arg(long = "sf", value_name = "EID,T", value_parser = parse_failure)]
    pub scripted_failures: Vec<FailureSpec>,

    /// Scripted autoscale time (repeatable).
    #[arg(long = "sa", value_name = "T")]
    pub scripted_autoscale: Vec<f64>,

    /// Commission a replacement executor after a scripted failure.
    #[arg(
        short = 'a',
        long = "auto-replace",
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value_t = false
    )]
    pub auto_replace: bool,

    /// Delay in seconds before a replacement executor comes up.
    #[arg(short = 'd', long = "replace-delay", value_name = "N", default_value_t = 1.0)]
    pub replace_delay: f64,

    /// RNG seed; drawn from entropy (and logged) when omitted.
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGSIM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_failure(s: &str) -> Result<FailureSpec, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
