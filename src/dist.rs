// src/dist.rs

//! Data-skew distributions.
//!
//! [`weights`] turns a distribution descriptor from the DAG document into a
//! vector of non-negative partition weights summing to 1. Draws come from
//! the run RNG, so a fixed `--seed` reproduces the same splits.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Normal, Pareto, Zipf};
use serde::Deserialize;

use crate::errors::{DagsimError, Result};

/// Distribution descriptor, discriminated by `kind` in the DAG document.
///
/// An unknown `kind` fails JSON deserialization, which the loader surfaces
/// as an invalid DAG file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DistributionSpec {
    Uniform,
    Zipf { alpha: f64 },
    Normal { loc: f64, scale: f64 },
    Pareto { alpha: f64 },
    Exponential { scale: f64 },
}

/// Draw an `n`-vector of non-negative weights summing to 1.
///
/// Negative samples (possible under `normal`) are clamped to zero before
/// normalizing; a degenerate all-zero draw falls back to uniform so the
/// result always sums to 1.
pub fn weights(spec: &DistributionSpec, n: usize, rng: &mut StdRng) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(DagsimError::InvalidDag(
            "distribution requested for 0 partitions".to_string(),
        ));
    }

    let mut w = match spec {
        DistributionSpec::Uniform => vec![1.0; n],
        DistributionSpec::Zipf { alpha } => {
            let dist = Zipf::new(n as u64, *alpha)
                .map_err(|e| DagsimError::InvalidDag(format!("zipf(alpha={alpha}): {e}")))?;
            (0..n).map(|_| dist.sample(rng)).collect()
        }
        DistributionSpec::Normal { loc, scale } => {
            let dist = Normal::new(*loc, *scale).map_err(|e| {
                DagsimError::InvalidDag(format!("normal(loc={loc}, scale={scale}): {e}"))
            })?;
            (0..n).map(|_| dist.sample(rng)).collect()
        }
        DistributionSpec::Pareto { alpha } => {
            let dist = Pareto::new(1.0, *alpha)
                .map_err(|e| DagsimError::InvalidDag(format!("pareto(alpha={alpha}): {e}")))?;
            (0..n).map(|_| dist.sample(rng)).collect()
        }
        DistributionSpec::Exponential { scale } => {
            if *scale <= 0.0 {
                return Err(DagsimError::InvalidDag(format!(
                    "exponential scale must be positive, got {scale}"
                )));
            }
            let dist = Exp::new(1.0 / *scale)
                .map_err(|e| DagsimError::InvalidDag(format!("exponential(scale={scale}): {e}")))?;
            (0..n).map(|_| dist.sample(rng)).collect()
        }
    };

    for x in &mut w {
        if !x.is_finite() || *x < 0.0 {
            *x = 0.0;
        }
    }
    let sum: f64 = w.iter().sum();
    if sum <= 0.0 {
        w = vec![1.0; n];
    }
    let sum: f64 = w.iter().sum();
    for x in &mut w {
        *x /= sum;
    }
    Ok(w)
}
