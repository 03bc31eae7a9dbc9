//! Observation discretizers.
//!
//! A discretizer maps a continuous observation onto a tuple of bin indices so
//! a tabular learner can index its Q-table. The trainer sizes its table from
//! [`Discretizer::shape`] before the first episode.

use serde::{Deserialize, Serialize};

/// Maps observations to per-dimension bin indices.
pub trait Discretizer: Send + Sync {
    /// Bin count per dimension, if known.
    fn shape(&self) -> Option<&[usize]>;

    /// Bin indices for `obs`, each clamped to `[0, shape[i] - 1]`.
    fn discretize(&self, obs: &[f64]) -> Vec<usize>;
}

/// Range and resolution of one observation dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    pub low: f64,
    pub high: f64,
    pub bins: usize,
}

impl BinSpec {
    pub fn new(low: f64, high: f64, bins: usize) -> Self {
        Self { low, high, bins }
    }
}

/// Evenly spaced bin edges per dimension.
///
/// Dimension `i` uses `bins_i` edges from `low_i` to `high_i` inclusive. An
/// observation maps to the index of the last edge not above it, so values
/// below the first edge and above the last one land in the outermost bins.
#[derive(Debug, Clone)]
pub struct UniformBinDiscretizer {
    edges: Vec<Vec<f64>>,
    shape: Vec<usize>,
}

impl UniformBinDiscretizer {
    pub fn new(specs: &[BinSpec]) -> Self {
        let edges = specs
            .iter()
            .map(|spec| linspace(spec.low, spec.high, spec.bins))
            .collect();
        let shape = specs.iter().map(|spec| spec.bins).collect();
        Self { edges, shape }
    }

    /// Same bin count for every dimension.
    pub fn uniform(ranges: &[(f64, f64)], bins: usize) -> Self {
        let specs: Vec<BinSpec> = ranges
            .iter()
            .map(|&(low, high)| BinSpec::new(low, high, bins))
            .collect();
        Self::new(&specs)
    }

    pub fn edges(&self, dimension: usize) -> Option<&[f64]> {
        self.edges.get(dimension).map(Vec::as_slice)
    }
}

impl Discretizer for UniformBinDiscretizer {
    fn shape(&self) -> Option<&[usize]> {
        Some(&self.shape)
    }

    fn discretize(&self, obs: &[f64]) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, edges)| {
                let last = edges.len().saturating_sub(1);
                match obs.get(i) {
                    // NaN orders after every edge.
                    Some(x) if x.is_nan() => last,
                    Some(&x) => edges
                        .partition_point(|&edge| edge <= x)
                        .saturating_sub(1)
                        .min(last),
                    None => 0,
                }
            })
            .collect()
    }
}

/// `n` evenly spaced points from `low` to `high` inclusive.
fn linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let step = (high - low) / (n - 1) as f64;
            (0..n).map(|i| low + step * i as f64).collect()
        }
    }
}
