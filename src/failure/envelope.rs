//! Result artifacts of a Monte Carlo campaign

use crate::types::FlowMode;
use serde::{Deserialize, Serialize};

/// Statistical envelope of per-trial capacity samples for one
/// (source label, sink label) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityEnvelope {
    /// Selection expression the source groups came from
    pub source_pattern: String,
    /// Selection expression the sink groups came from
    pub sink_pattern: String,
    /// Aggregation mode of the underlying flow calls
    pub mode: FlowMode,
    /// Raw per-trial flow values, ordered by iteration index
    pub values: Vec<f64>,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub stdev: f64,
}

impl CapacityEnvelope {
    /// Build an envelope from raw samples, computing the aggregates
    pub fn from_values(
        source_pattern: impl Into<String>,
        sink_pattern: impl Into<String>,
        mode: FlowMode,
        values: Vec<f64>,
    ) -> Self {
        let (min, max, mean, stdev) = if values.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance =
                values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
            (min, max, mean, variance.sqrt())
        };
        Self {
            source_pattern: source_pattern.into(),
            sink_pattern: sink_pattern.into(),
            mode,
            values,
            min,
            max,
            mean,
            stdev,
        }
    }

    /// Number of samples in the envelope
    pub fn sample_count(&self) -> usize {
        self.values.len()
    }
}

/// The exclusion sets of one Monte Carlo iteration, recorded when
/// `store_failure_patterns` is requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    /// Iteration index the pattern belongs to
    pub iteration: usize,
    /// Sorted names of excluded nodes
    pub excluded_nodes: Vec<String>,
    /// Sorted ids of excluded links
    pub excluded_links: Vec<String>,
}

/// Summary of a Monte Carlo run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Iterations requested (after trivial-policy clamping)
    pub iterations: usize,
    /// Iterations that produced a result (cancellation skips the rest)
    pub completed: usize,
    /// Worker parallelism used
    pub parallelism: usize,
    /// Whether iteration 0 ran without failures
    pub baseline: bool,
    /// Policy the run resolved, when named
    pub policy_name: Option<String>,
    /// Master seed, when fixed
    pub seed: Option<u64>,
}
