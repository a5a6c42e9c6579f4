//! Common types used across the analysis engine

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cost type for path and flow computations
pub type Cost = f64;

/// Residual-capacity threshold below which an edge counts as saturated.
///
/// Also used by the reachability BFS and as the default tolerance of
/// [`saturated_edges`](crate::graph::flow::saturated_edges).
pub const FLOW_TOLERANCE: f64 = 1e-10;

/// Strategy for dividing flow among equal-cost branches at a vertex
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPlacement {
    /// Exact tier-DAG max flow; parallel equal-cost edges share in
    /// proportion to their remaining capacity
    #[default]
    Proportional,
    /// Strict ECMP: equal split across outgoing DAG arcs, bounded by the
    /// most restrictive branch
    EqualBalanced,
}

impl FromStr for FlowPlacement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "proportional" => Ok(Self::Proportional),
            "equal_balanced" => Ok(Self::EqualBalanced),
            other => Err(Error::invalid_config(format!(
                "invalid flow placement '{other}', expected 'proportional' or 'equal_balanced'"
            ))),
        }
    }
}

/// Edge selection strategy for shortest-path computations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSelect {
    /// Record every parallel edge tied at the minimum cost of an arc
    #[default]
    AllMinCost,
    /// Record a single minimum-cost edge per arc
    SingleMinCost,
}

/// Aggregation mode for group-to-group solver operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Union all matched source groups into one pseudo source and all
    /// matched sink groups into one pseudo sink
    #[default]
    Combine,
    /// Evaluate every (source label, sink label) pair independently
    Pairwise,
}

impl FromStr for FlowMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "combine" => Ok(Self::Combine),
            "pairwise" => Ok(Self::Pairwise),
            other => Err(Error::invalid_config(format!(
                "invalid mode '{other}', expected 'combine' or 'pairwise'"
            ))),
        }
    }
}

impl fmt::Display for FlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Combine => write!(f, "combine"),
            Self::Pairwise => write!(f, "pairwise"),
        }
    }
}
