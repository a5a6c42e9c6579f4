//! Solver wrappers: selection -> working graph -> engine
//!
//! These operations bind node-group selection to the path and flow
//! engines. Each accepts a source and sink selection expression plus an
//! aggregation [`FlowMode`]:
//!
//! - `Combine` unions all matched source groups into one pseudo source and
//!   all matched sink groups into one pseudo sink; the result map has one
//!   entry keyed by the `"|"`-joined sorted group labels.
//! - `Pairwise` runs an independent computation per (source label, sink
//!   label) pair.
//!
//! A node appearing in both the source and sink set of a pair yields zero
//! flow (or an empty path list) without running the engine; an empty
//! visible selection yields the same. An expression matching nothing at
//! all is an error.

pub mod maxflow;
pub mod paths;

pub use maxflow::{
    max_flow, max_flow_with_details, saturated_edges, sensitivity_analysis, FlowOptions,
};
pub use paths::{k_shortest_paths, shortest_path_costs, shortest_paths, KspSolverOptions};

use crate::graph::{NodeId, StrictMultiDigraph};
use crate::model::AnalysisContext;
use crate::types::FlowMode;
use crate::{Error, Result};

/// Name of the pseudo source node attached to selected source groups
pub(crate) const PSEUDO_SOURCE: &str = "__source__";
/// Name of the pseudo sink node attached to selected sink groups
pub(crate) const PSEUDO_SINK: &str = "__sink__";

/// One (source group, sink group) computation unit
#[derive(Debug, Clone)]
pub(crate) struct GroupPair {
    pub src_label: String,
    pub snk_label: String,
    pub sources: Vec<String>,
    pub sinks: Vec<String>,
}

impl GroupPair {
    /// Whether any node sits in both the source and sink set
    pub fn overlaps(&self) -> bool {
        self.sources.iter().any(|name| self.sinks.contains(name))
    }
}

/// Resolve the selection expressions into computation units per the mode.
///
/// Fails when either expression matches no group at all.
pub(crate) fn resolve_group_pairs<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    mode: FlowMode,
) -> Result<Vec<GroupPair>> {
    let src_groups = ctx.select_groups(source_path)?;
    let snk_groups = ctx.select_groups(sink_path)?;

    if src_groups.is_empty() {
        return Err(Error::invalid_selector(format!(
            "no source nodes found matching '{source_path}'"
        )));
    }
    if snk_groups.is_empty() {
        return Err(Error::invalid_selector(format!(
            "no sink nodes found matching '{sink_path}'"
        )));
    }

    match mode {
        FlowMode::Combine => {
            let mut src_labels: Vec<&String> = src_groups.keys().collect();
            let mut snk_labels: Vec<&String> = snk_groups.keys().collect();
            src_labels.sort();
            snk_labels.sort();
            Ok(vec![GroupPair {
                src_label: src_labels
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
                snk_label: snk_labels
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
                sources: src_groups.values().flatten().cloned().collect(),
                sinks: snk_groups.values().flatten().cloned().collect(),
            }])
        }
        FlowMode::Pairwise => {
            let mut pairs = Vec::with_capacity(src_groups.len() * snk_groups.len());
            for (src_label, sources) in &src_groups {
                for (snk_label, sinks) in &snk_groups {
                    pairs.push(GroupPair {
                        src_label: src_label.clone(),
                        snk_label: snk_label.clone(),
                        sources: sources.clone(),
                        sinks: sinks.clone(),
                    });
                }
            }
            Ok(pairs)
        }
    }
}

/// Attach pseudo source/sink nodes to a working graph, wiring them to the
/// given (already filtered) node names with infinite-capacity zero-cost
/// edges.
pub(crate) fn attach_pseudo(
    graph: &mut StrictMultiDigraph,
    sources: &[String],
    sinks: &[String],
) -> (NodeId, NodeId) {
    let s = graph.add_node(PSEUDO_SOURCE);
    let t = graph.add_node(PSEUDO_SINK);
    for name in sources {
        if let Some(node) = graph.node_id(name) {
            graph.add_edge(s, node, f64::INFINITY, 0.0, None);
        }
    }
    for name in sinks {
        if let Some(node) = graph.node_id(name) {
            graph.add_edge(node, t, f64::INFINITY, 0.0, None);
        }
    }
    (s, t)
}

/// Whether a node name is one of the pseudo endpoints
pub(crate) fn is_pseudo(name: &str) -> bool {
    name == PSEUDO_SOURCE || name == PSEUDO_SINK
}

/// Convenience methods over anything that implements [`AnalysisContext`],
/// so `net.max_flow(...)` and `view.max_flow(...)` both read naturally.
pub trait SolverOps: AnalysisContext + Sized {
    /// Max flow per group pair; see [`maxflow::max_flow`]
    fn max_flow(
        &self,
        source_path: &str,
        sink_path: &str,
        opts: &FlowOptions,
    ) -> Result<indexmap::IndexMap<(String, String), f64>> {
        maxflow::max_flow(self, source_path, sink_path, opts)
    }

    /// Max flow plus a [`crate::graph::FlowSummary`] per group pair
    fn max_flow_with_details(
        &self,
        source_path: &str,
        sink_path: &str,
        opts: &FlowOptions,
    ) -> Result<indexmap::IndexMap<(String, String), (f64, crate::graph::FlowSummary)>> {
        maxflow::max_flow_with_details(self, source_path, sink_path, opts)
    }

    /// Saturated edges per group pair
    fn saturated_edges(
        &self,
        source_path: &str,
        sink_path: &str,
        tolerance: f64,
        opts: &FlowOptions,
    ) -> Result<indexmap::IndexMap<(String, String), Vec<crate::graph::EdgeId>>> {
        maxflow::saturated_edges(self, source_path, sink_path, tolerance, opts)
    }

    /// Capacity sensitivity of saturated edges per group pair
    fn sensitivity_analysis(
        &self,
        source_path: &str,
        sink_path: &str,
        change_amount: f64,
        opts: &FlowOptions,
    ) -> Result<indexmap::IndexMap<(String, String), std::collections::BTreeMap<crate::graph::EdgeId, f64>>>
    {
        maxflow::sensitivity_analysis(self, source_path, sink_path, change_amount, opts)
    }

    /// Minimal path cost per group pair (`inf` when unreachable)
    fn shortest_path_costs(
        &self,
        source_path: &str,
        sink_path: &str,
        mode: FlowMode,
    ) -> Result<indexmap::IndexMap<(String, String), f64>> {
        paths::shortest_path_costs(self, source_path, sink_path, mode)
    }

    /// Concrete shortest paths per group pair
    fn shortest_paths(
        &self,
        source_path: &str,
        sink_path: &str,
        mode: FlowMode,
        split_parallel_edges: bool,
    ) -> Result<indexmap::IndexMap<(String, String), Vec<crate::graph::Path>>> {
        paths::shortest_paths(self, source_path, sink_path, mode, split_parallel_edges)
    }

    /// Up to K shortest paths per group pair
    fn k_shortest_paths(
        &self,
        source_path: &str,
        sink_path: &str,
        opts: &KspSolverOptions,
    ) -> Result<indexmap::IndexMap<(String, String), Vec<crate::graph::Path>>> {
        paths::k_shortest_paths(self, source_path, sink_path, opts)
    }
}

impl<T: AnalysisContext + Sized> SolverOps for T {}
