//! Group-to-group max-flow operations
//!
//! Each call builds a working graph from the context (reverse edges added,
//! compact keys), attaches pseudo source/sink endpoints to the selected
//! groups, and hands the graph to the flow engine. The context is never
//! mutated. Pseudo edges are stripped from every surface returned to
//! callers.

use super::{attach_pseudo, is_pseudo, resolve_group_pairs, GroupPair};
use crate::graph::flow::{self, FlowSummary, MaxFlowOptions};
use crate::graph::{EdgeId, StrictMultiDigraph};
use crate::model::AnalysisContext;
use crate::types::{FlowMode, FlowPlacement};
use crate::Result;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Options shared by the flow-oriented solver operations
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowOptions {
    /// Aggregation mode
    pub mode: FlowMode,
    /// Saturate only the first cost tier
    pub shortest_path: bool,
    /// Strategy for splitting flow among equal-cost branches
    pub flow_placement: FlowPlacement,
}

impl FlowOptions {
    fn engine(&self) -> MaxFlowOptions {
        MaxFlowOptions {
            placement: self.flow_placement,
            shortest_path: self.shortest_path,
        }
    }
}

/// Filter active (visible, enabled) members of a pair's selections
fn active_members<C: AnalysisContext>(ctx: &C, pair: &GroupPair) -> (Vec<String>, Vec<String>) {
    let keep = |names: &[String]| {
        names
            .iter()
            .filter(|n| ctx.is_node_active(n))
            .cloned()
            .collect::<Vec<_>>()
    };
    (keep(&pair.sources), keep(&pair.sinks))
}

/// Compute maximum flow between selected groups.
///
/// Returns total flow per `(source_label, sink_label)`. Overlapping or
/// empty selections yield zero flow for that pair; a selection expression
/// matching nothing at all is an error.
pub fn max_flow<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    opts: &FlowOptions,
) -> Result<IndexMap<(String, String), f64>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, opts.mode)?;
    let base_graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let value = solve_pair(ctx, &base_graph, &pair, opts)?.map_or(0.0, |s| s.total_flow);
        results.insert((pair.src_label, pair.snk_label), value);
    }
    Ok(results)
}

/// Compute maximum flow and return the full [`FlowSummary`] per pair.
///
/// The summary covers per-edge flow, residual capacity, the residual
/// reachable set, the min cut, and the cost distribution of placed flow.
pub fn max_flow_with_details<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    opts: &FlowOptions,
) -> Result<IndexMap<(String, String), (f64, FlowSummary)>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, opts.mode)?;
    let base_graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let summary = solve_pair(ctx, &base_graph, &pair, opts)?
            .map(strip_pseudo_surfaces)
            .unwrap_or_default();
        results.insert((pair.src_label, pair.snk_label), (summary.total_flow, summary));
    }
    Ok(results)
}

/// Identify saturated edges per pair after a full max-flow run
pub fn saturated_edges<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    tolerance: f64,
    opts: &FlowOptions,
) -> Result<IndexMap<(String, String), Vec<EdgeId>>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, opts.mode)?;
    let base_graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let (sources, sinks) = active_members(ctx, &pair);
        let saturated = if sources.is_empty() || sinks.is_empty() || pair.overlaps() {
            Vec::new()
        } else {
            let mut graph = base_graph.clone();
            let (s, t) = attach_pseudo(&mut graph, &sources, &sinks);
            flow::saturated_edges(&graph, s, t, tolerance, &opts.engine())?
                .into_iter()
                .filter(|e| !is_pseudo(&e.src) && !is_pseudo(&e.dst))
                .collect()
        };
        results.insert((pair.src_label, pair.snk_label), saturated);
    }
    Ok(results)
}

/// Per-saturated-edge capacity sensitivity per pair.
///
/// For each saturated edge of the baseline solution, the edge capacity is
/// perturbed by `change_amount` (clamped at zero from below), the flow is
/// recomputed with identical options, and the difference in total flow is
/// reported.
pub fn sensitivity_analysis<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    change_amount: f64,
    opts: &FlowOptions,
) -> Result<IndexMap<(String, String), BTreeMap<EdgeId, f64>>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, opts.mode)?;
    let base_graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let (sources, sinks) = active_members(ctx, &pair);
        let deltas = if sources.is_empty() || sinks.is_empty() || pair.overlaps() {
            BTreeMap::new()
        } else {
            let mut graph = base_graph.clone();
            let (s, t) = attach_pseudo(&mut graph, &sources, &sinks);
            flow::run_sensitivity(&graph, s, t, change_amount, &opts.engine())?
                .into_iter()
                .filter(|(e, _)| !is_pseudo(&e.src) && !is_pseudo(&e.dst))
                .collect()
        };
        results.insert((pair.src_label, pair.snk_label), deltas);
    }
    Ok(results)
}

/// Run the engine for one pair, or return `None` for the in-band zero
/// cases (overlap, empty visible selection)
fn solve_pair<C: AnalysisContext>(
    ctx: &C,
    base_graph: &StrictMultiDigraph,
    pair: &GroupPair,
    opts: &FlowOptions,
) -> Result<Option<FlowSummary>> {
    let (sources, sinks) = active_members(ctx, pair);
    if sources.is_empty() || sinks.is_empty() || pair.overlaps() {
        return Ok(None);
    }
    let mut graph = base_graph.clone();
    let (s, t) = attach_pseudo(&mut graph, &sources, &sinks);
    flow::calc_max_flow(&mut graph, s, t, &opts.engine()).map(Some)
}

/// Remove pseudo endpoints from every caller-facing surface
fn strip_pseudo_surfaces(mut summary: FlowSummary) -> FlowSummary {
    summary
        .edge_flow
        .retain(|e, _| !is_pseudo(&e.src) && !is_pseudo(&e.dst));
    summary
        .residual_cap
        .retain(|e, _| !is_pseudo(&e.src) && !is_pseudo(&e.dst));
    summary.min_cut.retain(|e| !is_pseudo(&e.src) && !is_pseudo(&e.dst));
    summary.reachable.retain(|n| !is_pseudo(n));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, Network, NetworkView, Node};
    use approx::assert_abs_diff_eq;
    use ordered_float::OrderedFloat;
    use serde_json::json;

    fn linear() -> Network {
        let mut net = Network::new();
        for name in ["A", "B", "C"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("A", "B", 10.0, 1.0)).unwrap();
        net.add_link(Link::new("B", "C", 3.0, 1.0)).unwrap();
        net
    }

    fn diamond() -> Network {
        let mut net = Network::new();
        for name in ["A", "B", "C", "D"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("A", "B", 3.0, 1.0)).unwrap();
        net.add_link(Link::new("B", "D", 3.0, 1.0)).unwrap();
        net.add_link(Link::new("A", "C", 3.0, 2.0)).unwrap();
        net.add_link(Link::new("C", "D", 3.0, 2.0)).unwrap();
        net
    }

    #[test]
    fn test_linear_bottleneck_flow() {
        let net = linear();
        let flows = max_flow(&net, "^A$", "^C$", &FlowOptions::default()).unwrap();
        let value = flows[&("^A$".to_string(), "^C$".to_string())];
        assert_abs_diff_eq!(value, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_min_cut_surfaced_without_pseudo_edges() {
        let net = linear();
        let details =
            max_flow_with_details(&net, "^A$", "^C$", &FlowOptions::default()).unwrap();
        let (value, summary) = &details[&("^A$".to_string(), "^C$".to_string())];
        assert_abs_diff_eq!(*value, 3.0, epsilon = 1e-9);
        assert_eq!(summary.min_cut.len(), 1);
        assert_eq!(summary.min_cut[0].src, "B");
        assert_eq!(summary.min_cut[0].dst, "C");
        assert!(summary.edge_flow.keys().all(|e| !is_pseudo(&e.src) && !is_pseudo(&e.dst)));
        assert!(summary.reachable.iter().all(|n| !is_pseudo(n)));
    }

    #[test]
    fn test_cost_distribution_two_tiers() {
        let net = diamond();
        let details =
            max_flow_with_details(&net, "^A$", "^D$", &FlowOptions::default()).unwrap();
        let (value, summary) = &details[&("^A$".to_string(), "^D$".to_string())];
        assert_abs_diff_eq!(*value, 6.0, epsilon = 1e-9);
        assert_eq!(summary.cost_distribution.len(), 2);
        assert_abs_diff_eq!(summary.cost_distribution[&OrderedFloat(2.0)], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.cost_distribution[&OrderedFloat(4.0)], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cost_distribution_parallel_paths_same_cost() {
        // S -> A -> T (cap 1) and S -> B -> T (cap 2), all links cost 1:
        // everything lands in the single cost-2 bucket
        let mut net = Network::new();
        for name in ["S", "A", "B", "T"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("S", "A", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("A", "T", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("S", "B", 2.0, 1.0)).unwrap();
        net.add_link(Link::new("B", "T", 2.0, 1.0)).unwrap();

        let details =
            max_flow_with_details(&net, "^S$", "^T$", &FlowOptions::default()).unwrap();
        let (value, summary) = &details[&("^S$".to_string(), "^T$".to_string())];
        assert_abs_diff_eq!(*value, 3.0, epsilon = 1e-9);
        assert_eq!(summary.cost_distribution.len(), 1);
        assert_abs_diff_eq!(summary.cost_distribution[&OrderedFloat(2.0)], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cost_distribution_three_tiers() {
        // One unit path per tier at total costs 2, 4, and 6
        let mut net = Network::new();
        for name in ["S", "A", "B", "C", "T"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("S", "A", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("A", "T", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("S", "B", 1.0, 2.0)).unwrap();
        net.add_link(Link::new("B", "T", 1.0, 2.0)).unwrap();
        net.add_link(Link::new("S", "C", 1.0, 3.0)).unwrap();
        net.add_link(Link::new("C", "T", 1.0, 3.0)).unwrap();

        let details =
            max_flow_with_details(&net, "^S$", "^T$", &FlowOptions::default()).unwrap();
        let (value, summary) = &details[&("^S$".to_string(), "^T$".to_string())];
        assert_abs_diff_eq!(*value, 3.0, epsilon = 1e-9);
        assert_eq!(summary.cost_distribution.len(), 3);
        for cost in [2.0, 4.0, 6.0] {
            assert_abs_diff_eq!(
                summary.cost_distribution[&OrderedFloat(cost)],
                1.0,
                epsilon = 1e-9
            );
        }

        // Shortest-path mode keeps only the cheapest tier
        let opts = FlowOptions {
            shortest_path: true,
            ..Default::default()
        };
        let details = max_flow_with_details(&net, "^S$", "^T$", &opts).unwrap();
        let (value, summary) = &details[&("^S$".to_string(), "^T$".to_string())];
        assert_abs_diff_eq!(*value, 1.0, epsilon = 1e-9);
        assert_eq!(summary.cost_distribution.len(), 1);
        assert!(summary.cost_distribution.contains_key(&OrderedFloat(2.0)));
    }

    #[test]
    fn test_cost_distribution_supports_latency_analysis() {
        // Weighted average latency over the diamond: (2*3 + 4*3) / 6 = 3
        let net = diamond();
        let details =
            max_flow_with_details(&net, "^A$", "^D$", &FlowOptions::default()).unwrap();
        let (_, summary) = &details[&("^A$".to_string(), "^D$".to_string())];

        let total: f64 = summary.cost_distribution.values().sum();
        let weighted: f64 = summary
            .cost_distribution
            .iter()
            .map(|(cost, flow)| cost.into_inner() * flow)
            .sum::<f64>()
            / total;
        assert_abs_diff_eq!(weighted, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pairwise_capture_group_labels() {
        let mut net = Network::new();
        for name in ["S1", "S2", "M", "T1", "T2"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("S1", "M", 2.0, 1.0)).unwrap();
        net.add_link(Link::new("M", "T1", 2.0, 1.0)).unwrap();
        net.add_link(Link::new("S2", "M", 1.0, 2.0)).unwrap();
        net.add_link(Link::new("M", "T2", 1.0, 2.0)).unwrap();

        let opts = FlowOptions {
            mode: FlowMode::Pairwise,
            ..Default::default()
        };
        let flows = max_flow(&net, r"^(S\d)$", r"^(T\d)$", &opts).unwrap();
        assert_eq!(flows.len(), 4);
        assert_abs_diff_eq!(
            flows[&("S1".to_string(), "T1".to_string())],
            2.0,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            flows[&("S2".to_string(), "T2".to_string())],
            1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_combine_and_pairwise_agree_on_singletons() {
        let net = linear();
        let combine = max_flow(&net, "^A$", "^C$", &FlowOptions::default()).unwrap();
        let pairwise = max_flow(
            &net,
            "^A$",
            "^C$",
            &FlowOptions {
                mode: FlowMode::Pairwise,
                ..Default::default()
            },
        )
        .unwrap();
        let c = combine.values().next().unwrap();
        let p = pairwise.values().next().unwrap();
        assert_abs_diff_eq!(*c, *p, epsilon = 1e-12);
    }

    fn attrs_with(key: &str, value: serde_json::Value) -> crate::model::AttrMap {
        let mut attrs = crate::model::AttrMap::new();
        attrs.insert(key.to_string(), value);
        attrs
    }

    #[test]
    fn test_overlap_yields_zero_flow() {
        let mut net = Network::new();
        net.add_node(Node::new("X").with_attrs(attrs_with("role", json!("both"))))
            .unwrap();
        net.add_node(Node::new("Y").with_attrs(attrs_with("role", json!("both"))))
            .unwrap();
        net.add_link(Link::new("X", "Y", 5.0, 1.0)).unwrap();

        let flows = max_flow(&net, "attr:role", "attr:role", &FlowOptions::default()).unwrap();
        let value = flows[&("both".to_string(), "both".to_string())];
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_unmatched_selector_is_error() {
        let net = linear();
        assert!(max_flow(&net, "^Z$", "^C$", &FlowOptions::default()).is_err());
        assert!(max_flow(&net, "^A$", "^Z$", &FlowOptions::default()).is_err());
    }

    #[test]
    fn test_all_sources_disabled_yields_zero_not_error() {
        let mut net = linear();
        net.disable_node("A").unwrap();
        let flows = max_flow(&net, "^A$", "^C$", &FlowOptions::default()).unwrap();
        assert_eq!(flows[&("^A$".to_string(), "^C$".to_string())], 0.0);
    }

    #[test]
    fn test_unreachable_sink_zero_flow() {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        net.add_node(Node::new("B")).unwrap();
        net.add_node(Node::new("C")).unwrap();
        net.add_link(Link::new("A", "B", 5.0, 1.0)).unwrap();
        // C is isolated
        let flows = max_flow(&net, "^A$", "^C$", &FlowOptions::default()).unwrap();
        assert_eq!(flows[&("^A$".to_string(), "^C$".to_string())], 0.0);
    }

    #[test]
    fn test_repeated_calls_on_view_are_idempotent() {
        let net = linear();
        let view = NetworkView::new(&net);
        let first = max_flow(&view, "^A$", "^C$", &FlowOptions::default()).unwrap();
        let second = max_flow(&view, "^A$", "^C$", &FlowOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_view_matches_base_when_nothing_excluded() {
        let net = diamond();
        let view = NetworkView::new(&net);
        let on_base = max_flow(&net, "^A$", "^D$", &FlowOptions::default()).unwrap();
        let on_view = max_flow(&view, "^A$", "^D$", &FlowOptions::default()).unwrap();
        assert_eq!(on_base, on_view);
    }

    #[test]
    fn test_saturated_edges_and_sensitivity() {
        let net = linear();
        let opts = FlowOptions::default();
        let saturated = saturated_edges(&net, "^A$", "^C$", 1e-10, &opts).unwrap();
        let edges = &saturated[&("^A$".to_string(), "^C$".to_string())];
        assert!(edges.iter().any(|e| e.src == "B" && e.dst == "C"));

        let deltas = sensitivity_analysis(&net, "^A$", "^C$", 1.0, &opts).unwrap();
        let per_edge = &deltas[&("^A$".to_string(), "^C$".to_string())];
        let bottleneck = per_edge
            .iter()
            .find(|(e, _)| e.src == "B" && e.dst == "C")
            .map(|(_, d)| *d)
            .unwrap();
        assert_abs_diff_eq!(bottleneck, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_equal_balanced_parallel_links() {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        net.add_node(Node::new("B")).unwrap();
        net.add_link(Link::new("A", "B", 5.0, 1.0)).unwrap();
        net.add_link(Link::new("A", "B", 5.0, 1.0)).unwrap();

        let opts = FlowOptions {
            flow_placement: FlowPlacement::EqualBalanced,
            ..Default::default()
        };
        let flows = max_flow(&net, "^A$", "^B$", &opts).unwrap();
        assert_abs_diff_eq!(
            flows[&("^A$".to_string(), "^B$".to_string())],
            10.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_shortest_path_saturates_first_tier() {
        let mut net = Network::new();
        for name in ["S", "A", "B", "T"] {
            net.add_node(Node::new(name)).unwrap();
        }
        net.add_link(Link::new("S", "A", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("A", "T", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("S", "B", 1.0, 1.0)).unwrap();
        net.add_link(Link::new("B", "T", 1.0, 1.0)).unwrap();

        let opts = FlowOptions {
            shortest_path: true,
            ..Default::default()
        };
        let flows = max_flow(&net, "^S$", "^T$", &opts).unwrap();
        assert_abs_diff_eq!(
            flows[&("^S$".to_string(), "^T$".to_string())],
            2.0,
            epsilon = 1e-9
        );
    }

}
