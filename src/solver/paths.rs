//! Group-to-group shortest-path operations
//!
//! Selection semantics mirror the max-flow wrappers. For path queries an
//! overlapping source/sink membership is treated as unreachable: the cost
//! is infinite and the path list empty.

use super::resolve_group_pairs;
use crate::graph::spf::{ksp, spf, KspOptions};
use crate::graph::{resolve_to_paths, Path, StrictMultiDigraph};
use crate::model::AnalysisContext;
use crate::types::{Cost, EdgeSelect, FlowMode};
use crate::Result;
use indexmap::IndexMap;

/// Options for [`k_shortest_paths`]
#[derive(Debug, Clone)]
pub struct KspSolverOptions {
    /// Aggregation mode; pairwise is the norm for KSP reports
    pub mode: FlowMode,
    /// Maximum number of paths per pair
    pub max_k: usize,
    /// Absolute path-cost ceiling
    pub max_path_cost: Cost,
    /// Relative ceiling over the best path's cost
    pub max_path_cost_factor: Option<f64>,
    /// Edge selection strategy
    pub edge_select: EdgeSelect,
    /// Expand parallel-edge bundles into distinct paths
    pub split_parallel_edges: bool,
}

impl Default for KspSolverOptions {
    fn default() -> Self {
        Self {
            mode: FlowMode::Pairwise,
            max_k: 3,
            max_path_cost: f64::INFINITY,
            max_path_cost_factor: None,
            edge_select: EdgeSelect::AllMinCost,
            split_parallel_edges: false,
        }
    }
}

fn active_names<C: AnalysisContext>(ctx: &C, names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|n| ctx.is_node_active(n))
        .cloned()
        .collect()
}

fn overlapping(sources: &[String], sinks: &[String]) -> bool {
    sources.iter().any(|name| sinks.contains(name))
}

/// Minimal path cost between selected groups; `inf` when unreachable,
/// overlapping, or emptied by filtering.
pub fn shortest_path_costs<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    mode: FlowMode,
) -> Result<IndexMap<(String, String), Cost>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, mode)?;
    let graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let sources = active_names(ctx, &pair.sources);
        let sinks = active_names(ctx, &pair.sinks);
        let mut best = f64::INFINITY;
        if !sources.is_empty() && !sinks.is_empty() && !overlapping(&sources, &sinks) {
            for source in &sources {
                let Some(s) = graph.node_id(source) else {
                    continue;
                };
                let run = spf(&graph, s, EdgeSelect::AllMinCost, true);
                for sink in &sinks {
                    if let Some(&cost) = graph.node_id(sink).and_then(|t| run.costs.get(&t)) {
                        best = best.min(cost);
                    }
                }
            }
        }
        results.insert((pair.src_label, pair.snk_label), best);
    }
    Ok(results)
}

/// Concrete shortest path(s) between selected groups, sorted and
/// deduplicated. Unreachable pairs get an empty list.
pub fn shortest_paths<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    mode: FlowMode,
    split_parallel_edges: bool,
) -> Result<IndexMap<(String, String), Vec<Path>>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, mode)?;
    let graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let sources = active_names(ctx, &pair.sources);
        let sinks = active_names(ctx, &pair.sinks);
        let paths = if sources.is_empty() || sinks.is_empty() || overlapping(&sources, &sinks) {
            Vec::new()
        } else {
            best_paths_for_groups(&graph, &sources, &sinks, split_parallel_edges)
        };
        results.insert((pair.src_label, pair.snk_label), paths);
    }
    Ok(results)
}

fn best_paths_for_groups(
    graph: &StrictMultiDigraph,
    sources: &[String],
    sinks: &[String],
    split_parallel_edges: bool,
) -> Vec<Path> {
    let mut best_cost = f64::INFINITY;
    let mut best_paths: Vec<Path> = Vec::new();

    for source in sources {
        let Some(s) = graph.node_id(source) else {
            continue;
        };
        let run = spf(graph, s, EdgeSelect::AllMinCost, true);
        for sink in sinks {
            let Some(t) = graph.node_id(sink) else {
                continue;
            };
            let Some(&cost) = run.costs.get(&t) else {
                continue;
            };
            if cost < best_cost {
                best_cost = cost;
                best_paths = resolve_to_paths(graph, &run.pred, s, t, split_parallel_edges)
                    .into_iter()
                    .map(|elements| Path::new(elements, cost))
                    .collect();
            } else if cost == best_cost {
                best_paths.extend(
                    resolve_to_paths(graph, &run.pred, s, t, split_parallel_edges)
                        .into_iter()
                        .map(|elements| Path::new(elements, cost)),
                );
            }
        }
    }

    best_paths.sort();
    best_paths.dedup();
    best_paths
}

/// Up to K shortest paths per group pair, bounded by the configured cost
/// ceilings
pub fn k_shortest_paths<C: AnalysisContext>(
    ctx: &C,
    source_path: &str,
    sink_path: &str,
    opts: &KspSolverOptions,
) -> Result<IndexMap<(String, String), Vec<Path>>> {
    let pairs = resolve_group_pairs(ctx, source_path, sink_path, opts.mode)?;
    let graph = ctx.build_working_graph(true, true);

    let mut results = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let sources = active_names(ctx, &pair.sources);
        let sinks = active_names(ctx, &pair.sinks);
        let paths = if sources.is_empty() || sinks.is_empty() || overlapping(&sources, &sinks) {
            Vec::new()
        } else {
            ksp_for_groups(&graph, &sources, &sinks, opts)
        };
        results.insert((pair.src_label, pair.snk_label), paths);
    }
    Ok(results)
}

fn ksp_for_groups(
    graph: &StrictMultiDigraph,
    sources: &[String],
    sinks: &[String],
    opts: &KspSolverOptions,
) -> Vec<Path> {
    // Seed the thresholds from the best (source, sink) pairing
    let mut best: Option<(f64, _, _)> = None;
    for source in sources {
        let Some(s) = graph.node_id(source) else {
            continue;
        };
        let run = spf(graph, s, opts.edge_select, true);
        for sink in sinks {
            let Some(t) = graph.node_id(sink) else {
                continue;
            };
            if let Some(&cost) = run.costs.get(&t) {
                if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
                    best = Some((cost, s, t));
                }
            }
        }
    }
    let Some((_, s, t)) = best else {
        return Vec::new();
    };

    let ksp_opts = KspOptions {
        max_k: opts.max_k,
        max_path_cost: opts.max_path_cost,
        max_path_cost_factor: opts.max_path_cost_factor,
        edge_select: opts.edge_select,
        multipath: true,
    };

    let mut paths: Vec<Path> = Vec::new();
    for alternative in ksp(graph, s, t, &ksp_opts) {
        let Some(&cost) = alternative.costs.get(&t) else {
            continue;
        };
        for elements in
            resolve_to_paths(graph, &alternative.pred, s, t, opts.split_parallel_edges)
        {
            paths.push(Path::new(elements, cost));
            if paths.len() >= opts.max_k {
                break;
            }
        }
        if paths.len() >= opts.max_k {
            break;
        }
    }

    paths.sort();
    paths.dedup();
    paths.truncate(opts.max_k);
    paths
}
