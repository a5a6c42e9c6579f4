//! Shortest-path-first (Dijkstra) and K-shortest-paths
//!
//! [`spf`] produces a cost map plus an equal-cost predecessor DAG; the flow
//! engine calls [`spf_filtered`] with a residual-capacity filter so the same
//! routine drives both plain path queries and augmentation. [`ksp`] yields
//! successive shortest alternatives Yen-style, bounded by count and by
//! absolute/relative cost ceilings.
//!
//! Time complexity of one SPF run: O((V + E) log V) using a binary heap.

use super::{EdgeData, EdgeKey, NodeId, StrictMultiDigraph};
use crate::types::{Cost, EdgeSelect};
use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Parallel edge keys recorded on one predecessor arc
pub type ArcKeys = SmallVec<[EdgeKey; 2]>;

/// Equal-cost predecessor DAG: node -> list of (predecessor, keys on that arc)
pub type PredecessorMap = HashMap<NodeId, Vec<(NodeId, ArcKeys)>>;

/// Result of a shortest-path-first run
#[derive(Debug, Clone, Default)]
pub struct SpfResult {
    /// Shortest cost from the start node; absent means unreachable
    pub costs: HashMap<NodeId, Cost>,
    /// Predecessor DAG over equal-cost shortest paths
    pub pred: PredecessorMap,
}

/// Run Dijkstra from `src` over every edge of the graph.
///
/// Ties on node cost extend the predecessor entry when `multipath` is set;
/// otherwise the first-found predecessor wins. With
/// [`EdgeSelect::AllMinCost`], parallel arcs tied at an arc's minimum cost
/// are all recorded on the predecessor entry.
pub fn spf(
    graph: &StrictMultiDigraph,
    src: NodeId,
    edge_select: EdgeSelect,
    multipath: bool,
) -> SpfResult {
    spf_filtered(graph, src, edge_select, multipath, |_, _| true)
}

/// Run Dijkstra from `src`, considering only edges accepted by `usable`.
///
/// Self-loops are always skipped. Edge costs are assumed non-negative
/// (validated at model construction).
pub fn spf_filtered(
    graph: &StrictMultiDigraph,
    src: NodeId,
    edge_select: EdgeSelect,
    multipath: bool,
    usable: impl Fn(EdgeKey, &EdgeData) -> bool,
) -> SpfResult {
    let mut costs: HashMap<NodeId, Cost> = HashMap::new();
    let mut pred: PredecessorMap = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<Cost>, NodeId)>> = BinaryHeap::new();

    costs.insert(src, 0.0);
    pred.insert(src, Vec::new());
    heap.push(Reverse((OrderedFloat(0.0), src)));

    while let Some(Reverse((OrderedFloat(cost), node))) = heap.pop() {
        // Skip stale heap entries
        if costs.get(&node).is_some_and(|&best| cost > best) {
            continue;
        }

        // Group usable out-edges into arcs keyed by target, keeping the
        // minimum arc cost and the key(s) achieving it.
        let mut arcs: HashMap<NodeId, (Cost, ArcKeys)> = HashMap::new();
        for (key, target, data) in graph.out_edges(node) {
            if target == node {
                continue; // self-loop
            }
            if !usable(key, data) {
                continue;
            }
            debug_assert!(data.cost >= 0.0, "negative edge cost in SPF");
            match arcs.get_mut(&target) {
                None => {
                    arcs.insert(target, (data.cost, SmallVec::from_elem(key, 1)));
                }
                Some((best, keys)) => {
                    if data.cost < *best {
                        *best = data.cost;
                        keys.clear();
                        keys.push(key);
                    } else if data.cost == *best && edge_select == EdgeSelect::AllMinCost {
                        keys.push(key);
                    }
                }
            }
        }

        for (target, (arc_cost, keys)) in arcs {
            let candidate = cost + arc_cost;
            match costs.get(&target).copied() {
                Some(best) if candidate > best => {}
                Some(best) if candidate == best => {
                    if multipath {
                        pred.entry(target).or_default().push((node, keys));
                    }
                }
                _ => {
                    costs.insert(target, candidate);
                    pred.insert(target, vec![(node, keys)]);
                    heap.push(Reverse((OrderedFloat(candidate), target)));
                }
            }
        }
    }

    SpfResult { costs, pred }
}

/// Bounds for a K-shortest-paths run
#[derive(Debug, Clone)]
pub struct KspOptions {
    /// Maximum number of alternatives to produce
    pub max_k: usize,
    /// Absolute path-cost ceiling
    pub max_path_cost: Cost,
    /// Relative ceiling: multiplier over the first path's cost
    pub max_path_cost_factor: Option<f64>,
    /// Edge selection strategy for each underlying SPF run
    pub edge_select: EdgeSelect,
    /// Record equal-cost alternatives inside each SPF run
    pub multipath: bool,
}

impl Default for KspOptions {
    fn default() -> Self {
        Self {
            max_k: 3,
            max_path_cost: f64::INFINITY,
            max_path_cost_factor: None,
            edge_select: EdgeSelect::AllMinCost,
            multipath: true,
        }
    }
}

/// One accepted path at the arc level, used internally and by the KSP
/// result construction. Element `i` carries the keys of the arc toward
/// element `i + 1`; the last element has no keys.
type ArcPath = Vec<(NodeId, ArcKeys)>;

/// Yield successive shortest path alternatives from `src` to `dst`.
///
/// Entry 0 is the full multipath SPF result. Later entries are produced by
/// Yen-style spur scans and each describes a single alternative path (its
/// predecessor map is restricted to that path's arcs). Results are bounded
/// by `max_k` and by the configured cost ceilings; an unreachable sink
/// yields an empty vec.
pub fn ksp(
    graph: &StrictMultiDigraph,
    src: NodeId,
    dst: NodeId,
    opts: &KspOptions,
) -> Vec<SpfResult> {
    if src == dst || opts.max_k == 0 {
        return Vec::new();
    }

    let first = spf(graph, src, opts.edge_select, opts.multipath);
    let Some(&first_cost) = first.costs.get(&dst) else {
        return Vec::new();
    };

    let mut ceiling = opts.max_path_cost;
    if let Some(factor) = opts.max_path_cost_factor {
        ceiling = ceiling.min(first_cost * factor);
    }
    if first_cost > ceiling {
        return Vec::new();
    }

    let Some(first_path) = first_arc_path(&first.pred, src, dst) else {
        return Vec::new();
    };

    let mut results = vec![first.clone()];
    let mut accepted: Vec<ArcPath> = vec![first_path];
    let mut seen: HashSet<Vec<NodeId>> = accepted.iter().map(|p| node_seq(p)).collect();
    let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();

    while results.len() < opts.max_k {
        let prev = accepted
            .last()
            .expect("accepted paths are never empty here");

        for spur_idx in 0..prev.len() - 1 {
            let spur_node = prev[spur_idx].0;
            let root = &prev[..spur_idx];
            let root_cost: Cost = root
                .iter()
                .map(|(_, keys)| arc_cost(graph, keys))
                .sum();

            // Arcs leaving the spur along any accepted path sharing this
            // root are excluded, as are all root nodes before the spur.
            let mut removed_edges: HashSet<EdgeKey> = HashSet::new();
            for path in &accepted {
                if path.len() > spur_idx && prefix_matches(path, prev, spur_idx) {
                    removed_edges.extend(path[spur_idx].1.iter().copied());
                }
            }
            let removed_nodes: HashSet<NodeId> = root.iter().map(|(n, _)| *n).collect();

            let spur = spf_filtered(graph, spur_node, opts.edge_select, opts.multipath, |k, _| {
                if removed_edges.contains(&k) {
                    return false;
                }
                let (a, b) = graph
                    .endpoints(k)
                    .expect("edge key yielded by out_edges is valid");
                !removed_nodes.contains(&a) && !removed_nodes.contains(&b)
            });

            let Some(&spur_cost) = spur.costs.get(&dst) else {
                continue;
            };
            let total = root_cost + spur_cost;
            if total > ceiling {
                continue;
            }
            let Some(spur_path) = first_arc_path(&spur.pred, spur_node, dst) else {
                continue;
            };

            let mut candidate_path: ArcPath = root.to_vec();
            candidate_path.extend(spur_path);
            let seq = node_seq(&candidate_path);
            if seen.contains(&seq) {
                continue;
            }
            candidates.push(Reverse(Candidate {
                cost: OrderedFloat(total),
                seq,
                path: candidate_path,
            }));
        }

        let next = loop {
            match candidates.pop() {
                Some(Reverse(c)) if seen.contains(&c.seq) => continue,
                other => break other.map(|Reverse(c)| c),
            }
        };
        let Some(next) = next else { break };

        seen.insert(next.seq);
        results.push(arc_path_to_spf(graph, &next.path));
        accepted.push(next.path);
    }

    results
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    cost: OrderedFloat<Cost>,
    seq: Vec<NodeId>,
    path: ArcPath,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cost
            .cmp(&other.cost)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn node_seq(path: &[(NodeId, ArcKeys)]) -> Vec<NodeId> {
    path.iter().map(|(n, _)| *n).collect()
}

fn prefix_matches(path: &ArcPath, reference: &ArcPath, len: usize) -> bool {
    path.len() > len
        && reference.len() > len
        && path[..len]
            .iter()
            .zip(&reference[..len])
            .all(|(a, b)| a.0 == b.0)
        && path[len].0 == reference[len].0
}

fn arc_cost(graph: &StrictMultiDigraph, keys: &ArcKeys) -> Cost {
    keys.first()
        .and_then(|&k| graph.edge(k))
        .map_or(0.0, |d| d.cost)
}

/// Walk the predecessor DAG backwards from `dst`, always taking the first
/// predecessor entry, producing one concrete arc path.
fn first_arc_path(pred: &PredecessorMap, src: NodeId, dst: NodeId) -> Option<ArcPath> {
    let mut rev: Vec<(NodeId, ArcKeys)> = vec![(dst, ArcKeys::new())];
    let mut current = dst;
    let mut guard: HashSet<NodeId> = HashSet::from([dst]);
    while current != src {
        let (prev, keys) = pred.get(&current)?.first()?;
        if !guard.insert(*prev) {
            return None; // zero-cost cycle in the DAG
        }
        rev.push((*prev, keys.clone()));
        current = *prev;
    }
    rev.reverse();
    Some(rev)
}

/// Express a concrete arc path as an [`SpfResult`] restricted to it
fn arc_path_to_spf(graph: &StrictMultiDigraph, path: &ArcPath) -> SpfResult {
    let mut costs = HashMap::new();
    let mut pred: PredecessorMap = HashMap::new();
    let mut running = 0.0;
    costs.insert(path[0].0, 0.0);
    pred.insert(path[0].0, Vec::new());
    for window in path.windows(2) {
        let (node, keys) = &window[0];
        let (next, _) = &window[1];
        running += arc_cost(graph, keys);
        costs.insert(*next, running);
        pred.insert(*next, vec![(*node, keys.clone())]);
    }
    SpfResult { costs, pred }
}
