//! Concrete paths materialized from predecessor DAGs

use super::spf::PredecessorMap;
use super::{NodeId, StrictMultiDigraph};
use crate::types::Cost;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// One hop of a concrete path: a node plus the edge key(s) toward the next
/// node. The final element carries no keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    /// Node name
    pub node: String,
    /// Edge keys of the arc toward the next element; several when a
    /// parallel-edge bundle was not split
    pub edges: Vec<usize>,
}

/// A concrete path with its total cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    /// Hop sequence from source to sink
    pub elements: Vec<PathElement>,
    /// Total path cost
    pub cost: Cost,
}

impl Path {
    /// Create a path from its hops and total cost
    pub fn new(elements: Vec<PathElement>, cost: Cost) -> Self {
        Self { elements, cost }
    }

    /// Node names along the path
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.node.as_str())
    }

    /// Number of hops (edges) in the path
    pub fn hop_count(&self) -> usize {
        self.elements.len().saturating_sub(1)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        OrderedFloat(self.cost) == OrderedFloat(other.cost) && self.elements == other.elements
    }
}

impl Eq for Path {}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.cost)
            .cmp(&OrderedFloat(other.cost))
            .then_with(|| self.elements.cmp(&other.elements))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.nodes().collect();
        write!(f, "{} (cost {})", names.join(" -> "), self.cost)
    }
}

/// Enumerate the concrete hop sequences ending at `dst` in a predecessor
/// DAG.
///
/// With `split_parallel_edges` every parallel-edge bundle expands into
/// distinct sequences (cartesian product across hops); otherwise each node
/// sequence appears once with its bundles intact. An unreachable `dst`
/// yields no sequences. The caller attaches the cost (see [`Path::new`]).
pub fn resolve_to_paths(
    graph: &StrictMultiDigraph,
    pred: &PredecessorMap,
    src: NodeId,
    dst: NodeId,
    split_parallel_edges: bool,
) -> Vec<Vec<PathElement>> {
    if !pred.contains_key(&dst) {
        return Vec::new();
    }

    let mut sequences: Vec<Vec<(NodeId, Vec<usize>)>> = Vec::new();
    let mut stack_guard: HashSet<NodeId> = HashSet::new();
    let mut suffix: Vec<(NodeId, Vec<usize>)> = vec![(dst, Vec::new())];
    walk(pred, src, dst, &mut stack_guard, &mut suffix, &mut sequences);

    if split_parallel_edges {
        let mut expanded = Vec::new();
        for seq in &sequences {
            expand_bundles(seq, 0, &mut Vec::new(), &mut expanded);
        }
        sequences = expanded;
    }

    sequences
        .into_iter()
        .map(|seq| {
            seq.into_iter()
                .map(|(n, keys)| PathElement {
                    node: graph.node_name(n).to_string(),
                    edges: keys,
                })
                .collect()
        })
        .collect()
}

/// Depth-first backward walk over the predecessor DAG. `suffix` holds the
/// partial sequence from the current node down to `dst`, in reverse path
/// order; completed sequences are emitted in forward order.
fn walk(
    pred: &PredecessorMap,
    src: NodeId,
    current: NodeId,
    guard: &mut HashSet<NodeId>,
    suffix: &mut Vec<(NodeId, Vec<usize>)>,
    out: &mut Vec<Vec<(NodeId, Vec<usize>)>>,
) {
    if current == src {
        let mut seq = suffix.clone();
        seq.reverse();
        out.push(seq);
        return;
    }
    let Some(entries) = pred.get(&current) else {
        return;
    };
    guard.insert(current);
    for (prev, keys) in entries {
        if guard.contains(prev) {
            continue; // zero-cost cycle in the DAG
        }
        suffix.push((*prev, keys.iter().map(|k| k.index()).collect()));
        walk(pred, src, *prev, guard, suffix, out);
        suffix.pop();
    }
    guard.remove(&current);
}

/// Cartesian expansion of parallel-edge bundles into single-key hops
fn expand_bundles(
    seq: &[(NodeId, Vec<usize>)],
    idx: usize,
    acc: &mut Vec<(NodeId, Vec<usize>)>,
    out: &mut Vec<Vec<(NodeId, Vec<usize>)>>,
) {
    if idx == seq.len() {
        out.push(acc.clone());
        return;
    }
    let (node, keys) = &seq[idx];
    if keys.is_empty() {
        acc.push((*node, Vec::new()));
        expand_bundles(seq, idx + 1, acc, out);
        acc.pop();
    } else {
        for &key in keys {
            acc.push((*node, vec![key]));
            expand_bundles(seq, idx + 1, acc, out);
            acc.pop();
        }
    }
}
