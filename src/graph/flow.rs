//! Cost-tiered max-flow engine
//!
//! [`calc_max_flow`] repeatedly (1) runs SPF over edges with spare capacity
//! to find the next minimum-cost augmenting DAG, (2) pushes flow across
//! that DAG under a [`FlowPlacement`] strategy, and (3) updates residuals,
//! until the sink becomes unreachable. Each round accounts its volume to
//! the cost distribution at the round's SPF cost, so paths of strictly
//! greater cost become eligible as cheaper tiers saturate.
//!
//! With `shortest_path=true` the engine still saturates the entire first
//! cost tier before returning; a single augmenting path would under-report
//! flow whenever multiple equal-cost paths exist.

use super::spf::{spf_filtered, SpfResult};
use super::{EdgeId, EdgeKey, NodeId, StrictMultiDigraph};
use crate::types::{Cost, EdgeSelect, FlowPlacement, FLOW_TOLERANCE};
use crate::{Error, Result};
use ordered_float::OrderedFloat;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Parameters of a max-flow run
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxFlowOptions {
    /// Strategy for dividing flow among equal-cost branches
    pub placement: FlowPlacement,
    /// Stop after the first cost tier is saturated
    pub shortest_path: bool,
}

/// Summary of a max-flow computation
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowSummary {
    /// Maximum flow value achieved
    pub total_flow: f64,
    /// Flow placed per edge
    #[serde(serialize_with = "ser_edge_map")]
    pub edge_flow: BTreeMap<EdgeId, f64>,
    /// Remaining capacity per edge after placement
    #[serde(serialize_with = "ser_edge_map")]
    pub residual_cap: BTreeMap<EdgeId, f64>,
    /// Nodes reachable from the source in the residual graph
    pub reachable: BTreeSet<String>,
    /// Saturated edges crossing the source-side cut
    pub min_cut: Vec<EdgeId>,
    /// Flow volume placed at each path cost; the values sum to `total_flow`
    #[serde(serialize_with = "ser_cost_distribution")]
    pub cost_distribution: BTreeMap<OrderedFloat<Cost>, f64>,
}

fn ser_edge_map<S: Serializer>(
    map: &BTreeMap<EdgeId, f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (edge, value) in map {
        out.serialize_entry(&edge.to_string(), value)?;
    }
    out.end()
}

fn ser_cost_distribution<S: Serializer>(
    map: &BTreeMap<OrderedFloat<Cost>, f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (cost, value) in map {
        out.serialize_entry(&cost.to_string(), value)?;
    }
    out.end()
}

/// Compute the maximum flow from `source` to `sink` on `graph`.
///
/// The graph's per-edge `flow` state is mutated in place; hand the engine a
/// private copy when the graph is shared. Fails with
/// [`Error::NumericFailure`] when a NaN capacity or a non-finite cost is
/// encountered.
pub fn calc_max_flow(
    graph: &mut StrictMultiDigraph,
    source: NodeId,
    sink: NodeId,
    opts: &MaxFlowOptions,
) -> Result<FlowSummary> {
    validate_numerics(graph)?;

    let mut total_flow = 0.0;
    let mut cost_distribution: BTreeMap<OrderedFloat<Cost>, f64> = BTreeMap::new();
    let mut first_tier_cost: Option<Cost> = None;

    loop {
        let spf = spf_filtered(graph, source, EdgeSelect::AllMinCost, true, |_, d| {
            d.residual() > FLOW_TOLERANCE
        });
        let Some(&tier_cost) = spf.costs.get(&sink) else {
            break;
        };
        match first_tier_cost {
            None => first_tier_cost = Some(tier_cost),
            Some(first) if opts.shortest_path && tier_cost > first => break,
            Some(_) => {}
        }

        let dag = TierDag::extract(&spf, source, sink);
        let pushed = match opts.placement {
            FlowPlacement::Proportional => dag.push_proportional(graph, source, sink),
            FlowPlacement::EqualBalanced => dag.push_equal_balanced(graph, source)?,
        };
        if pushed <= FLOW_TOLERANCE {
            break;
        }
        *cost_distribution
            .entry(OrderedFloat(tier_cost))
            .or_insert(0.0) += pushed;
        total_flow += pushed;
    }

    Ok(build_summary(graph, source, total_flow, cost_distribution))
}

fn validate_numerics(graph: &StrictMultiDigraph) -> Result<()> {
    for (_, _, key, data) in graph.edges() {
        if data.capacity.is_nan() {
            return Err(Error::numeric(format!(
                "NaN capacity on edge {}",
                key.index()
            )));
        }
        if !data.cost.is_finite() {
            return Err(Error::numeric(format!(
                "non-finite cost on edge {}",
                key.index()
            )));
        }
        if data.cost < 0.0 {
            return Err(Error::invalid_config(format!(
                "negative cost on edge {}",
                key.index()
            )));
        }
    }
    Ok(())
}

fn build_summary(
    graph: &StrictMultiDigraph,
    source: NodeId,
    total_flow: f64,
    cost_distribution: BTreeMap<OrderedFloat<Cost>, f64>,
) -> FlowSummary {
    let reach = residual_reachable(graph, source);

    let mut edge_flow = BTreeMap::new();
    let mut residual_cap = BTreeMap::new();
    let mut min_cut = Vec::new();
    for (u, v, key, data) in graph.edges() {
        let id = EdgeId {
            src: graph.node_name(u).to_string(),
            dst: graph.node_name(v).to_string(),
            key: key.index(),
        };
        if reach.contains(&u) && !reach.contains(&v) && data.residual() <= FLOW_TOLERANCE {
            min_cut.push(id.clone());
        }
        edge_flow.insert(id.clone(), data.flow);
        residual_cap.insert(id, data.residual());
    }
    min_cut.sort();

    FlowSummary {
        total_flow,
        edge_flow,
        residual_cap,
        reachable: reach
            .iter()
            .map(|&n| graph.node_name(n).to_string())
            .collect(),
        min_cut,
        cost_distribution,
    }
}

fn residual_reachable(graph: &StrictMultiDigraph, source: NodeId) -> HashSet<NodeId> {
    let mut reach = HashSet::from([source]);
    let mut queue = VecDeque::from([source]);
    while let Some(node) = queue.pop_front() {
        for (_, target, data) in graph.out_edges(node) {
            if data.residual() > FLOW_TOLERANCE && reach.insert(target) {
                queue.push_back(target);
            }
        }
    }
    reach
}

/// One arc of the current cost tier: the parallel equal-cost edges from
/// `from` to `to` that still have spare capacity.
#[derive(Debug, Clone)]
struct DagArc {
    from: NodeId,
    to: NodeId,
    keys: SmallVec<[EdgeKey; 2]>,
}

/// The shortest-path DAG of the current cost tier
#[derive(Debug, Clone)]
struct TierDag {
    nodes: Vec<NodeId>,
    arcs: Vec<DagArc>,
}

impl TierDag {
    /// Restrict the predecessor DAG to the arcs that reach `sink`
    fn extract(spf: &SpfResult, source: NodeId, sink: NodeId) -> Self {
        let mut visited = HashSet::from([sink]);
        let mut queue = VecDeque::from([sink]);
        let mut arcs = Vec::new();
        while let Some(node) = queue.pop_front() {
            let Some(entries) = spf.pred.get(&node) else {
                continue;
            };
            for (prev, keys) in entries {
                arcs.push(DagArc {
                    from: *prev,
                    to: node,
                    keys: keys.clone(),
                });
                if visited.insert(*prev) {
                    queue.push_back(*prev);
                }
            }
        }
        visited.insert(source);
        Self {
            nodes: visited.into_iter().collect(),
            arcs,
        }
    }

    fn arc_capacity(&self, graph: &StrictMultiDigraph, arc: &DagArc) -> f64 {
        arc.keys
            .iter()
            .filter_map(|&k| graph.edge(k))
            .map(|d| d.residual().max(0.0))
            .sum()
    }

    /// Exact DAG max flow via Dinic blocking flow over arcs; parallel
    /// equal-cost edges of an arc share in proportion to their remaining
    /// capacity. Returns the pushed volume.
    fn push_proportional(
        &self,
        graph: &mut StrictMultiDigraph,
        source: NodeId,
        sink: NodeId,
    ) -> f64 {
        let index: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, i))
            .collect();
        let mut dinic = Dinic::new(self.nodes.len());
        for arc in &self.arcs {
            dinic.add_arc(index[&arc.from], index[&arc.to], self.arc_capacity(graph, arc));
        }
        let pushed = dinic.solve(index[&source], index[&sink]);
        if pushed > FLOW_TOLERANCE {
            for (i, arc) in self.arcs.iter().enumerate() {
                let amount = dinic.arc_flow(i);
                if amount > FLOW_TOLERANCE {
                    distribute_to_keys(graph, &arc.keys, amount);
                }
            }
        }
        pushed
    }

    /// Equal split across outgoing DAG arcs; the feasible push is bounded
    /// by the most restrictive branch. Returns the pushed volume.
    fn push_equal_balanced(&self, graph: &mut StrictMultiDigraph, source: NodeId) -> Result<f64> {
        // Fraction of the tier push traversing each arc, by topological
        // order: a node's fraction splits equally among its outgoing arcs.
        let mut out_arcs: HashMap<NodeId, Vec<usize>> = HashMap::new();
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.iter().map(|&n| (n, 0)).collect();
        for (i, arc) in self.arcs.iter().enumerate() {
            out_arcs.entry(arc.from).or_default().push(i);
            *in_degree.entry(arc.to).or_default() += 1;
        }

        let mut frac: HashMap<NodeId, f64> = HashMap::new();
        frac.insert(source, 1.0);
        let mut arc_frac = vec![0.0_f64; self.arcs.len()];
        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        while let Some(node) = queue.pop_front() {
            let node_frac = frac.get(&node).copied().unwrap_or(0.0);
            if let Some(arcs) = out_arcs.get(&node) {
                let share = node_frac / arcs.len() as f64;
                for &i in arcs {
                    let to = self.arcs[i].to;
                    arc_frac[i] += share;
                    *frac.entry(to).or_insert(0.0) += share;
                    let d = in_degree.get_mut(&to).expect("arc target is a DAG node");
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(to);
                    }
                }
            }
        }

        let mut push = f64::INFINITY;
        for (i, arc) in self.arcs.iter().enumerate() {
            if arc_frac[i] > 0.0 {
                push = push.min(self.arc_capacity(graph, arc) / arc_frac[i]);
            }
        }
        if push == f64::INFINITY {
            return Ok(0.0);
        }
        if !push.is_finite() || push.is_nan() {
            return Err(Error::numeric("equal-balanced push is not finite"));
        }
        if push <= FLOW_TOLERANCE {
            return Ok(0.0);
        }
        for (i, arc) in self.arcs.iter().enumerate() {
            let amount = push * arc_frac[i];
            if amount > FLOW_TOLERANCE {
                distribute_to_keys(graph, &arc.keys, amount);
            }
        }
        Ok(push)
    }
}

/// Split an arc's flow across its parallel keys in proportion to their
/// remaining capacity. Infinite-capacity keys absorb the volume equally.
fn distribute_to_keys(graph: &mut StrictMultiDigraph, keys: &[EdgeKey], amount: f64) {
    if keys.len() == 1 {
        if let Some(data) = graph.edge_mut(keys[0]) {
            data.flow += amount;
        }
        return;
    }
    let residuals: Vec<f64> = keys
        .iter()
        .map(|&k| graph.edge(k).map_or(0.0, |d| d.residual().max(0.0)))
        .collect();
    let total: f64 = residuals.iter().sum();
    if total.is_infinite() {
        let infinite = residuals.iter().filter(|r| r.is_infinite()).count() as f64;
        for (&k, r) in keys.iter().zip(&residuals) {
            if r.is_infinite() {
                if let Some(data) = graph.edge_mut(k) {
                    data.flow += amount / infinite;
                }
            }
        }
    } else if total > 0.0 {
        for (&k, r) in keys.iter().zip(&residuals) {
            if let Some(data) = graph.edge_mut(k) {
                data.flow += amount * r / total;
            }
        }
    }
}

/// Minimal Dinic max-flow over the tier's arc graph. Arc `i` maps to the
/// forward residual slot `2 * i`. Flow is tracked explicitly so
/// infinite-capacity pseudo arcs report their throughput too.
struct Dinic {
    adj: Vec<Vec<usize>>,
    to: Vec<usize>,
    cap: Vec<f64>,
    flow: Vec<f64>,
}

impl Dinic {
    fn new(n: usize) -> Self {
        Self {
            adj: vec![Vec::new(); n],
            to: Vec::new(),
            cap: Vec::new(),
            flow: Vec::new(),
        }
    }

    fn add_arc(&mut self, u: usize, v: usize, capacity: f64) {
        let idx = self.to.len();
        self.to.push(v);
        self.cap.push(capacity);
        self.adj[u].push(idx);
        self.to.push(u);
        self.cap.push(0.0);
        self.adj[v].push(idx + 1);
        self.flow.push(0.0);
        self.flow.push(0.0);
    }

    fn arc_flow(&self, arc: usize) -> f64 {
        self.flow[2 * arc].max(0.0)
    }

    fn solve(&mut self, s: usize, t: usize) -> f64 {
        let n = self.adj.len();
        let mut total = 0.0;
        loop {
            // BFS level graph over positive residual slots
            let mut level = vec![usize::MAX; n];
            level[s] = 0;
            let mut queue = VecDeque::from([s]);
            while let Some(u) = queue.pop_front() {
                for &e in &self.adj[u] {
                    let v = self.to[e];
                    if self.cap[e] > FLOW_TOLERANCE && level[v] == usize::MAX {
                        level[v] = level[u] + 1;
                        queue.push_back(v);
                    }
                }
            }
            if level[t] == usize::MAX {
                break;
            }
            let mut iter = vec![0usize; n];
            loop {
                let pushed = self.augment(s, t, f64::INFINITY, &level, &mut iter);
                if pushed <= FLOW_TOLERANCE {
                    break;
                }
                total += pushed;
            }
        }
        total
    }

    fn augment(&mut self, u: usize, t: usize, limit: f64, level: &[usize], iter: &mut [usize]) -> f64 {
        if u == t {
            return limit;
        }
        while iter[u] < self.adj[u].len() {
            let e = self.adj[u][iter[u]];
            let v = self.to[e];
            if self.cap[e] > FLOW_TOLERANCE && level[v] == level[u] + 1 {
                let pushed = self.augment(v, t, limit.min(self.cap[e]), level, iter);
                if pushed > FLOW_TOLERANCE {
                    self.cap[e] -= pushed;
                    self.cap[e ^ 1] += pushed;
                    self.flow[e] += pushed;
                    self.flow[e ^ 1] -= pushed;
                    return pushed;
                }
            }
            iter[u] += 1;
        }
        0.0
    }
}

/// Identify saturated edges after a full max-flow run: edges carrying
/// positive flow whose residual capacity is within `tolerance` of zero.
pub fn saturated_edges(
    graph: &StrictMultiDigraph,
    source: NodeId,
    sink: NodeId,
    tolerance: f64,
    opts: &MaxFlowOptions,
) -> Result<Vec<EdgeId>> {
    let mut working = graph.clone();
    calc_max_flow(&mut working, source, sink, opts)?;
    let mut out: Vec<EdgeId> = working
        .edges()
        .filter(|(_, _, _, d)| d.flow > tolerance && d.residual() <= tolerance)
        .map(|(u, v, k, _)| EdgeId {
            src: working.node_name(u).to_string(),
            dst: working.node_name(v).to_string(),
            key: k.index(),
        })
        .collect();
    out.sort();
    Ok(out)
}

/// Per-saturated-edge sensitivity: perturb the edge capacity by
/// `change_amount` (clamped at zero from below), re-solve, and report the
/// change in total flow.
pub fn run_sensitivity(
    graph: &StrictMultiDigraph,
    source: NodeId,
    sink: NodeId,
    change_amount: f64,
    opts: &MaxFlowOptions,
) -> Result<BTreeMap<EdgeId, f64>> {
    let mut baseline = graph.clone();
    let base_summary = calc_max_flow(&mut baseline, source, sink, opts)?;

    let saturated: Vec<(EdgeKey, EdgeId)> = baseline
        .edges()
        .filter(|(_, _, _, d)| d.flow > FLOW_TOLERANCE && d.residual() <= FLOW_TOLERANCE)
        .map(|(u, v, k, _)| {
            (
                k,
                EdgeId {
                    src: baseline.node_name(u).to_string(),
                    dst: baseline.node_name(v).to_string(),
                    key: k.index(),
                },
            )
        })
        .collect();

    let mut out = BTreeMap::new();
    for (key, id) in saturated {
        let mut perturbed = graph.clone();
        {
            let data = perturbed
                .edge_mut(key)
                .ok_or_else(|| Error::internal("saturated edge missing from clone"))?;
            data.capacity = (data.capacity + change_amount).max(0.0);
        }
        let summary = calc_max_flow(&mut perturbed, source, sink, opts)?;
        out.insert(id, summary.total_flow - base_summary.total_flow);
    }
    Ok(out)
}
