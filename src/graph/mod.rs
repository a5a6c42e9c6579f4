//! Graph layer: the strict multigraph and the algorithms over it
//!
//! - [`StrictMultiDigraph`] - directed multigraph with keyed parallel edges
//! - [`spf`] - shortest-path-first (Dijkstra) and K-shortest-paths
//! - [`paths`] - path materialization from predecessor DAGs
//! - [`flow`] - the cost-tiered max-flow engine
//!
//! ## Graph Representation
//!
//! The store is a [`petgraph`] `StableDiGraph` wrapped with a name table,
//! so nodes are addressed by string name at the API surface and by index
//! inside the algorithms. Parallel edges are first-class: every edge gets
//! its own stable key.
//!
//! ## Example
//!
//! ```rust
//! use netgraph::graph::StrictMultiDigraph;
//!
//! let mut g = StrictMultiDigraph::new();
//! let a = g.add_node("A");
//! let b = g.add_node("B");
//! g.add_edge(a, b, 10.0, 1.0, None);
//! g.add_edge(a, b, 10.0, 1.0, None); // parallel edge, distinct key
//! assert_eq!(g.edge_count(), 2);
//! ```

pub mod flow;
pub mod paths;
pub mod spf;

pub use flow::{calc_max_flow, run_sensitivity, saturated_edges, FlowSummary, MaxFlowOptions};
pub use paths::{resolve_to_paths, Path, PathElement};
pub use spf::{ksp, spf, spf_filtered, KspOptions, PredecessorMap, SpfResult};

use crate::{Error, Result};
use indexmap::IndexMap;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier inside a working graph
pub type NodeId = petgraph::stable_graph::NodeIndex;

/// Opaque key of a (possibly parallel) edge
pub type EdgeKey = petgraph::stable_graph::EdgeIndex;

/// Payload carried by every edge of a working graph
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    /// Maximum capacity of the edge
    pub capacity: f64,
    /// Cost per unit of flow
    pub cost: f64,
    /// Flow currently placed on the edge (mutated by the flow engine on a
    /// private copy)
    pub flow: f64,
    /// Originating model link id, kept in non-compact builds
    pub link_id: Option<String>,
}

impl EdgeData {
    /// Create an edge payload with no placed flow
    pub fn new(capacity: f64, cost: f64, link_id: Option<String>) -> Self {
        Self {
            capacity,
            cost,
            flow: 0.0,
            link_id,
        }
    }

    /// Remaining capacity
    pub fn residual(&self) -> f64 {
        self.capacity - self.flow
    }
}

/// Externally surfaced edge identity: the `(u, v, key)` tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId {
    /// Source node name
    pub src: String,
    /// Target node name
    pub dst: String,
    /// Edge key within the working graph
    pub key: usize,
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}#{}", self.src, self.dst, self.key)
    }
}

/// A strict directed multigraph with per-edge capacity and cost.
///
/// "Strict" means node names are unique and every edge references existing
/// nodes; parallel edges and self-loops are allowed at this layer (the flow
/// and shortest-path algorithms skip self-loops). No graph algorithms live
/// here.
#[derive(Debug, Clone, Default)]
pub struct StrictMultiDigraph {
    graph: StableDiGraph<String, EdgeData>,
    names: IndexMap<String, NodeId>,
}

impl StrictMultiDigraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its id. Adding an existing name returns the
    /// id already assigned to it.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let name = name.into();
        if let Some(&id) = self.names.get(&name) {
            return id;
        }
        let id = self.graph.add_node(name.clone());
        self.names.insert(name, id);
        id
    }

    /// Remove a node and all incident edges. Returns false if the node was
    /// not present.
    pub fn remove_node(&mut self, name: &str) -> bool {
        match self.names.shift_remove(name) {
            Some(id) => {
                self.graph.remove_node(id);
                true
            }
            None => false,
        }
    }

    /// Look up a node id by name
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Node name for an id
    pub fn node_name(&self, id: NodeId) -> &str {
        &self.graph[id]
    }

    /// Whether a node with this name exists
    pub fn contains_node(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate `(name, id)` pairs in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.names.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// Add an edge between two existing node ids, returning its key
    pub fn add_edge(
        &mut self,
        u: NodeId,
        v: NodeId,
        capacity: f64,
        cost: f64,
        link_id: Option<String>,
    ) -> EdgeKey {
        self.graph.add_edge(u, v, EdgeData::new(capacity, cost, link_id))
    }

    /// Add an edge between two nodes addressed by name
    pub fn add_edge_between(
        &mut self,
        u: &str,
        v: &str,
        capacity: f64,
        cost: f64,
        link_id: Option<String>,
    ) -> Result<EdgeKey> {
        let u = self
            .node_id(u)
            .ok_or_else(|| Error::unknown_reference(format!("node '{u}' not in graph")))?;
        let v = self
            .node_id(v)
            .ok_or_else(|| Error::unknown_reference(format!("node '{v}' not in graph")))?;
        Ok(self.add_edge(u, v, capacity, cost, link_id))
    }

    /// Edge payload by key
    pub fn edge(&self, key: EdgeKey) -> Option<&EdgeData> {
        self.graph.edge_weight(key)
    }

    /// Mutable edge payload by key
    pub fn edge_mut(&mut self, key: EdgeKey) -> Option<&mut EdgeData> {
        self.graph.edge_weight_mut(key)
    }

    /// Endpoints of an edge
    pub fn endpoints(&self, key: EdgeKey) -> Option<(NodeId, NodeId)> {
        self.graph.edge_endpoints(key)
    }

    /// Outgoing edges of a node as `(key, target, payload)`
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeKey, NodeId, &EdgeData)> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight()))
    }

    /// Incoming edges of a node as `(key, source, payload)`
    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeKey, NodeId, &EdgeData)> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| (e.id(), e.source(), e.weight()))
    }

    /// Iterate all edges as `(u, v, key, payload)`
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, EdgeKey, &EdgeData)> {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.id(), e.weight()))
    }

    /// External identity for an edge key
    pub fn edge_id(&self, key: EdgeKey) -> Option<EdgeId> {
        let (u, v) = self.endpoints(key)?;
        Some(EdgeId {
            src: self.node_name(u).to_string(),
            dst: self.node_name(v).to_string(),
            key: key.index(),
        })
    }

    /// Reset all placed flow to zero
    pub fn clear_flow(&mut self) {
        let keys: Vec<EdgeKey> = self.graph.edge_indices().collect();
        for key in keys {
            if let Some(data) = self.graph.edge_weight_mut(key) {
                data.flow = 0.0;
            }
        }
    }
}
