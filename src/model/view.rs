//! Read-only view of a network with temporary exclusions
//!
//! [`NetworkView`] hides a set of nodes and links from analysis without
//! mutating the base [`Network`]. Scenario-disabled elements and
//! analysis-excluded elements are both hidden. Multiple views over the
//! same base run safely in parallel, each with its own exclusions and its
//! own working-graph cache.

use super::{AnalysisContext, Link, Network, Node};
use crate::graph::StrictMultiDigraph;
use crate::Result;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

/// Immutable overlay hiding selected nodes/links from a base network.
///
/// The derived working graph is cached per `(add_reverse, compact)` key;
/// the first build of each key synchronizes, subsequent reads take the
/// cached `Arc` without locking.
///
/// ## Example
///
/// ```rust
/// use netgraph::model::{Link, Network, NetworkView, Node};
///
/// let mut net = Network::new();
/// net.add_node(Node::new("A")).unwrap();
/// net.add_node(Node::new("B")).unwrap();
/// net.add_link(Link::new("A", "B", 10.0, 1.0)).unwrap();
///
/// let view = NetworkView::from_excluded_sets(&net, ["B".to_string()], []);
/// assert!(view.is_node_hidden("B"));
/// assert_eq!(view.nodes().count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct NetworkView<'a> {
    base: &'a Network,
    excluded_nodes: BTreeSet<String>,
    excluded_links: BTreeSet<String>,
    cache: [OnceLock<Arc<StrictMultiDigraph>>; 4],
}

impl<'a> NetworkView<'a> {
    /// View over a base network with nothing excluded
    pub fn new(base: &'a Network) -> Self {
        Self::from_excluded_sets(base, [], [])
    }

    /// View over a base network with the given exclusions
    pub fn from_excluded_sets<N, L>(base: &'a Network, excluded_nodes: N, excluded_links: L) -> Self
    where
        N: IntoIterator<Item = String>,
        L: IntoIterator<Item = String>,
    {
        Self {
            base,
            excluded_nodes: excluded_nodes.into_iter().collect(),
            excluded_links: excluded_links.into_iter().collect(),
            cache: Default::default(),
        }
    }

    /// The underlying base network
    pub fn base(&self) -> &'a Network {
        self.base
    }

    /// Node names excluded by this view
    pub fn excluded_nodes(&self) -> &BTreeSet<String> {
        &self.excluded_nodes
    }

    /// Link ids excluded by this view
    pub fn excluded_links(&self) -> &BTreeSet<String> {
        &self.excluded_links
    }

    /// Whether a node is hidden: disabled on the base, excluded here, or
    /// nonexistent
    pub fn is_node_hidden(&self, name: &str) -> bool {
        match self.base().nodes.get(name) {
            None => true,
            Some(node) => node.disabled || self.excluded_nodes.contains(name),
        }
    }

    /// Whether a link is hidden: disabled, excluded, either endpoint
    /// hidden, or nonexistent
    pub fn is_link_hidden(&self, id: &str) -> bool {
        match self.base().links.get(id) {
            None => true,
            Some(link) => {
                link.disabled
                    || self.excluded_links.contains(id)
                    || self.is_node_hidden(&link.source)
                    || self.is_node_hidden(&link.target)
            }
        }
    }

    /// Visible nodes
    pub fn nodes(&self) -> impl Iterator<Item = &'a Node> + '_ {
        self.base()
            .nodes
            .values()
            .filter(move |node| !self.is_node_hidden(&node.name))
    }

    /// Visible links
    pub fn links(&self) -> impl Iterator<Item = &'a Link> + '_ {
        self.base()
            .links
            .iter()
            .filter(move |(id, _)| !self.is_link_hidden(id))
            .map(|(_, link)| link)
    }

    /// Working graph of the visible topology, cached per
    /// `(add_reverse, compact)`
    pub fn working_graph(&self, add_reverse: bool, compact: bool) -> Arc<StrictMultiDigraph> {
        let slot = (add_reverse as usize) * 2 + compact as usize;
        Arc::clone(self.cache[slot].get_or_init(|| {
            Arc::new(self.base().build_graph(
                add_reverse,
                compact,
                &self.excluded_nodes,
                &self.excluded_links,
            ))
        }))
    }

    /// Select and group visible nodes; groups emptied by filtering are
    /// dropped
    pub fn select_node_groups(&self, path: &str) -> Result<IndexMap<String, Vec<String>>> {
        let mut groups = self.base().select_node_groups(path)?;
        groups.retain(|_, names| {
            names.retain(|name| !self.is_node_hidden(name));
            !names.is_empty()
        });
        Ok(groups)
    }
}

impl AnalysisContext for NetworkView<'_> {
    fn select_groups(&self, path: &str) -> Result<IndexMap<String, Vec<String>>> {
        self.select_node_groups(path)
    }

    fn is_node_active(&self, name: &str) -> bool {
        !self.is_node_hidden(name)
    }

    fn build_working_graph(&self, add_reverse: bool, compact: bool) -> StrictMultiDigraph {
        // Solvers mutate flow state, so hand out a copy of the cached graph
        self.working_graph(add_reverse, compact).as_ref().clone()
    }
}
