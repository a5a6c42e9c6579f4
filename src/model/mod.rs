//! Domain model: nodes, links, risk groups, and the network container
//!
//! A [`Network`] is the scenario-level topology with persistent state
//! (`disabled` flags set by loaders or explicit enable/disable calls). For
//! temporary exclusions during analysis - failure simulation, what-if runs -
//! use [`NetworkView`] instead of mutating the network.
//!
//! ## Example
//!
//! ```rust
//! use netgraph::model::{Link, Network, Node};
//!
//! let mut net = Network::new();
//! net.add_node(Node::new("A")).unwrap();
//! net.add_node(Node::new("B")).unwrap();
//! net.add_link(Link::new("A", "B", 10.0, 1.0)).unwrap();
//! assert_eq!(net.links.len(), 1);
//! ```

pub mod attrs;
pub mod selector;
pub mod view;

pub use attrs::AttrMap;
pub use view::NetworkView;

use crate::graph::StrictMultiDigraph;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A node in the network, uniquely identified by its name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    /// Unique name; the key in the network's node table
    pub name: String,
    /// Scenario-level disabled flag
    pub disabled: bool,
    /// Names of the risk groups this node belongs to
    pub risk_groups: BTreeSet<String>,
    /// Opaque metadata (coordinates, role, region, ...)
    pub attrs: AttrMap,
}

impl Node {
    /// Create an enabled node with no attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attach attributes
    pub fn with_attrs(mut self, attrs: AttrMap) -> Self {
        self.attrs = attrs;
        self
    }

    /// Attach risk-group memberships
    pub fn with_risk_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.risk_groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// One directed link between two nodes.
///
/// The model stores a single direction; working graphs add a reverse edge
/// by default so declared-once optical links behave bidirectionally in
/// analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Source node name
    pub source: String,
    /// Target node name
    pub target: String,
    /// Capacity (non-negative)
    pub capacity: f64,
    /// Cost (non-negative)
    pub cost: f64,
    /// Scenario-level disabled flag
    pub disabled: bool,
    /// Names of the risk groups this link belongs to
    pub risk_groups: BTreeSet<String>,
    /// Opaque metadata (distance, media type, ...)
    pub attrs: AttrMap,
    /// Unique identifier `"{source}|{target}|{uuid}"`, assigned at
    /// construction
    pub id: String,
}

impl Link {
    /// Create an enabled link with a fresh unique id
    pub fn new(source: impl Into<String>, target: impl Into<String>, capacity: f64, cost: f64) -> Self {
        let source = source.into();
        let target = target.into();
        let id = format!("{source}|{target}|{}", Uuid::new_v4());
        Self {
            source,
            target,
            capacity,
            cost,
            disabled: false,
            risk_groups: BTreeSet::new(),
            attrs: AttrMap::new(),
            id,
        }
    }

    /// Attach attributes
    pub fn with_attrs(mut self, attrs: AttrMap) -> Self {
        self.attrs = attrs;
        self
    }

    /// Attach risk-group memberships
    pub fn with_risk_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.risk_groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// A shared-risk or failure domain, possibly with nested children.
///
/// Children are owned by value, so the hierarchy is a tree; entities
/// reference risk groups by name only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskGroup {
    /// Unique name across the whole hierarchy
    pub name: String,
    /// Nested subdomains
    pub children: Vec<RiskGroup>,
    /// Whether the group was declared disabled on load
    pub disabled: bool,
    /// Opaque metadata
    pub attrs: AttrMap,
}

impl RiskGroup {
    /// Create a leaf risk group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attach child groups
    pub fn with_children(mut self, children: Vec<RiskGroup>) -> Self {
        self.children = children;
        self
    }

    /// This group's name plus every descendant name
    pub fn names_recursive(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        let mut stack: Vec<&RiskGroup> = self.children.iter().collect();
        while let Some(group) = stack.pop() {
            out.push(group.name.as_str());
            stack.extend(group.children.iter());
        }
        out
    }
}

/// Seam between the model layer and the solver wrappers.
///
/// Implemented by [`Network`] (raw topology) and [`NetworkView`] (topology
/// with exclusions); solver operations are generic over it and never
/// mutate the context.
pub trait AnalysisContext {
    /// Select node groups by regex or `attr:` directive, as label -> node
    /// names. The raw network returns disabled nodes too; views filter
    /// hidden ones.
    fn select_groups(&self, path: &str) -> Result<IndexMap<String, Vec<String>>>;

    /// Whether a node exists and participates in analysis
    fn is_node_active(&self, name: &str) -> bool;

    /// Build an owned working graph that the caller may mutate freely
    fn build_working_graph(&self, add_reverse: bool, compact: bool) -> StrictMultiDigraph;
}

/// Container for network nodes, links, and risk groups
#[derive(Debug, Clone, Default)]
pub struct Network {
    /// Node name -> node
    pub nodes: IndexMap<String, Node>,
    /// Link id -> link
    pub links: IndexMap<String, Link>,
    /// Top-level risk groups by name
    pub risk_groups: IndexMap<String, RiskGroup>,
    /// Optional metadata about the network
    pub attrs: AttrMap,
}

impl Network {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, keyed by its name
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.name) {
            return Err(Error::invalid_config(format!(
                "node '{}' already exists in the network",
                node.name
            )));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Add a link, keyed by its auto-generated id, returning the id.
    ///
    /// Rejects unknown endpoints, direct self-loops, and non-finite or
    /// negative capacity/cost.
    pub fn add_link(&mut self, link: Link) -> Result<String> {
        if !self.nodes.contains_key(&link.source) {
            return Err(Error::unknown_reference(format!(
                "source node '{}' not found in network",
                link.source
            )));
        }
        if !self.nodes.contains_key(&link.target) {
            return Err(Error::unknown_reference(format!(
                "target node '{}' not found in network",
                link.target
            )));
        }
        if link.source == link.target {
            return Err(Error::invalid_config(format!(
                "self-loop link on node '{}'",
                link.source
            )));
        }
        if !link.capacity.is_finite() || !link.cost.is_finite() {
            return Err(Error::numeric(format!(
                "link '{}' has non-finite capacity or cost",
                link.id
            )));
        }
        if link.capacity < 0.0 || link.cost < 0.0 {
            return Err(Error::invalid_config(format!(
                "link '{}' has negative capacity or cost",
                link.id
            )));
        }
        let id = link.id.clone();
        self.links.insert(id.clone(), link);
        Ok(id)
    }

    /// Register a top-level risk group. Names must be unique across the
    /// entire hierarchy, which also guarantees the tree is acyclic.
    pub fn add_risk_group(&mut self, group: RiskGroup) -> Result<()> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for existing in self.risk_groups.values() {
            seen.extend(existing.names_recursive());
        }
        for name in group.names_recursive() {
            if !seen.insert(name) {
                return Err(Error::invalid_config(format!(
                    "risk group '{name}' already exists in the hierarchy"
                )));
            }
        }
        self.risk_groups.insert(group.name.clone(), group);
        Ok(())
    }

    /// Mark a node as disabled
    pub fn disable_node(&mut self, name: &str) -> Result<()> {
        self.set_node_disabled(name, true)
    }

    /// Mark a node as enabled
    pub fn enable_node(&mut self, name: &str) -> Result<()> {
        self.set_node_disabled(name, false)
    }

    fn set_node_disabled(&mut self, name: &str, disabled: bool) -> Result<()> {
        match self.nodes.get_mut(name) {
            Some(node) => {
                node.disabled = disabled;
                Ok(())
            }
            None => Err(Error::unknown_reference(format!("node '{name}' does not exist"))),
        }
    }

    /// Mark a link as disabled
    pub fn disable_link(&mut self, id: &str) -> Result<()> {
        self.set_link_disabled(id, true)
    }

    /// Mark a link as enabled
    pub fn enable_link(&mut self, id: &str) -> Result<()> {
        self.set_link_disabled(id, false)
    }

    fn set_link_disabled(&mut self, id: &str, disabled: bool) -> Result<()> {
        match self.links.get_mut(id) {
            Some(link) => {
                link.disabled = disabled;
                Ok(())
            }
            None => Err(Error::unknown_reference(format!("link '{id}' does not exist"))),
        }
    }

    /// Mark every node and link as enabled
    pub fn enable_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.disabled = false;
        }
        for link in self.links.values_mut() {
            link.disabled = false;
        }
    }

    /// Mark every node and link as disabled
    pub fn disable_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.disabled = true;
        }
        for link in self.links.values_mut() {
            link.disabled = true;
        }
    }

    /// Disable all nodes/links belonging to a risk group, descending into
    /// child groups when `recursive` is set
    pub fn disable_risk_group(&mut self, name: &str, recursive: bool) {
        self.set_risk_group_disabled(name, recursive, true);
    }

    /// Enable all nodes/links belonging to a risk group.
    ///
    /// An entity in several risk groups is re-enabled even if its other
    /// groups remain disabled.
    pub fn enable_risk_group(&mut self, name: &str, recursive: bool) {
        self.set_risk_group_disabled(name, recursive, false);
    }

    fn set_risk_group_disabled(&mut self, name: &str, recursive: bool, disabled: bool) {
        let Some(group) = self.risk_groups.get(name) else {
            return;
        };
        let affected: BTreeSet<String> = if recursive {
            group.names_recursive().iter().map(|s| s.to_string()).collect()
        } else {
            BTreeSet::from([group.name.clone()])
        };
        for node in self.nodes.values_mut() {
            if node.risk_groups.iter().any(|g| affected.contains(g)) {
                node.disabled = disabled;
            }
        }
        for link in self.links.values_mut() {
            if link.risk_groups.iter().any(|g| affected.contains(g)) {
                link.disabled = disabled;
            }
        }
    }

    /// Ids of all direct links from `source` to `target`
    pub fn get_links_between(&self, source: &str, target: &str) -> Vec<String> {
        self.links
            .iter()
            .filter(|(_, link)| link.source == source && link.target == target)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Search links by optional regex on source and target names; with
    /// `any_direction` the reversed orientation also matches
    pub fn find_links(
        &self,
        source_regex: Option<&str>,
        target_regex: Option<&str>,
        any_direction: bool,
    ) -> Result<Vec<&Link>> {
        let src_pat = source_regex
            .map(regex::Regex::new)
            .transpose()
            .map_err(|e| Error::invalid_selector(e.to_string()))?;
        let tgt_pat = target_regex
            .map(regex::Regex::new)
            .transpose()
            .map_err(|e| Error::invalid_selector(e.to_string()))?;

        let matches = |src: &str, tgt: &str| {
            src_pat.as_ref().map_or(true, |p| p.is_match(src))
                && tgt_pat.as_ref().map_or(true, |p| p.is_match(tgt))
        };

        Ok(self
            .links
            .values()
            .filter(|link| {
                matches(&link.source, &link.target)
                    || (any_direction && matches(&link.target, &link.source))
            })
            .collect())
    }

    /// Build a working graph from the enabled topology
    pub fn to_working_graph(&self, add_reverse: bool, compact: bool) -> StrictMultiDigraph {
        self.build_graph(add_reverse, compact, &BTreeSet::new(), &BTreeSet::new())
    }

    /// Build a working graph with extra exclusions beyond disabled state
    pub(crate) fn build_graph(
        &self,
        add_reverse: bool,
        compact: bool,
        excluded_nodes: &BTreeSet<String>,
        excluded_links: &BTreeSet<String>,
    ) -> StrictMultiDigraph {
        let mut graph = StrictMultiDigraph::new();

        let node_hidden =
            |name: &str| excluded_nodes.contains(name) || self.nodes[name].disabled;

        for (name, node) in &self.nodes {
            if !node.disabled && !excluded_nodes.contains(name) {
                graph.add_node(name.clone());
            }
        }

        for (id, link) in &self.links {
            if link.disabled
                || excluded_links.contains(id)
                || node_hidden(&link.source)
                || node_hidden(&link.target)
            {
                continue;
            }
            let u = graph
                .node_id(&link.source)
                .expect("visible link endpoints were added above");
            let v = graph
                .node_id(&link.target)
                .expect("visible link endpoints were added above");
            let link_id = (!compact).then(|| id.clone());
            graph.add_edge(u, v, link.capacity, link.cost, link_id.clone());
            if add_reverse {
                graph.add_edge(v, u, link.capacity, link.cost, link_id);
            }
        }

        graph
    }

    /// Select and group nodes by regex on name or by `attr:` directive.
    ///
    /// Disabled nodes are returned here; [`NetworkView`] filters them.
    pub fn select_node_groups(&self, path: &str) -> Result<IndexMap<String, Vec<String>>> {
        selector::select_node_groups(self.nodes.values(), path)
    }
}

impl AnalysisContext for Network {
    fn select_groups(&self, path: &str) -> Result<IndexMap<String, Vec<String>>> {
        self.select_node_groups(path)
    }

    fn is_node_active(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| !n.disabled)
    }

    fn build_working_graph(&self, add_reverse: bool, compact: bool) -> StrictMultiDigraph {
        self.to_working_graph(add_reverse, compact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear_network() -> Network {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        net.add_node(Node::new("B")).unwrap();
        net.add_node(Node::new("C")).unwrap();
        net.add_link(Link::new("A", "B", 10.0, 1.0)).unwrap();
        net.add_link(Link::new("B", "C", 10.0, 1.0)).unwrap();
        net
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        assert!(matches!(
            net.add_node(Node::new("A")),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_link_requires_existing_endpoints() {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        let err = net.add_link(Link::new("A", "missing", 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, Error::UnknownReference(_)));
    }

    #[test]
    fn test_direct_self_loop_rejected() {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        assert!(matches!(
            net.add_link(Link::new("A", "A", 1.0, 1.0)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_nan_capacity_rejected() {
        let mut net = Network::new();
        net.add_node(Node::new("A")).unwrap();
        net.add_node(Node::new("B")).unwrap();
        assert!(matches!(
            net.add_link(Link::new("A", "B", f64::NAN, 1.0)),
            Err(Error::NumericFailure(_))
        ));
    }

    #[test]
    fn test_link_id_format() {
        let link = Link::new("A", "B", 1.0, 1.0);
        assert!(link.id.starts_with("A|B|"));
        let other = Link::new("A", "B", 1.0, 1.0);
        assert_ne!(link.id, other.id);
    }

    #[test]
    fn test_working_graph_add_reverse() {
        let net = linear_network();
        let forward_only = net.to_working_graph(false, true);
        assert_eq!(forward_only.edge_count(), 2);
        let bidirectional = net.to_working_graph(true, true);
        assert_eq!(bidirectional.edge_count(), 4);
    }

    #[test]
    fn test_working_graph_excludes_disabled() {
        let mut net = linear_network();
        net.disable_node("A").unwrap();
        let graph = net.to_working_graph(true, true);
        assert!(!graph.contains_node("A"));
        assert!(graph.contains_node("B"));
        // Both A links are gone with the node
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_compact_mode_drops_link_ids() {
        let net = linear_network();
        let compact = net.to_working_graph(true, true);
        assert!(compact.edges().all(|(_, _, _, d)| d.link_id.is_none()));
        let full = net.to_working_graph(true, false);
        assert!(full.edges().all(|(_, _, _, d)| d.link_id.is_some()));
    }

    #[test]
    fn test_enable_disable_round_trip() {
        let mut net = linear_network();
        let id = net.links.keys().next().unwrap().clone();
        net.disable_link(&id).unwrap();
        assert!(net.links[&id].disabled);
        net.enable_link(&id).unwrap();
        assert!(!net.links[&id].disabled);
        assert!(net.disable_link("bogus").is_err());
    }

    #[test]
    fn test_disable_all_and_enable_all() {
        let mut net = linear_network();
        net.disable_all();
        assert!(net.nodes.values().all(|n| n.disabled));
        assert!(net.links.values().all(|l| l.disabled));
        net.enable_all();
        assert!(net.nodes.values().all(|n| !n.disabled));
    }

    #[test]
    fn test_risk_group_disable_recursive() {
        let mut net = Network::new();
        net.add_node(Node::new("A").with_risk_groups(["rack1"])).unwrap();
        net.add_node(Node::new("B").with_risk_groups(["row1"])).unwrap();
        net.add_node(Node::new("C")).unwrap();
        net.add_risk_group(RiskGroup::new("row1").with_children(vec![RiskGroup::new("rack1")]))
            .unwrap();

        net.disable_risk_group("row1", true);
        assert!(net.nodes["A"].disabled);
        assert!(net.nodes["B"].disabled);
        assert!(!net.nodes["C"].disabled);

        net.enable_risk_group("row1", false);
        assert!(net.nodes["A"].disabled); // rack1 only touched recursively
        assert!(!net.nodes["B"].disabled);
    }

    #[test]
    fn test_duplicate_risk_group_name_rejected() {
        let mut net = Network::new();
        net.add_risk_group(RiskGroup::new("g1")).unwrap();
        let err = net
            .add_risk_group(RiskGroup::new("g2").with_children(vec![RiskGroup::new("g1")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_get_links_between_and_find_links() {
        let mut net = linear_network();
        net.add_link(Link::new("A", "B", 1.0, 5.0)).unwrap();

        assert_eq!(net.get_links_between("A", "B").len(), 2);
        assert!(net.get_links_between("C", "A").is_empty());

        let from_a = net.find_links(Some("^A$"), None, false).unwrap();
        assert_eq!(from_a.len(), 2);
        let reversed = net.find_links(Some("^B$"), Some("^A$"), true).unwrap();
        assert_eq!(reversed.len(), 2);
        assert!(net.find_links(Some("["), None, false).is_err());
    }

    #[test]
    fn test_select_returns_disabled_nodes() {
        let mut net = linear_network();
        net.disable_node("A").unwrap();
        let groups = net.select_node_groups("^A$").unwrap();
        assert_eq!(groups["^A$"], vec!["A".to_string()]);
    }

    #[test]
    fn test_node_builder_attrs() {
        let mut attrs = AttrMap::new();
        attrs.insert("role".into(), json!("spine"));
        let node = Node::new("s1").with_attrs(attrs);
        assert_eq!(node.attrs["role"], json!("spine"));
    }
}
