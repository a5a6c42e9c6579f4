//! Declarative failure policies
//!
//! A policy is a sequence of rules. Each rule scopes an entity kind
//! (nodes, links, or risk groups), filters it with attribute conditions,
//! and selects failures with one of three strategies: per-entity Bernoulli
//! (`random`), exact-count sampling (`choice`, optionally weighted by an
//! attribute), or everything matched (`all`). Given a seeded RNG the
//! selection is deterministic: matched entities are sorted before any
//! draw.

use crate::model::attrs::{lookup_path, value_contains, values_cmp, values_equal};
use crate::model::{AttrMap, Network, RiskGroup};
use crate::{Error, Result};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Which entity kind a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    /// Network nodes, identified by name
    Node,
    /// Network links, identified by id
    Link,
    /// Risk groups, identified by name (nested groups included)
    RiskGroup,
}

/// Comparison operator of a failure condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOp {
    /// Equality within the same value family
    #[serde(rename = "==")]
    Eq,
    /// Negated equality
    #[serde(rename = "!=")]
    Ne,
    /// Strictly less; false across families
    #[serde(rename = "<")]
    Lt,
    /// Less or equal
    #[serde(rename = "<=")]
    Le,
    /// Strictly greater
    #[serde(rename = ">")]
    Gt,
    /// Greater or equal
    #[serde(rename = ">=")]
    Ge,
    /// Substring / element / key membership on the attribute value
    #[serde(rename = "contains")]
    Contains,
    /// Negated membership
    #[serde(rename = "not_contains")]
    NotContains,
    /// Attribute value is an element of the condition's list; the
    /// condition value must be an array
    #[serde(rename = "in")]
    In,
    /// Negated list membership; the condition value must be an array
    #[serde(rename = "not_in")]
    NotIn,
    /// Attribute key is present with a non-null value
    #[serde(rename = "exists")]
    Exists,
    /// Attribute key is absent or null
    #[serde(rename = "not_exists")]
    NotExists,
    /// Attribute key is present, even when null
    #[serde(rename = "any_value")]
    AnyValue,
    /// Attribute key is absent or null
    #[serde(rename = "no_value")]
    NoValue,
}

/// A single `(attribute, operator, value)` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCondition {
    /// Attribute to inspect; dotted paths descend into nested maps
    pub attr: String,
    /// Comparison operator
    pub op: ConditionOp,
    /// Right-hand operand; unused by the existence operators
    #[serde(default)]
    pub value: Value,
}

impl FailureCondition {
    /// Build a condition
    pub fn new(attr: impl Into<String>, op: ConditionOp, value: Value) -> Self {
        Self {
            attr: attr.into(),
            op,
            value,
        }
    }

    fn evaluate(&self, entity: &AttrMap) -> bool {
        let found = lookup_path(entity, &self.attr);
        match self.op {
            ConditionOp::Eq => self.non_null_equal(found),
            ConditionOp::Ne => !self.non_null_equal(found),
            ConditionOp::Lt => self.ordered(found, Ordering::is_lt),
            ConditionOp::Le => self.ordered(found, Ordering::is_le),
            ConditionOp::Gt => self.ordered(found, Ordering::is_gt),
            ConditionOp::Ge => self.ordered(found, Ordering::is_ge),
            ConditionOp::Contains => found.is_some_and(|v| value_contains(v, &self.value)),
            ConditionOp::NotContains => !found.is_some_and(|v| value_contains(v, &self.value)),
            ConditionOp::In => found.is_some_and(|v| value_contains(&self.value, v)),
            ConditionOp::NotIn => !found.is_some_and(|v| value_contains(&self.value, v)),
            ConditionOp::Exists => found.is_some_and(|v| !v.is_null()),
            ConditionOp::NotExists => found.map_or(true, Value::is_null),
            ConditionOp::AnyValue => found.is_some(),
            ConditionOp::NoValue => found.map_or(true, Value::is_null),
        }
    }

    /// Null never compares equal to anything, including null: `==` is
    /// false whenever either side is null or the attribute is missing,
    /// and `!=` is true in exactly those cases.
    fn non_null_equal(&self, found: Option<&Value>) -> bool {
        found.is_some_and(|v| {
            !v.is_null() && !self.value.is_null() && values_equal(v, &self.value)
        })
    }

    fn ordered(&self, found: Option<&Value>, accept: impl Fn(Ordering) -> bool) -> bool {
        found
            .and_then(|v| values_cmp(v, &self.value))
            .is_some_and(accept)
    }
}

/// How a rule combines its conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLogic {
    /// All conditions must hold
    #[default]
    And,
    /// At least one condition must hold
    Or,
    /// Skip conditions entirely; every entity in scope matches
    Any,
}

/// How a rule selects failures among the matched entities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Per-entity Bernoulli draw with the rule's probability
    Random,
    /// Sample exactly `count` entities, optionally weighted
    Choice,
    /// Select every matched entity
    #[default]
    All,
}

/// One failure rule: scope, conditions, and selection strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRule {
    /// Entity kind this rule applies to
    pub entity_scope: EntityScope,
    /// Attribute conditions filtering the scope
    #[serde(default)]
    pub conditions: Vec<FailureCondition>,
    /// Condition combination logic
    #[serde(default)]
    pub logic: RuleLogic,
    /// Selection strategy among the matched set
    #[serde(default)]
    pub rule_type: RuleType,
    /// Bernoulli probability for [`RuleType::Random`]
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Sample size for [`RuleType::Choice`]
    #[serde(default = "default_count")]
    pub count: usize,
    /// Attribute whose numeric value weights [`RuleType::Choice`] sampling
    #[serde(default)]
    pub weight_by: Option<String>,
}

fn default_probability() -> f64 {
    1.0
}

fn default_count() -> usize {
    1
}

impl FailureRule {
    /// Rule selecting every entity of a scope
    pub fn all(entity_scope: EntityScope) -> Self {
        Self {
            entity_scope,
            conditions: Vec::new(),
            logic: RuleLogic::Any,
            rule_type: RuleType::All,
            probability: default_probability(),
            count: default_count(),
            weight_by: None,
        }
    }

    /// Rule sampling exactly `count` entities of a scope
    pub fn choice(entity_scope: EntityScope, count: usize) -> Self {
        Self {
            rule_type: RuleType::Choice,
            count,
            ..Self::all(entity_scope)
        }
    }

    /// Rule failing each entity of a scope with probability `p`
    pub fn random(entity_scope: EntityScope, probability: f64) -> Self {
        Self {
            rule_type: RuleType::Random,
            probability,
            ..Self::all(entity_scope)
        }
    }

    /// Check rule parameters
    pub fn validate(&self) -> Result<()> {
        if self.rule_type == RuleType::Random && !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::invalid_config(format!(
                "probability {} must be within [0, 1] for rule_type 'random'",
                self.probability
            )));
        }
        for cond in &self.conditions {
            if matches!(cond.op, ConditionOp::In | ConditionOp::NotIn) && !cond.value.is_array() {
                return Err(Error::invalid_config(format!(
                    "condition on '{}' uses 'in'/'not_in' with a non-list value",
                    cond.attr
                )));
            }
        }
        Ok(())
    }

    fn matches(&self, entity: &AttrMap) -> bool {
        match self.logic {
            RuleLogic::Any => true,
            RuleLogic::And => {
                !self.conditions.is_empty() && self.conditions.iter().all(|c| c.evaluate(entity))
            }
            RuleLogic::Or => self.conditions.iter().any(|c| c.evaluate(entity)),
        }
    }

    /// Select failing entities among the matched ids. `matched` must be
    /// sorted so a given RNG stream yields one outcome.
    fn select(&self, matched: &[String], table: &BTreeMap<String, AttrMap>, rng: &mut StdRng) -> Result<Vec<String>> {
        if matched.is_empty() {
            return Ok(Vec::new());
        }
        match self.rule_type {
            RuleType::All => Ok(matched.to_vec()),
            RuleType::Random => Ok(matched
                .iter()
                .filter(|_| rng.gen::<f64>() < self.probability)
                .cloned()
                .collect()),
            RuleType::Choice => {
                let count = self.count.min(matched.len());
                match &self.weight_by {
                    None => Ok(matched
                        .choose_multiple(rng, count)
                        .cloned()
                        .collect()),
                    Some(attr) => {
                        let weights: Vec<f64> = matched
                            .iter()
                            .map(|id| {
                                table
                                    .get(id)
                                    .and_then(|attrs| lookup_path(attrs, attr))
                                    .and_then(Value::as_f64)
                                    .filter(|w| w.is_finite() && *w > 0.0)
                                    .unwrap_or(0.0)
                            })
                            .collect();
                        if weights.iter().all(|&w| w == 0.0) {
                            return Ok(matched.choose_multiple(rng, count).cloned().collect());
                        }
                        let indices: Vec<usize> = (0..matched.len()).collect();
                        let picked = indices
                            .choose_multiple_weighted(rng, count, |&i| weights[i])
                            .map_err(|e| Error::invalid_config(format!("bad choice weights: {e}")))?;
                        Ok(picked.map(|&i| matched[i].clone()).collect())
                    }
                }
            }
        }
    }
}

/// A container for failure rules plus policy-level expansion flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// Rules applied in order; the failed set is their union
    #[serde(default)]
    pub rules: Vec<FailureRule>,
    /// Arbitrary metadata (name, description, ...)
    #[serde(default)]
    pub attrs: AttrMap,
    /// Expand failures across shared risk groups to a fixed point
    #[serde(default)]
    pub fail_risk_groups: bool,
    /// When a risk group fails, fail its descendant groups too
    #[serde(default)]
    pub fail_risk_group_children: bool,
}

impl FailurePolicy {
    /// Policy with the given rules and no expansion
    pub fn new(rules: Vec<FailureRule>) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    /// Validate every rule
    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Whether the policy can actually fail anything
    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Identify which entities fail for one trial.
    ///
    /// Returns entity ids: node names, link ids, and risk-group names.
    /// Deterministic for a given RNG seed.
    pub fn apply_failures(&self, network: &Network, rng: &mut StdRng) -> Result<Vec<String>> {
        self.validate()?;

        let nodes = node_table(network);
        let links = link_table(network);
        let groups = risk_group_table(network);

        let mut failed: BTreeSet<String> = BTreeSet::new();
        for rule in &self.rules {
            let table = match rule.entity_scope {
                EntityScope::Node => &nodes,
                EntityScope::Link => &links,
                EntityScope::RiskGroup => &groups,
            };
            let matched: Vec<String> = table
                .iter()
                .filter(|(_, attrs)| rule.matches(attrs))
                .map(|(id, _)| id.clone())
                .collect();
            // BTreeMap iteration is already sorted by id
            failed.extend(rule.select(&matched, table, rng)?);
        }

        if self.fail_risk_group_children {
            expand_group_children(network, &mut failed);
        }
        if self.fail_risk_groups {
            expand_shared_risk_groups(network, &mut failed);
        }

        Ok(failed.into_iter().collect())
    }
}

/// Synthetic + declared attribute view of each node
fn node_table(network: &Network) -> BTreeMap<String, AttrMap> {
    network
        .nodes
        .values()
        .map(|node| {
            let mut attrs = node.attrs.clone();
            attrs.insert("name".into(), json!(node.name));
            attrs.insert("disabled".into(), json!(node.disabled));
            attrs.insert("risk_groups".into(), json!(node.risk_groups));
            (node.name.clone(), attrs)
        })
        .collect()
}

/// Synthetic + declared attribute view of each link
fn link_table(network: &Network) -> BTreeMap<String, AttrMap> {
    network
        .links
        .values()
        .map(|link| {
            let mut attrs = link.attrs.clone();
            attrs.insert("id".into(), json!(link.id));
            attrs.insert("source".into(), json!(link.source));
            attrs.insert("target".into(), json!(link.target));
            attrs.insert("capacity".into(), json!(link.capacity));
            attrs.insert("cost".into(), json!(link.cost));
            attrs.insert("disabled".into(), json!(link.disabled));
            attrs.insert("risk_groups".into(), json!(link.risk_groups));
            (link.id.clone(), attrs)
        })
        .collect()
}

/// Attribute view of every risk group, nested groups included
fn risk_group_table(network: &Network) -> BTreeMap<String, AttrMap> {
    let mut table = BTreeMap::new();
    let mut stack: Vec<&RiskGroup> = network.risk_groups.values().collect();
    while let Some(group) = stack.pop() {
        let mut attrs = group.attrs.clone();
        attrs.insert("name".into(), json!(group.name));
        attrs.insert("disabled".into(), json!(group.disabled));
        table.insert(group.name.clone(), attrs);
        stack.extend(group.children.iter());
    }
    table
}

/// Add descendant group names for every failed risk group
fn expand_group_children(network: &Network, failed: &mut BTreeSet<String>) {
    let mut additions: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<&RiskGroup> = network.risk_groups.values().collect();
    while let Some(group) = stack.pop() {
        if failed.contains(&group.name) {
            additions.extend(group.names_recursive().iter().map(|s| s.to_string()));
        }
        stack.extend(group.children.iter());
    }
    failed.extend(additions);
}

/// Fixed point over risk-group membership: an entity failing fails its
/// groups' other members, and a failed group fails all its members.
fn expand_shared_risk_groups(network: &Network, failed: &mut BTreeSet<String>) {
    // group name -> member entity ids
    let mut members: IndexMap<&str, Vec<&str>> = IndexMap::new();
    // entity id -> group names
    let mut groups_of: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for node in network.nodes.values() {
        for g in &node.risk_groups {
            members.entry(g.as_str()).or_default().push(node.name.as_str());
            groups_of.entry(node.name.as_str()).or_default().push(g.as_str());
        }
    }
    for link in network.links.values() {
        for g in &link.risk_groups {
            members.entry(g.as_str()).or_default().push(link.id.as_str());
            groups_of.entry(link.id.as_str()).or_default().push(g.as_str());
        }
    }

    let mut queue: VecDeque<String> = failed.iter().cloned().collect();
    while let Some(current) = queue.pop_front() {
        // A failed group takes all its members down
        let mut shared: Vec<&str> = members.get(current.as_str()).cloned().unwrap_or_default();
        // A failed entity takes its groups' members down
        if let Some(own_groups) = groups_of.get(current.as_str()) {
            for g in own_groups {
                shared.extend(members.get(g).into_iter().flatten());
            }
        }
        for id in shared {
            if failed.insert(id.to_string()) {
                queue.push_back(id.to_string());
            }
        }
    }
}

/// Named failure policies for a scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicySet {
    /// Policies by name
    #[serde(default)]
    pub policies: IndexMap<String, FailurePolicy>,
}

impl FailurePolicySet {
    /// Empty policy set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under a name
    pub fn add(&mut self, name: impl Into<String>, policy: FailurePolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Look up a policy by name
    pub fn policy(&self, name: &str) -> Result<&FailurePolicy> {
        self.policies
            .get(name)
            .ok_or_else(|| Error::unknown_reference(format!("failure policy '{name}' not found")))
    }

    /// Resolve the default policy: none when empty, the `"default"` entry
    /// when present, the sole policy when exactly one exists; ambiguous
    /// otherwise.
    pub fn default_policy(&self) -> Result<Option<&FailurePolicy>> {
        if self.policies.is_empty() {
            return Ok(None);
        }
        if let Some(policy) = self.policies.get("default") {
            return Ok(Some(policy));
        }
        if self.policies.len() == 1 {
            return Ok(self.policies.values().next());
        }
        Err(Error::invalid_config(
            "multiple failure policies exist but no 'default' policy is defined",
        ))
    }
}
