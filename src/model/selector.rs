//! Node-group selection
//!
//! A selection expression is either a regex applied to node names
//! (anchored at the start, `re.match` style) or a strict attribute
//! directive `attr:<name>`. Both return a mapping from group label to the
//! matching node names.

use super::attrs::value_label;
use super::Node;
use crate::{Error, Result};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn attr_directive() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^attr:([A-Za-z_]\w*)$").expect("static pattern is valid"))
}

/// Select and group nodes by a selection expression.
///
/// Regex mode: the pattern must match at the start of the node name. With
/// capture groups the label is the `"|"`-join of non-empty captures;
/// without captures the label is the pattern text itself.
///
/// Directive mode (`attr:<name>`): nodes are grouped by the stringified
/// value of the named attribute; nodes lacking the attribute are omitted.
///
/// No match yields an empty mapping, not an error; required-match checks
/// live one level up in the solver wrappers.
pub fn select_node_groups<'a>(
    nodes: impl Iterator<Item = &'a Node>,
    path: &str,
) -> Result<IndexMap<String, Vec<String>>> {
    if let Some(caps) = attr_directive().captures(path) {
        let attr_name = &caps[1];
        let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
        for node in nodes {
            if let Some(value) = node.attrs.get(attr_name) {
                groups
                    .entry(value_label(value))
                    .or_default()
                    .push(node.name.clone());
            }
        }
        if groups.is_empty() {
            debug!(directive = path, "attribute directive matched no nodes");
        }
        return Ok(groups);
    }

    let pattern = Regex::new(path).map_err(|e| Error::invalid_selector(e.to_string()))?;
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for node in nodes {
        let Some(caps) = pattern.captures(&node.name) else {
            continue;
        };
        // Anchor at start: the leftmost match must begin at offset zero
        if caps.get(0).map_or(true, |m| m.start() != 0) {
            continue;
        }
        let label = if pattern.captures_len() > 1 {
            let parts: Vec<&str> = (1..pattern.captures_len())
                .filter_map(|i| caps.get(i).map(|m| m.as_str()))
                .collect();
            parts.join("|")
        } else {
            path.to_string()
        };
        groups.entry(label).or_default().push(node.name.clone());
    }
    Ok(groups)
}
