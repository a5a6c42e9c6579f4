//! Attribute bags
//!
//! Nodes, links, and risk groups carry an opaque attribute map whose values
//! are [`serde_json::Value`] variants (string, number, bool, list, map).
//! The selector's `attr:` directive and the failure-policy conditions both
//! operate on these bags. Equality and ordering are defined only when both
//! operands belong to the same variant family; cross-type comparisons
//! evaluate to false.

use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;

/// Attribute bag attached to model entities
pub type AttrMap = IndexMap<String, Value>;

/// Look up a possibly dotted path (`facility.building_id`) in an attribute
/// bag, descending into nested maps.
pub fn lookup_path<'a>(attrs: &'a AttrMap, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = attrs.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Group label for an attribute value: bare text for strings, canonical
/// JSON for everything else.
pub fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality across bags: numbers compare numerically regardless of their
/// JSON representation, everything else by deep equality within the same
/// variant.
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

/// Ordering is defined for number pairs and string pairs only
pub fn values_cmp(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Some(a.cmp(b));
    }
    None
}

/// Membership: substring for strings, element for arrays, key for maps
pub fn value_contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|n| map.contains_key(n)),
        _ => false,
    }
}
