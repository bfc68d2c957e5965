//! Label selectors
//!
//! Node lists are filtered with kube-core [`Selector`]s. The same selector is
//! sent as the `labelSelector` of a list call and evaluated locally by the
//! mock client and the proxy.

use crds::{LABEL_NODE_SELECTOR, NODE_SELECTOR_NONE};
use std::collections::BTreeMap;

pub use kube::core::{Expression, Selector, SelectorExt};

/// Expression selecting the nodes targeted by a rollout's node selector.
///
/// `None` targets every node, `NODE_SELECTOR_NONE` targets nodes without
/// the selector label, any other value must match exactly.
pub fn for_node_selector(node_selector: Option<&str>) -> Option<Expression> {
    match node_selector.map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(NODE_SELECTOR_NONE) => Some(Expression::DoesNotExist(LABEL_NODE_SELECTOR.to_string())),
        Some(value) => Some(Expression::Equal(LABEL_NODE_SELECTOR.to_string(), value.to_string())),
    }
}

/// Evaluates a selector against an object's labels. Missing labels behave
/// like an empty map.
pub fn selector_matches(selector: &Selector, labels: Option<&BTreeMap<String, String>>) -> bool {
    match labels {
        Some(labels) => selector.matches(labels),
        None => selector.matches(&BTreeMap::new()),
    }
}
