//! Coordination labels and annotations shared by the operator and proxy

/// Node is claimed for an upgrade or rollback
pub const LABEL_UPGRADING: &str = "upgrade.fleetos.io/upgrading";

/// Node is claimed for a configuration change
pub const LABEL_CONFIGURING: &str = "upgrade.fleetos.io/configuring";

/// Targeting label matched against `DesiredStateSpec::node_selector`
pub const LABEL_NODE_SELECTOR: &str = "upgrade.fleetos.io/node-selector";

/// Control-plane markers; presence excludes a node from scheduling
pub const LABEL_MASTER: &str = "node-role.kubernetes.io/master";
pub const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";

/// Selector value that matches nodes without the node-selector label
pub const NODE_SELECTOR_NONE: &str = "no-label";

/// Set by the proxy on nodes it cordoned, so it only uncordons its own work
pub const ANNOTATION_CORDONED_BY_PROXY: &str = "upgrade.fleetos.io/cordoned-by-proxy";
