//! Node domain types
//!
//! Nodes have two origins that are never conflated: an explicit row created
//! through node CRUD, and the derived "observed" set of names referenced by
//! job targets. An observed-only node has default attributes.

use serde::{Deserialize, Serialize};

/// A named execution target that jobs reference through their `targets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    pub is_vm: bool,
}

impl Node {
    /// A node known only from job targets, with no explicit row.
    pub fn observed(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            locked: false,
            machine_type: None,
            is_vm: false,
        }
    }
}

/// Node name referenced by a job target key.
///
/// Target keys may carry a `user@host` prefix; the node name is the host
/// part after the last `@`.
pub fn node_name_from_target(key: &str) -> &str {
    key.rsplit('@').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_key_host_part_is_node_name() {
        assert_eq!(node_name_from_target("ubuntu@smithi001"), "smithi001");
        assert_eq!(node_name_from_target("smithi001"), "smithi001");
        assert_eq!(node_name_from_target("u@h@t3"), "t3");
    }
}
