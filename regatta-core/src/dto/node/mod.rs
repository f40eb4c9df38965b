//! Node DTOs

use serde::{Deserialize, Serialize};

/// Request to register a node explicitly.
///
/// A missing or empty name is rejected by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub is_vm: Option<bool>,
}

/// Patch applied to an existing node. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNode {
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub is_vm: Option<bool>,
}
