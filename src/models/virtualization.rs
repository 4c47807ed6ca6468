use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: i64,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_ip4: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_ip6: Option<i64>,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
    /// Host-side config context (e.g. WireGuard key material)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_context: Option<serde_json::Value>,
}
