use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical device/rack status values
pub mod device_status {
    pub const PLANNED: &str = "planned";
}

/// Canonical cable status values
pub mod cable_status {
    pub const CONNECTED: &str = "connected";
    pub const PLANNED: &str = "planned";
}

/// Canonical interface 802.1Q mode values
pub mod iface_mode {
    pub const ACCESS: &str = "access";
    pub const TAGGED_ALL: &str = "tagged-all";
}

/// Canonical interface type values
pub mod iface_type {
    pub const VIRTUAL: &str = "virtual";
    pub const LAG: &str = "lag";
}

/// Canonical pass-through port connector types
pub mod port_type {
    pub const C8P8C: &str = "8p8c";
}

/// Device role slugs the workflows provision
pub mod device_role {
    pub const PATCH_PANEL: &str = "patch-panel";
    pub const SURGE_PROTECTOR: &str = "surge-protector";
    pub const SWITCH: &str = "switch";
    pub const ROUTER: &str = "router";
}

/// A node that can own interfaces: a physical device or a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Device(i64),
    VirtualMachine(i64),
}

/// One end of a cable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Termination {
    RearPort(i64),
    FrontPort(i64),
    Interface(i64),
}

/// Uniform view over a device or virtual machine, for workflows that
/// treat both alike
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub node: NodeRef,
    pub name: String,
    pub custom_fields: HashMap<String, serde_json::Value>,
    pub local_context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceType {
    pub id: i64,
    pub model: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rack {
    pub id: i64,
    pub site_id: i64,
    pub name: String,
    pub status: String,
    pub u_height: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRack {
    pub site_id: i64,
    pub name: String,
    pub status: String,
    pub u_height: i32,
}

/// Device represents a physical unit in a rack, identified by its
/// globally unique name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub device_type: String,
    pub role: String,
    pub site_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_tag: Option<String>,
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

#[derive(Debug, Clone, Deserialize)]
pub struct NewDevice {
    pub name: String,
    pub device_type: String,
    pub role: String,
    pub site_id: i64,
    #[serde(default)]
    pub rack_id: Option<i64>,
    #[serde(default)]
    pub position: Option<i32>,
    pub status: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub asset_tag: Option<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

/// Interface on a device or virtual machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub id: i64,
    pub node: NodeRef,
    pub name: String,
    pub iface_type: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub untagged_vlan: Option<i64>,
    /// Parent link-aggregate interface, when this is a LAG member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<i64>,
    /// Parent interface, when this is a virtual sub-interface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    #[serde(default)]
    pub description: String,
    /// Whether a cable terminates on this interface
    pub connected: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInterface {
    pub node: NodeRef,
    pub name: String,
    pub iface_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub untagged_vlan: Option<i64>,
    #[serde(default)]
    pub lag: Option<i64>,
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

/// Patch-panel-side half of a passive pass-through connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RearPort {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    pub port_type: String,
    pub positions: i32,
    /// Whether a cable terminates on this port
    pub connected: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRearPort {
    pub device_id: i64,
    pub name: String,
    pub port_type: String,
    #[serde(default = "default_positions")]
    pub positions: i32,
}

fn default_positions() -> i32 {
    1
}

/// Equipment-side half of a passive pass-through connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontPort {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    pub port_type: String,
    pub rear_port_id: i64,
    pub connected: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFrontPort {
    pub device_id: i64,
    pub name: String,
    pub port_type: String,
    pub rear_port_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cable {
    pub id: i64,
    pub a: Termination,
    pub b: Termination,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCable {
    pub a: Termination,
    pub b: Termination,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}
