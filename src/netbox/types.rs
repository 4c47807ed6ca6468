use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- NetBox API types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceValue {
    pub value: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyValue {
    pub value: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbTag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbSite {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbRack {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub site: Option<NestedRef>,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
    #[serde(default)]
    pub u_height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbDeviceType {
    pub id: i64,
    pub model: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbDeviceRole {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbIpamRole {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbIpRef {
    pub id: i64,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbDevice {
    pub id: i64,
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<NestedRef>,
    #[serde(default)]
    pub role: Option<NestedRef>,
    #[serde(default)]
    pub site: Option<NestedRef>,
    #[serde(default)]
    pub rack: Option<NestedRef>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub asset_tag: Option<String>,
    #[serde(default)]
    pub primary_ip4: Option<NbIpRef>,
    #[serde(default)]
    pub primary_ip6: Option<NbIpRef>,
    #[serde(default)]
    pub custom_fields: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub local_context_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbVirtualMachine {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
    #[serde(default)]
    pub primary_ip4: Option<NbIpRef>,
    #[serde(default)]
    pub primary_ip6: Option<NbIpRef>,
    #[serde(default)]
    pub custom_fields: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub local_context_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbInterface {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub device: Option<NestedRef>,
    #[serde(default)]
    pub virtual_machine: Option<NestedRef>,
    #[serde(default, rename = "type")]
    pub iface_type: Option<ChoiceValue>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: Option<ChoiceValue>,
    #[serde(default)]
    pub untagged_vlan: Option<NestedRef>,
    #[serde(default)]
    pub lag: Option<NestedRef>,
    #[serde(default)]
    pub parent: Option<NestedRef>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cable: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<NbTag>,
    #[serde(default)]
    pub custom_fields: Option<HashMap<String, serde_json::Value>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbRearPort {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub device: Option<NestedRef>,
    #[serde(default, rename = "type")]
    pub port_type: Option<ChoiceValue>,
    #[serde(default)]
    pub positions: i32,
    #[serde(default)]
    pub cable: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbFrontPort {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub device: Option<NestedRef>,
    #[serde(default, rename = "type")]
    pub port_type: Option<ChoiceValue>,
    #[serde(default)]
    pub rear_port: Option<NestedRef>,
    #[serde(default)]
    pub cable: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbCable {
    pub id: i64,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbVlan {
    pub id: i64,
    pub name: String,
    pub vid: i32,
    #[serde(default)]
    pub site: Option<NestedRef>,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbPrefix {
    pub id: i64,
    pub prefix: String,
    #[serde(default)]
    pub family: Option<FamilyValue>,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
    #[serde(default)]
    pub role: Option<NestedRef>,
    #[serde(default)]
    pub site: Option<NestedRef>,
    #[serde(default)]
    pub vlan: Option<NestedRef>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_pool: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbIpAddress {
    pub id: i64,
    pub address: String,
    #[serde(default)]
    pub status: Option<ChoiceValue>,
    #[serde(default)]
    pub assigned_object_type: Option<String>,
    #[serde(default)]
    pub assigned_object_id: Option<i64>,
    #[serde(default)]
    pub description: String,
}

// --- Create request types ---

#[derive(Debug, Serialize)]
pub(crate) struct RackCreate {
    pub site: i64,
    pub name: String,
    pub status: String,
    pub u_height: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeviceCreate {
    pub name: String,
    pub device_type: i64,
    pub role: i64,
    pub site: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InterfaceCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_machine: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub iface_type: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub untagged_vlan: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagRef {
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RearPortCreate {
    pub device: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    pub positions: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct FrontPortCreate {
    pub device: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    pub rear_port: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CableTerminationRef {
    pub object_type: String,
    pub object_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CableCreate {
    pub a_terminations: Vec<CableTerminationRef>,
    pub b_terminations: Vec<CableTerminationRef>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct VlanCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<i64>,
    pub name: String,
    pub vid: i32,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PrefixCreate {
    pub prefix: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub is_pool: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct IpAddressCreate {
    pub address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_object_id: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}
