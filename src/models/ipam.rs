use serde::{Deserialize, Serialize};

use super::dcim::{Interface, NodeRef};

/// Canonical prefix status values
pub mod prefix_status {
    pub const ACTIVE: &str = "active";
    pub const CONTAINER: &str = "container";
}

/// Canonical IP address status values
pub mod ip_status {
    pub const ACTIVE: &str = "active";
}

/// Prefix role slugs used by the tunnel workflow
pub mod prefix_role {
    pub const VPN_OOBM: &str = "vpn-oobm";
    pub const VPN_X_CONNECT: &str = "vpn-x-connect";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vlan {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<i64>,
    pub name: String,
    pub vid: i32,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVlan {
    #[serde(default)]
    pub site_id: Option<i64>,
    pub name: String,
    pub vid: i32,
    pub status: String,
}

/// An IP prefix. `prefix` is canonical CIDR text; `family` is 4 or 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prefix {
    pub id: i64,
    pub prefix: String,
    pub family: u8,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    pub is_pool: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrefix {
    pub prefix: String,
    pub status: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub site_id: Option<i64>,
    #[serde(default)]
    pub vlan_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_pool: bool,
}

/// Binding of an address to either a device or a VM interface. Device
/// interfaces and VM interfaces live in separate numbering spaces, so the
/// id alone is not enough to identify the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum IfaceBinding {
    Interface(i64),
    VmInterface(i64),
}

impl IfaceBinding {
    pub fn for_interface(iface: &Interface) -> Self {
        match iface.node {
            NodeRef::Device(_) => IfaceBinding::Interface(iface.id),
            NodeRef::VirtualMachine(_) => IfaceBinding::VmInterface(iface.id),
        }
    }
}

/// An IP address with mask, optionally bound to an interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: i64,
    pub address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<IfaceBinding>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIpAddress {
    pub address: String,
    pub status: String,
    #[serde(default)]
    pub interface: Option<IfaceBinding>,
    #[serde(default)]
    pub description: String,
}
