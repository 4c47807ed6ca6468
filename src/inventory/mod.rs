use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

use crate::models::{
    Cable, Device, DeviceType, FrontPort, Interface, IpAddress, NewCable, NewDevice,
    NewFrontPort, NewInterface, NewIpAddress, NewPrefix, NewRack, NewRearPort, NewVlan, NodeRef,
    NodeView, Prefix, Rack, RearPort, Site, Tag, VirtualMachine, Vlan,
};

pub mod memory;

pub use memory::MemoryInventory;

/// Returned when a lookup by a supposedly unique key matches more than
/// one object in the host inventory
#[derive(Debug, Clone)]
pub struct AmbiguousKeyError {
    pub kind: &'static str,
    pub key: String,
    pub count: usize,
}

impl fmt::Display for AmbiguousKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lookup for '{}' matched {} objects, expected at most one",
            self.kind, self.key, self.count
        )
    }
}

impl std::error::Error for AmbiguousKeyError {}

/// Repository interface over the host DCIM/IPAM inventory.
///
/// Lookups by unique key return `Ok(None)` when absent and an
/// [`AmbiguousKeyError`] (through anyhow) when the key is not unique on
/// the host. Create operations return the stored object with its id.
#[async_trait]
pub trait Inventory: Send + Sync {
    // Sites and racks
    async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>>;
    async fn find_rack(&self, site_id: i64, name: &str) -> Result<Option<Rack>>;
    async fn create_rack(&self, rack: NewRack) -> Result<Rack>;

    // Devices and virtual machines
    async fn find_device_type(&self, slug: &str) -> Result<Option<DeviceType>>;
    async fn get_device_by_name(&self, name: &str) -> Result<Option<Device>>;
    async fn create_device(&self, device: NewDevice) -> Result<Device>;
    async fn update_device(&self, device: &Device) -> Result<Device>;
    async fn get_vm_by_name(&self, name: &str) -> Result<Option<VirtualMachine>>;
    async fn get_node(&self, node: NodeRef) -> Result<Option<NodeView>>;

    // Interfaces
    async fn list_interfaces(&self, node: NodeRef) -> Result<Vec<Interface>>;
    async fn find_interface(&self, node: NodeRef, name: &str) -> Result<Option<Interface>>;
    async fn create_interface(&self, iface: NewInterface) -> Result<Interface>;
    async fn update_interface(&self, iface: &Interface) -> Result<Interface>;

    // Pass-through ports
    async fn list_rear_ports(&self, device_id: i64) -> Result<Vec<RearPort>>;
    async fn list_front_ports(&self, device_id: i64) -> Result<Vec<FrontPort>>;
    async fn create_rear_port(&self, port: NewRearPort) -> Result<RearPort>;
    async fn create_front_port(&self, port: NewFrontPort) -> Result<FrontPort>;

    // Cables
    async fn create_cable(&self, cable: NewCable) -> Result<Cable>;

    // VLANs and prefixes
    async fn find_vlan(&self, site_id: i64, name: &str) -> Result<Option<Vlan>>;
    async fn create_vlan(&self, vlan: NewVlan) -> Result<Vlan>;
    async fn find_prefix(&self, prefix: &str) -> Result<Option<Prefix>>;
    /// Prefixes strictly contained in `container` (not the container itself)
    async fn list_prefixes_within(&self, container: &str) -> Result<Vec<Prefix>>;
    async fn list_prefixes_by_role(&self, role: &str, family: u8) -> Result<Vec<Prefix>>;
    async fn create_prefix(&self, prefix: NewPrefix) -> Result<Prefix>;

    // IP addresses
    async fn find_ip(&self, address: &str) -> Result<Option<IpAddress>>;
    async fn create_ip(&self, ip: NewIpAddress) -> Result<IpAddress>;

    // Tags
    async fn find_tag(&self, slug: &str) -> Result<Option<Tag>>;
}
