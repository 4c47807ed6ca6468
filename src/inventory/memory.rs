use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{
    Cable, Device, DeviceType, FrontPort, Interface, IpAddress, NewCable, NewDevice,
    NewFrontPort, NewInterface, NewIpAddress, NewPrefix, NewRack, NewRearPort, NewVlan, NodeRef,
    NodeView, Prefix, Rack, RearPort, Site, Tag, Termination, VirtualMachine, Vlan,
};
use crate::utils::CidrBlock;

use super::{AmbiguousKeyError, Inventory};

/// A registered device type with the component templates the host
/// instantiates when a device of this type is created
#[derive(Debug, Clone)]
struct DeviceTypeTemplate {
    device_type: DeviceType,
    interfaces: Vec<(String, String)>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    sites: Vec<Site>,
    racks: Vec<Rack>,
    device_types: Vec<DeviceTypeTemplate>,
    devices: Vec<Device>,
    vms: Vec<VirtualMachine>,
    interfaces: Vec<Interface>,
    rear_ports: Vec<RearPort>,
    front_ports: Vec<FrontPort>,
    cables: Vec<Cable>,
    vlans: Vec<Vlan>,
    prefixes: Vec<Prefix>,
    ips: Vec<IpAddress>,
    tags: Vec<Tag>,
}

impl State {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory inventory used by tests and dry runs. Behaves like the real
/// host: ids are assigned sequentially, device names are unique, device
/// creation instantiates the type's interface templates, and cabling a
/// linked termination is rejected.
pub struct MemoryInventory {
    state: RwLock<State>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn connect_termination(state: &mut State, t: Termination) -> Result<()> {
        match t {
            Termination::RearPort(id) => {
                let port = state
                    .rear_ports
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| anyhow::anyhow!("Rear port {} not found", id))?;
                if port.connected {
                    bail!("Rear port '{}' is already cabled", port.name);
                }
                port.connected = true;
            }
            Termination::FrontPort(id) => {
                let port = state
                    .front_ports
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| anyhow::anyhow!("Front port {} not found", id))?;
                if port.connected {
                    bail!("Front port '{}' is already cabled", port.name);
                }
                port.connected = true;
            }
            Termination::Interface(id) => {
                let iface = state
                    .interfaces
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or_else(|| anyhow::anyhow!("Interface {} not found", id))?;
                if iface.connected {
                    bail!("Interface '{}' is already cabled", iface.name);
                }
                iface.connected = true;
            }
        }
        Ok(())
    }

    fn is_connected(state: &State, t: Termination) -> bool {
        match t {
            Termination::RearPort(id) => state
                .rear_ports
                .iter()
                .any(|p| p.id == id && p.connected),
            Termination::FrontPort(id) => state
                .front_ports
                .iter()
                .any(|p| p.id == id && p.connected),
            Termination::Interface(id) => state
                .interfaces
                .iter()
                .any(|i| i.id == id && i.connected),
        }
    }
}

/// Seed helpers for tests. Sites, device types, VMs, and tags are never
/// created by the workflows, so the trait has no constructors for them.
#[cfg(test)]
impl MemoryInventory {
    pub async fn add_site(&self, name: &str, slug: &str, status: &str) -> Site {
        let mut state = self.state.write().await;
        let site = Site {
            id: state.alloc_id(),
            name: name.to_string(),
            slug: slug.to_string(),
            status: status.to_string(),
        };
        state.sites.push(site.clone());
        site
    }

    /// Register a device type and the interface templates instantiated on
    /// device creation
    pub async fn register_device_type(
        &self,
        model: &str,
        slug: &str,
        interfaces: &[(&str, &str)],
    ) -> DeviceType {
        let mut state = self.state.write().await;
        let device_type = DeviceType {
            id: state.alloc_id(),
            model: model.to_string(),
            slug: slug.to_string(),
        };
        state.device_types.push(DeviceTypeTemplate {
            device_type: device_type.clone(),
            interfaces: interfaces
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
        });
        device_type
    }

    /// Seed a virtual machine
    pub async fn add_vm(
        &self,
        name: &str,
        status: &str,
        custom_fields: HashMap<String, serde_json::Value>,
        local_context: Option<serde_json::Value>,
    ) -> VirtualMachine {
        let mut state = self.state.write().await;
        let vm = VirtualMachine {
            id: state.alloc_id(),
            name: name.to_string(),
            status: status.to_string(),
            primary_ip4: None,
            primary_ip6: None,
            custom_fields,
            local_context,
        };
        state.vms.push(vm.clone());
        vm
    }

    /// Seed a tag
    pub async fn add_tag(&self, name: &str, slug: &str) -> Tag {
        let mut state = self.state.write().await;
        let tag = Tag {
            id: state.alloc_id(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        state.tags.push(tag.clone());
        tag
    }

    /// Push a device record directly, bypassing the unique-name check.
    /// Lets tests reproduce hosts with conflicting data.
    pub async fn add_device_raw(&self, mut device: Device) -> Device {
        let mut state = self.state.write().await;
        device.id = state.alloc_id();
        state.devices.push(device.clone());
        device
    }
}

/// Sort port lists the way an operator reads them: numerically when the
/// names are numbers, lexically otherwise
fn port_sort_key(name: &str) -> (Option<i64>, String) {
    (name.parse::<i64>().ok(), name.to_string())
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>> {
        let state = self.state.read().await;
        let matches: Vec<_> = state.sites.iter().filter(|s| s.name == name).collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            n => Err(AmbiguousKeyError {
                kind: "site",
                key: name.to_string(),
                count: n,
            }
            .into()),
        }
    }

    async fn find_rack(&self, site_id: i64, name: &str) -> Result<Option<Rack>> {
        let state = self.state.read().await;
        Ok(state
            .racks
            .iter()
            .find(|r| r.site_id == site_id && r.name == name)
            .cloned())
    }

    async fn create_rack(&self, rack: NewRack) -> Result<Rack> {
        let mut state = self.state.write().await;
        if !state.sites.iter().any(|s| s.id == rack.site_id) {
            bail!("Site {} not found", rack.site_id);
        }
        let stored = Rack {
            id: state.alloc_id(),
            site_id: rack.site_id,
            name: rack.name,
            status: rack.status,
            u_height: rack.u_height,
        };
        state.racks.push(stored.clone());
        Ok(stored)
    }

    async fn find_device_type(&self, slug: &str) -> Result<Option<DeviceType>> {
        let state = self.state.read().await;
        Ok(state
            .device_types
            .iter()
            .find(|t| t.device_type.slug == slug)
            .map(|t| t.device_type.clone()))
    }

    async fn get_device_by_name(&self, name: &str) -> Result<Option<Device>> {
        let state = self.state.read().await;
        let matches: Vec<_> = state.devices.iter().filter(|d| d.name == name).collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            n => Err(AmbiguousKeyError {
                kind: "device",
                key: name.to_string(),
                count: n,
            }
            .into()),
        }
    }

    async fn create_device(&self, device: NewDevice) -> Result<Device> {
        let mut state = self.state.write().await;
        if state.devices.iter().any(|d| d.name == device.name) {
            bail!("Device '{}' already exists", device.name);
        }
        let template = state
            .device_types
            .iter()
            .find(|t| t.device_type.slug == device.device_type)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Device type '{}' not found", device.device_type))?;

        let stored = Device {
            id: state.alloc_id(),
            name: device.name,
            device_type: device.device_type,
            role: device.role,
            site_id: device.site_id,
            rack_id: device.rack_id,
            position: device.position,
            status: device.status,
            serial: device.serial,
            asset_tag: device.asset_tag,
            primary_ip4: None,
            primary_ip6: None,
            custom_fields: device.custom_fields,
            local_context: None,
        };
        state.devices.push(stored.clone());

        // The host instantiates the type's component templates
        for (name, iface_type) in &template.interfaces {
            let id = state.alloc_id();
            state.interfaces.push(Interface {
                id,
                node: NodeRef::Device(stored.id),
                name: name.clone(),
                iface_type: iface_type.clone(),
                enabled: true,
                mode: None,
                untagged_vlan: None,
                lag: None,
                parent: None,
                description: String::new(),
                connected: false,
                tags: Vec::new(),
                custom_fields: HashMap::new(),
            });
        }

        Ok(stored)
    }

    async fn update_device(&self, device: &Device) -> Result<Device> {
        let mut state = self.state.write().await;
        let slot = state
            .devices
            .iter_mut()
            .find(|d| d.id == device.id)
            .ok_or_else(|| anyhow::anyhow!("Device {} not found", device.id))?;
        *slot = device.clone();
        Ok(slot.clone())
    }

    async fn get_vm_by_name(&self, name: &str) -> Result<Option<VirtualMachine>> {
        let state = self.state.read().await;
        let matches: Vec<_> = state.vms.iter().filter(|v| v.name == name).collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            n => Err(AmbiguousKeyError {
                kind: "virtual machine",
                key: name.to_string(),
                count: n,
            }
            .into()),
        }
    }

    async fn get_node(&self, node: NodeRef) -> Result<Option<NodeView>> {
        let state = self.state.read().await;
        Ok(match node {
            NodeRef::Device(id) => state.devices.iter().find(|d| d.id == id).map(|d| NodeView {
                node,
                name: d.name.clone(),
                custom_fields: d.custom_fields.clone(),
                local_context: d.local_context.clone(),
            }),
            NodeRef::VirtualMachine(id) => {
                state.vms.iter().find(|v| v.id == id).map(|v| NodeView {
                    node,
                    name: v.name.clone(),
                    custom_fields: v.custom_fields.clone(),
                    local_context: v.local_context.clone(),
                })
            }
        })
    }

    async fn list_interfaces(&self, node: NodeRef) -> Result<Vec<Interface>> {
        let state = self.state.read().await;
        Ok(state
            .interfaces
            .iter()
            .filter(|i| i.node == node)
            .cloned()
            .collect())
    }

    async fn find_interface(&self, node: NodeRef, name: &str) -> Result<Option<Interface>> {
        let state = self.state.read().await;
        Ok(state
            .interfaces
            .iter()
            .find(|i| i.node == node && i.name == name)
            .cloned())
    }

    async fn create_interface(&self, iface: NewInterface) -> Result<Interface> {
        let mut state = self.state.write().await;
        if state
            .interfaces
            .iter()
            .any(|i| i.node == iface.node && i.name == iface.name)
        {
            bail!("Interface '{}' already exists on this node", iface.name);
        }
        let stored = Interface {
            id: state.alloc_id(),
            node: iface.node,
            name: iface.name,
            iface_type: iface.iface_type,
            enabled: iface.enabled,
            mode: iface.mode,
            untagged_vlan: iface.untagged_vlan,
            lag: iface.lag,
            parent: iface.parent,
            description: iface.description,
            connected: false,
            tags: iface.tags,
            custom_fields: iface.custom_fields,
        };
        state.interfaces.push(stored.clone());
        Ok(stored)
    }

    async fn update_interface(&self, iface: &Interface) -> Result<Interface> {
        let mut state = self.state.write().await;
        let slot = state
            .interfaces
            .iter_mut()
            .find(|i| i.id == iface.id)
            .ok_or_else(|| anyhow::anyhow!("Interface {} not found", iface.id))?;
        *slot = iface.clone();
        Ok(slot.clone())
    }

    async fn list_rear_ports(&self, device_id: i64) -> Result<Vec<RearPort>> {
        let state = self.state.read().await;
        let mut ports: Vec<_> = state
            .rear_ports
            .iter()
            .filter(|p| p.device_id == device_id)
            .cloned()
            .collect();
        ports.sort_by_key(|p| port_sort_key(&p.name));
        Ok(ports)
    }

    async fn list_front_ports(&self, device_id: i64) -> Result<Vec<FrontPort>> {
        let state = self.state.read().await;
        let mut ports: Vec<_> = state
            .front_ports
            .iter()
            .filter(|p| p.device_id == device_id)
            .cloned()
            .collect();
        ports.sort_by_key(|p| port_sort_key(&p.name));
        Ok(ports)
    }

    async fn create_rear_port(&self, port: NewRearPort) -> Result<RearPort> {
        let mut state = self.state.write().await;
        if state
            .rear_ports
            .iter()
            .any(|p| p.device_id == port.device_id && p.name == port.name)
        {
            bail!("Rear port '{}' already exists on device", port.name);
        }
        let stored = RearPort {
            id: state.alloc_id(),
            device_id: port.device_id,
            name: port.name,
            port_type: port.port_type,
            positions: port.positions,
            connected: false,
        };
        state.rear_ports.push(stored.clone());
        Ok(stored)
    }

    async fn create_front_port(&self, port: NewFrontPort) -> Result<FrontPort> {
        let mut state = self.state.write().await;
        if state
            .front_ports
            .iter()
            .any(|p| p.device_id == port.device_id && p.name == port.name)
        {
            bail!("Front port '{}' already exists on device", port.name);
        }
        if !state.rear_ports.iter().any(|p| p.id == port.rear_port_id) {
            bail!("Rear port {} not found", port.rear_port_id);
        }
        let stored = FrontPort {
            id: state.alloc_id(),
            device_id: port.device_id,
            name: port.name,
            port_type: port.port_type,
            rear_port_id: port.rear_port_id,
            connected: false,
        };
        state.front_ports.push(stored.clone());
        Ok(stored)
    }

    async fn create_cable(&self, cable: NewCable) -> Result<Cable> {
        let mut state = self.state.write().await;
        if Self::is_connected(&state, cable.a) {
            bail!("A-side termination is already cabled");
        }
        if Self::is_connected(&state, cable.b) {
            bail!("B-side termination is already cabled");
        }
        Self::connect_termination(&mut state, cable.a)?;
        Self::connect_termination(&mut state, cable.b)?;
        let stored = Cable {
            id: state.alloc_id(),
            a: cable.a,
            b: cable.b,
            status: cable.status,
        };
        state.cables.push(stored.clone());
        Ok(stored)
    }

    async fn find_vlan(&self, site_id: i64, name: &str) -> Result<Option<Vlan>> {
        let state = self.state.read().await;
        Ok(state
            .vlans
            .iter()
            .find(|v| v.site_id == Some(site_id) && v.name == name)
            .cloned())
    }

    async fn create_vlan(&self, vlan: NewVlan) -> Result<Vlan> {
        let mut state = self.state.write().await;
        let stored = Vlan {
            id: state.alloc_id(),
            site_id: vlan.site_id,
            name: vlan.name,
            vid: vlan.vid,
            status: vlan.status,
        };
        state.vlans.push(stored.clone());
        Ok(stored)
    }

    async fn find_prefix(&self, prefix: &str) -> Result<Option<Prefix>> {
        let wanted = CidrBlock::parse(prefix).map_err(anyhow::Error::msg)?;
        let state = self.state.read().await;
        Ok(state
            .prefixes
            .iter()
            .find(|p| CidrBlock::parse(&p.prefix).map(|b| b == wanted).unwrap_or(false))
            .cloned())
    }

    async fn list_prefixes_within(&self, container: &str) -> Result<Vec<Prefix>> {
        let outer = CidrBlock::parse(container).map_err(anyhow::Error::msg)?;
        let state = self.state.read().await;
        let mut inside: Vec<(CidrBlock, Prefix)> = state
            .prefixes
            .iter()
            .filter_map(|p| CidrBlock::parse(&p.prefix).ok().map(|b| (b, p.clone())))
            .filter(|(b, _)| *b != outer && outer.contains(b))
            .collect();
        inside.sort_by_key(|(b, _)| (b.network, b.prefix_len));
        Ok(inside.into_iter().map(|(_, p)| p).collect())
    }

    async fn list_prefixes_by_role(&self, role: &str, family: u8) -> Result<Vec<Prefix>> {
        let state = self.state.read().await;
        Ok(state
            .prefixes
            .iter()
            .filter(|p| p.family == family && p.role.as_deref() == Some(role))
            .cloned()
            .collect())
    }

    async fn create_prefix(&self, prefix: NewPrefix) -> Result<Prefix> {
        let block = CidrBlock::parse(&prefix.prefix).map_err(anyhow::Error::msg)?;
        let mut state = self.state.write().await;
        if state
            .prefixes
            .iter()
            .any(|p| CidrBlock::parse(&p.prefix).map(|b| b == block).unwrap_or(false))
        {
            bail!("Prefix '{}' already exists", prefix.prefix);
        }
        let stored = Prefix {
            id: state.alloc_id(),
            prefix: block.to_string(),
            family: block.family,
            status: prefix.status,
            role: prefix.role,
            site_id: prefix.site_id,
            vlan_id: prefix.vlan_id,
            description: prefix.description,
            is_pool: prefix.is_pool,
        };
        state.prefixes.push(stored.clone());
        Ok(stored)
    }

    async fn find_ip(&self, address: &str) -> Result<Option<IpAddress>> {
        let state = self.state.read().await;
        Ok(state.ips.iter().find(|ip| ip.address == address).cloned())
    }

    async fn create_ip(&self, ip: NewIpAddress) -> Result<IpAddress> {
        let mut state = self.state.write().await;
        let stored = IpAddress {
            id: state.alloc_id(),
            address: ip.address,
            status: ip.status,
            interface: ip.interface,
            description: ip.description,
        };
        state.ips.push(stored.clone());
        Ok(stored)
    }

    async fn find_tag(&self, slug: &str) -> Result<Option<Tag>> {
        let state = self.state.read().await;
        Ok(state.tags.iter().find(|t| t.slug == slug).cloned())
    }
}
