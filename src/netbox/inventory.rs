use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::inventory::{AmbiguousKeyError, Inventory};
use crate::models::{
    Cable, Device, DeviceType, FrontPort, IfaceBinding, Interface, IpAddress, NewCable,
    NewDevice, NewFrontPort, NewInterface, NewIpAddress, NewPrefix, NewRack, NewRearPort, NewVlan,
    NodeRef, NodeView, Prefix, Rack, RearPort, Site, Tag, Termination, VirtualMachine, Vlan,
};
use crate::utils::CidrBlock;

use super::client::NetBoxClient;
use super::types::*;

/// Inventory backed by a live NetBox instance. Each trait method maps to
/// one or two API calls; unique-key lookups surface ambiguity as a typed
/// error instead of silently picking the first match.
pub struct NetBoxInventory {
    client: NetBoxClient,
}

impl NetBoxInventory {
    pub fn new(client: NetBoxClient) -> Self {
        Self { client }
    }
}

fn unique<T>(kind: &'static str, key: &str, mut matches: Vec<T>) -> Result<Option<T>> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches.remove(0))),
        n => Err(AmbiguousKeyError {
            kind,
            key: key.to_string(),
            count: n,
        }
        .into()),
    }
}

fn nested_id(nested: &Option<NestedRef>) -> Option<i64> {
    nested.as_ref().map(|n| n.id)
}

fn nested_slug(nested: &Option<NestedRef>) -> String {
    nested
        .as_ref()
        .map(|n| n.slug.clone().unwrap_or_else(|| n.name.clone()))
        .unwrap_or_default()
}

fn choice_value(choice: &Option<ChoiceValue>) -> String {
    choice.as_ref().map(|c| c.value.clone()).unwrap_or_default()
}

fn termination_ref(t: Termination) -> CableTerminationRef {
    match t {
        Termination::RearPort(id) => CableTerminationRef {
            object_type: "dcim.rearport".to_string(),
            object_id: id,
        },
        Termination::FrontPort(id) => CableTerminationRef {
            object_type: "dcim.frontport".to_string(),
            object_id: id,
        },
        Termination::Interface(id) => CableTerminationRef {
            object_type: "dcim.interface".to_string(),
            object_id: id,
        },
    }
}

fn site_from(nb: NbSite) -> Site {
    Site {
        id: nb.id,
        name: nb.name,
        slug: nb.slug,
        status: choice_value(&nb.status),
    }
}

fn rack_from(nb: NbRack) -> Rack {
    Rack {
        id: nb.id,
        site_id: nested_id(&nb.site).unwrap_or_default(),
        name: nb.name,
        status: choice_value(&nb.status),
        u_height: nb.u_height,
    }
}

fn device_from(nb: NbDevice) -> Device {
    Device {
        id: nb.id,
        name: nb.name.unwrap_or_default(),
        device_type: nested_slug(&nb.device_type),
        role: nested_slug(&nb.role),
        site_id: nested_id(&nb.site).unwrap_or_default(),
        rack_id: nested_id(&nb.rack),
        position: nb.position.map(|p| p as i32),
        status: choice_value(&nb.status),
        serial: if nb.serial.is_empty() {
            None
        } else {
            Some(nb.serial)
        },
        asset_tag: nb.asset_tag,
        primary_ip4: nb.primary_ip4.map(|ip| ip.id),
        primary_ip6: nb.primary_ip6.map(|ip| ip.id),
        custom_fields: nb.custom_fields.unwrap_or_default(),
        local_context: nb.local_context_data,
    }
}

fn vm_from(nb: NbVirtualMachine) -> VirtualMachine {
    VirtualMachine {
        id: nb.id,
        name: nb.name,
        status: choice_value(&nb.status),
        primary_ip4: nb.primary_ip4.map(|ip| ip.id),
        primary_ip6: nb.primary_ip6.map(|ip| ip.id),
        custom_fields: nb.custom_fields.unwrap_or_default(),
        local_context: nb.local_context_data,
    }
}

fn interface_from(nb: NbInterface, node: NodeRef) -> Interface {
    Interface {
        id: nb.id,
        node,
        name: nb.name,
        iface_type: nb
            .iface_type
            .as_ref()
            .map(|t| t.value.clone())
            .unwrap_or_default(),
        enabled: nb.enabled,
        mode: nb.mode.as_ref().map(|m| m.value.clone()),
        untagged_vlan: nested_id(&nb.untagged_vlan),
        lag: nested_id(&nb.lag),
        parent: nested_id(&nb.parent),
        description: nb.description,
        connected: nb.cable.as_ref().map(|c| !c.is_null()).unwrap_or(false),
        tags: nb.tags.into_iter().map(|t| t.slug).collect(),
        custom_fields: nb.custom_fields.unwrap_or_default(),
    }
}

fn rear_port_from(nb: NbRearPort) -> RearPort {
    RearPort {
        id: nb.id,
        device_id: nested_id(&nb.device).unwrap_or_default(),
        name: nb.name,
        port_type: nb
            .port_type
            .as_ref()
            .map(|t| t.value.clone())
            .unwrap_or_default(),
        positions: nb.positions,
        connected: nb.cable.as_ref().map(|c| !c.is_null()).unwrap_or(false),
    }
}

fn front_port_from(nb: NbFrontPort) -> FrontPort {
    FrontPort {
        id: nb.id,
        device_id: nested_id(&nb.device).unwrap_or_default(),
        name: nb.name,
        port_type: nb
            .port_type
            .as_ref()
            .map(|t| t.value.clone())
            .unwrap_or_default(),
        rear_port_id: nested_id(&nb.rear_port).unwrap_or_default(),
        connected: nb.cable.as_ref().map(|c| !c.is_null()).unwrap_or(false),
    }
}

fn prefix_from(nb: NbPrefix) -> Prefix {
    let family = nb
        .family
        .as_ref()
        .map(|f| f.value)
        .unwrap_or(if nb.prefix.contains(':') { 6 } else { 4 });
    Prefix {
        id: nb.id,
        family,
        status: choice_value(&nb.status),
        role: nb.role.as_ref().map(|_| nested_slug(&nb.role)),
        site_id: nested_id(&nb.site),
        vlan_id: nested_id(&nb.vlan),
        description: nb.description,
        is_pool: nb.is_pool,
        prefix: nb.prefix,
    }
}

fn ip_from(nb: NbIpAddress) -> IpAddress {
    let interface = match nb.assigned_object_type.as_deref() {
        Some("dcim.interface") => nb.assigned_object_id.map(IfaceBinding::Interface),
        Some("virtualization.vminterface") => nb.assigned_object_id.map(IfaceBinding::VmInterface),
        _ => None,
    };
    IpAddress {
        id: nb.id,
        address: nb.address,
        status: choice_value(&nb.status),
        interface,
        description: nb.description,
    }
}

fn binding_parts(binding: Option<IfaceBinding>) -> (Option<String>, Option<i64>) {
    match binding {
        Some(IfaceBinding::Interface(id)) => (Some("dcim.interface".to_string()), Some(id)),
        Some(IfaceBinding::VmInterface(id)) => {
            (Some("virtualization.vminterface".to_string()), Some(id))
        }
        None => (None, None),
    }
}

fn interface_patch(iface: &Interface) -> serde_json::Value {
    json!({
        "enabled": iface.enabled,
        "mode": iface.mode,
        "untagged_vlan": iface.untagged_vlan,
        "lag": iface.lag,
        "parent": iface.parent,
        "description": iface.description,
        "tags": iface.tags.iter().map(|slug| json!({ "slug": slug })).collect::<Vec<_>>(),
        "custom_fields": iface.custom_fields,
    })
}

#[async_trait]
impl Inventory for NetBoxInventory {
    async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>> {
        let matches = self.client.get_sites_by_name(name).await?;
        Ok(unique("site", name, matches)?.map(site_from))
    }

    async fn find_rack(&self, site_id: i64, name: &str) -> Result<Option<Rack>> {
        let matches = self.client.get_racks(site_id, name).await?;
        Ok(unique("rack", name, matches)?.map(rack_from))
    }

    async fn create_rack(&self, rack: NewRack) -> Result<Rack> {
        let created = self
            .client
            .create_rack(&RackCreate {
                site: rack.site_id,
                name: rack.name,
                status: rack.status,
                u_height: rack.u_height,
            })
            .await?;
        Ok(rack_from(created))
    }

    async fn find_device_type(&self, slug: &str) -> Result<Option<DeviceType>> {
        Ok(self
            .client
            .get_device_type_by_slug(slug)
            .await?
            .map(|t| DeviceType {
                id: t.id,
                model: t.model,
                slug: t.slug,
            }))
    }

    async fn get_device_by_name(&self, name: &str) -> Result<Option<Device>> {
        let matches = self.client.get_devices_by_name(name).await?;
        Ok(unique("device", name, matches)?.map(device_from))
    }

    async fn create_device(&self, device: NewDevice) -> Result<Device> {
        let device_type = self
            .client
            .get_device_type_by_slug(&device.device_type)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Device type '{}' not found", device.device_type))?;
        let role = self
            .client
            .get_role_by_slug(&device.role)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Device role '{}' not found", device.role))?;
        let created = self
            .client
            .create_device(&DeviceCreate {
                name: device.name,
                device_type: device_type.id,
                role: role.id,
                site: device.site_id,
                status: device.status,
                rack: device.rack_id,
                position: device.position,
                serial: device.serial,
                asset_tag: device.asset_tag,
                custom_fields: if device.custom_fields.is_empty() {
                    None
                } else {
                    Some(device.custom_fields)
                },
            })
            .await?;
        Ok(device_from(created))
    }

    async fn update_device(&self, device: &Device) -> Result<Device> {
        let patch = json!({
            "status": device.status,
            "serial": device.serial.clone().unwrap_or_default(),
            "asset_tag": device.asset_tag,
            "primary_ip4": device.primary_ip4,
            "primary_ip6": device.primary_ip6,
            "custom_fields": device.custom_fields,
        });
        let updated = self.client.patch_device(device.id, &patch).await?;
        Ok(device_from(updated))
    }

    async fn get_vm_by_name(&self, name: &str) -> Result<Option<VirtualMachine>> {
        let matches = self.client.get_vms_by_name(name).await?;
        Ok(unique("virtual machine", name, matches)?.map(vm_from))
    }

    async fn get_node(&self, node: NodeRef) -> Result<Option<NodeView>> {
        Ok(match node {
            NodeRef::Device(id) => self.client.get_device(id).await?.map(|nb| {
                let device = device_from(nb);
                NodeView {
                    node,
                    name: device.name,
                    custom_fields: device.custom_fields,
                    local_context: device.local_context,
                }
            }),
            NodeRef::VirtualMachine(id) => self.client.get_vm(id).await?.map(|nb| {
                let vm = vm_from(nb);
                NodeView {
                    node,
                    name: vm.name,
                    custom_fields: vm.custom_fields,
                    local_context: vm.local_context,
                }
            }),
        })
    }

    async fn list_interfaces(&self, node: NodeRef) -> Result<Vec<Interface>> {
        let raw = match node {
            NodeRef::Device(id) => self.client.list_device_interfaces(id).await?,
            NodeRef::VirtualMachine(id) => self.client.list_vm_interfaces(id).await?,
        };
        Ok(raw.into_iter().map(|nb| interface_from(nb, node)).collect())
    }

    async fn find_interface(&self, node: NodeRef, name: &str) -> Result<Option<Interface>> {
        Ok(self
            .list_interfaces(node)
            .await?
            .into_iter()
            .find(|i| i.name == name))
    }

    async fn create_interface(&self, iface: NewInterface) -> Result<Interface> {
        let node = iface.node;
        let payload = InterfaceCreate {
            device: match node {
                NodeRef::Device(id) => Some(id),
                NodeRef::VirtualMachine(_) => None,
            },
            virtual_machine: match node {
                NodeRef::VirtualMachine(id) => Some(id),
                NodeRef::Device(_) => None,
            },
            name: iface.name,
            iface_type: iface.iface_type,
            enabled: iface.enabled,
            mode: iface.mode,
            untagged_vlan: iface.untagged_vlan,
            lag: iface.lag,
            parent: iface.parent,
            description: iface.description,
            tags: iface
                .tags
                .into_iter()
                .map(|slug| TagRef { slug })
                .collect(),
            custom_fields: if iface.custom_fields.is_empty() {
                None
            } else {
                Some(iface.custom_fields)
            },
        };
        let created = match node {
            NodeRef::Device(_) => self.client.create_device_interface(&payload).await?,
            NodeRef::VirtualMachine(_) => self.client.create_vm_interface(&payload).await?,
        };
        Ok(interface_from(created, node))
    }

    async fn update_interface(&self, iface: &Interface) -> Result<Interface> {
        let patch = interface_patch(iface);
        let updated = match iface.node {
            NodeRef::Device(_) => self.client.patch_device_interface(iface.id, &patch).await?,
            NodeRef::VirtualMachine(_) => self.client.patch_vm_interface(iface.id, &patch).await?,
        };
        Ok(interface_from(updated, iface.node))
    }

    async fn list_rear_ports(&self, device_id: i64) -> Result<Vec<RearPort>> {
        let mut ports: Vec<RearPort> = self
            .client
            .list_rear_ports(device_id)
            .await?
            .into_iter()
            .map(rear_port_from)
            .collect();
        ports.sort_by_key(|p| (p.name.parse::<i64>().ok(), p.name.clone()));
        Ok(ports)
    }

    async fn list_front_ports(&self, device_id: i64) -> Result<Vec<FrontPort>> {
        let mut ports: Vec<FrontPort> = self
            .client
            .list_front_ports(device_id)
            .await?
            .into_iter()
            .map(front_port_from)
            .collect();
        ports.sort_by_key(|p| (p.name.parse::<i64>().ok(), p.name.clone()));
        Ok(ports)
    }

    async fn create_rear_port(&self, port: NewRearPort) -> Result<RearPort> {
        let created = self
            .client
            .create_rear_port(&RearPortCreate {
                device: port.device_id,
                name: port.name,
                port_type: port.port_type,
                positions: port.positions,
            })
            .await?;
        Ok(rear_port_from(created))
    }

    async fn create_front_port(&self, port: NewFrontPort) -> Result<FrontPort> {
        let created = self
            .client
            .create_front_port(&FrontPortCreate {
                device: port.device_id,
                name: port.name,
                port_type: port.port_type,
                rear_port: port.rear_port_id,
            })
            .await?;
        Ok(front_port_from(created))
    }

    async fn create_cable(&self, cable: NewCable) -> Result<Cable> {
        let created = self
            .client
            .create_cable(&CableCreate {
                a_terminations: vec![termination_ref(cable.a)],
                b_terminations: vec![termination_ref(cable.b)],
                status: cable.status,
            })
            .await?;
        Ok(Cable {
            id: created.id,
            a: cable.a,
            b: cable.b,
            status: choice_value(&created.status),
        })
    }

    async fn find_vlan(&self, site_id: i64, name: &str) -> Result<Option<Vlan>> {
        let matches = self.client.get_vlans(site_id, name).await?;
        Ok(unique("vlan", name, matches)?.map(|nb| Vlan {
            id: nb.id,
            site_id: nested_id(&nb.site),
            name: nb.name,
            vid: nb.vid,
            status: choice_value(&nb.status),
        }))
    }

    async fn create_vlan(&self, vlan: NewVlan) -> Result<Vlan> {
        let created = self
            .client
            .create_vlan(&VlanCreate {
                site: vlan.site_id,
                name: vlan.name,
                vid: vlan.vid,
                status: vlan.status,
            })
            .await?;
        Ok(Vlan {
            id: created.id,
            site_id: nested_id(&created.site),
            name: created.name,
            vid: created.vid,
            status: choice_value(&created.status),
        })
    }

    async fn find_prefix(&self, prefix: &str) -> Result<Option<Prefix>> {
        let matches = self.client.get_prefixes_exact(prefix).await?;
        Ok(unique("prefix", prefix, matches)?.map(prefix_from))
    }

    async fn list_prefixes_within(&self, container: &str) -> Result<Vec<Prefix>> {
        let mut inside: Vec<(CidrBlock, Prefix)> = self
            .client
            .get_prefixes_within(container)
            .await?
            .into_iter()
            .map(prefix_from)
            .filter_map(|p| CidrBlock::parse(&p.prefix).ok().map(|b| (b, p)))
            .collect();
        inside.sort_by_key(|(b, _)| (b.network, b.prefix_len));
        Ok(inside.into_iter().map(|(_, p)| p).collect())
    }

    async fn list_prefixes_by_role(&self, role: &str, family: u8) -> Result<Vec<Prefix>> {
        Ok(self
            .client
            .get_prefixes_by_role(role, family)
            .await?
            .into_iter()
            .map(prefix_from)
            .collect())
    }

    async fn create_prefix(&self, prefix: NewPrefix) -> Result<Prefix> {
        // Prefix queries filter roles by slug, create takes the role id
        let role_id = match &prefix.role {
            Some(slug) => Some(
                self.client
                    .get_prefix_role_by_slug(slug)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Prefix role '{}' not found", slug))?
                    .id,
            ),
            None => None,
        };
        let created = self
            .client
            .create_prefix(&PrefixCreate {
                prefix: prefix.prefix,
                status: prefix.status,
                role: role_id,
                site: prefix.site_id,
                vlan: prefix.vlan_id,
                description: prefix.description,
                is_pool: prefix.is_pool,
            })
            .await?;
        Ok(prefix_from(created))
    }

    async fn find_ip(&self, address: &str) -> Result<Option<IpAddress>> {
        let matches = self.client.get_ips_by_address(address).await?;
        Ok(unique("ip address", address, matches)?.map(ip_from))
    }

    async fn create_ip(&self, ip: NewIpAddress) -> Result<IpAddress> {
        let (object_type, object_id) = binding_parts(ip.interface);
        let created = self
            .client
            .create_ip(&IpAddressCreate {
                address: ip.address,
                status: ip.status,
                assigned_object_type: object_type,
                assigned_object_id: object_id,
                description: ip.description,
            })
            .await?;
        Ok(ip_from(created))
    }

    async fn find_tag(&self, slug: &str) -> Result<Option<Tag>> {
        Ok(self.client.get_tag_by_slug(slug).await?.map(|t| Tag {
            id: t.id,
            name: t.name,
            slug: t.slug,
        }))
    }
}
