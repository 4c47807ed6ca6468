use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::inventory::Inventory;
use crate::models::{
    cable_status, device_role, device_status, iface_mode, iface_type, port_type, prefix_status,
    Device, IfaceBinding, Interface, NewCable, NewDevice, NewFrontPort, NewInterface, NewPrefix,
    NewRearPort, NodeRef, Site, Termination, Vlan,
};
use crate::utils::{parse_pole_layout, CidrBlock};

use super::{primitives, EventLog, ProvisionError, ProvisionSettings, MGMT_VLAN_BASE};

/// Switch port reserved for the management access drop
const SWITCH_MGMT_PORT: &str = "10";
/// Switch ports uplinked to the backbone router
const SWITCH_UPLINK_PORTS: [&str; 2] = ["11", "12"];
/// Switch ports that are always taken out of service
const SWITCH_ALWAYS_DISABLED: [u32; 2] = [13, 14];
/// Highest switch port usable for patch-panel drops
const MAX_PANEL_PORTS: u32 = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct BackbonePopRequest {
    pub site_name: String,
    pub rack_name: String,
    #[serde(default = "default_rack_height")]
    pub rack_height: i32,
    pub panel_ports: u32,
    /// Space-separated `<pole>:<count>` tokens describing the surge
    /// protectors per mast
    pub pole_layout: String,
    /// Numeric node identifier; selects the router loopback host addresses
    pub node_id: u32,
    #[serde(default)]
    pub switch_serial: Option<String>,
    #[serde(default)]
    pub switch_asset_tag: Option<String>,
    #[serde(default)]
    pub router_serial: Option<String>,
    #[serde(default)]
    pub router_asset_tag: Option<String>,
    #[serde(default = "default_panel_type")]
    pub panel_type: String,
    #[serde(default = "default_surge_type")]
    pub surge_type: String,
    #[serde(default = "default_switch_type")]
    pub switch_type: String,
    #[serde(default = "default_router_type")]
    pub router_type: String,
}

fn default_rack_height() -> i32 {
    12
}

fn default_panel_type() -> String {
    "patch-panel-24".to_string()
}

fn default_surge_type() -> String {
    "surge-protector-1".to_string()
}

fn default_switch_type() -> String {
    "ws-12-250-ac".to_string()
}

fn default_router_type() -> String {
    "apu-4d4".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct BackbonePopReport {
    pub site: String,
    pub site_number: u8,
    pub mgmt_vlan_vid: i32,
    pub mgmt_prefix: String,
    pub rack: String,
    pub patch_panel: String,
    pub surge_protectors: Vec<String>,
    pub switch: String,
    pub router: String,
    pub loopback_v4: String,
    pub loopback_v6: String,
}

/// Bring up a full backbone point of presence: management VLAN and
/// prefix, rack, patch panel, surge protectors, access switch and
/// backbone router, with all cabling and addressing. Safe to re-run;
/// every step reuses what a previous run left behind.
pub async fn run(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    settings: &ProvisionSettings,
    req: BackbonePopRequest,
) -> Result<BackbonePopReport> {
    let poles = parse_pole_layout(&req.pole_layout)
        .map_err(ProvisionError::Validation)?;
    if req.panel_ports == 0 || req.panel_ports > MAX_PANEL_PORTS {
        return Err(ProvisionError::Validation(format!(
            "panel_ports must be between 1 and {}",
            MAX_PANEL_PORTS
        ))
        .into());
    }
    if req.node_id == 0 || req.node_id > 254 {
        return Err(
            ProvisionError::Validation("node_id must be between 1 and 254".to_string()).into(),
        );
    }
    let surge_total: u32 = poles.iter().map(|(_, n)| n).sum();
    if surge_total > req.panel_ports {
        return Err(ProvisionError::Validation(format!(
            "{} surge protectors do not fit on a {}-port panel",
            surge_total, req.panel_ports
        ))
        .into());
    }

    let site = inv
        .get_site_by_name(&req.site_name)
        .await?
        .ok_or_else(|| ProvisionError::Validation(format!("Unknown site '{}'", req.site_name)))?;

    for slug in [
        &req.panel_type,
        &req.surge_type,
        &req.switch_type,
        &req.router_type,
    ] {
        if inv.find_device_type(slug).await?.is_none() {
            return Err(ProvisionError::MissingPrerequisite(format!(
                "Device type '{}' is not registered",
                slug
            ))
            .into());
        }
    }
    if inv.find_prefix(&settings.mgmt_aggregate).await?.is_none() {
        return Err(ProvisionError::MissingPrerequisite(format!(
            "Management aggregate {} is not registered",
            settings.mgmt_aggregate
        ))
        .into());
    }

    // Site number: reused from the site's management prefix when present
    let alloc = primitives::next_free_mgmt_octet(inv, &site, &settings.mgmt_aggregate).await?;
    let site_no = alloc.octet;
    events.info(&format!("Using site number {} for {}", site_no, site.name));

    let vlan = primitives::ensure_vlan(
        inv,
        events,
        &site,
        &format!("Mgmt {}", site.name),
        MGMT_VLAN_BASE + i32::from(site_no),
    )
    .await?;

    let mgmt_prefix = match alloc.existing {
        Some(existing) => {
            events.info(&format!("Reusing management prefix {}", existing.prefix));
            existing
        }
        None => {
            let outer =
                CidrBlock::parse(&settings.mgmt_aggregate).map_err(anyhow::Error::msg)?;
            let block = CidrBlock {
                family: 4,
                network: outer.network | (u128::from(site_no) << 8),
                prefix_len: 24,
            };
            primitives::ensure_prefix(
                inv,
                events,
                NewPrefix {
                    prefix: block.to_string(),
                    status: prefix_status::ACTIVE.to_string(),
                    role: None,
                    site_id: Some(site.id),
                    vlan_id: Some(vlan.id),
                    description: format!("Management {}", site.name),
                    is_pool: false,
                },
            )
            .await?
        }
    };
    let mgmt_block = CidrBlock::parse(&mgmt_prefix.prefix).map_err(anyhow::Error::msg)?;

    let rack = primitives::ensure_rack(inv, events, &site, &req.rack_name, req.rack_height).await?;

    // Patch panel with its pass-through port pairs
    let pp_name = format!("pp-{}-{}.1", site.slug, rack.name);
    let (panel, panel_created) = ensure_device(
        inv,
        events,
        &site,
        NewDevice {
            name: pp_name.clone(),
            device_type: req.panel_type.clone(),
            role: device_role::PATCH_PANEL.to_string(),
            site_id: site.id,
            rack_id: Some(rack.id),
            position: None,
            status: device_status::PLANNED.to_string(),
            serial: None,
            asset_tag: None,
            custom_fields: HashMap::new(),
        },
    )
    .await?;
    if panel_created {
        for n in 1..=req.panel_ports {
            let rear = inv
                .create_rear_port(NewRearPort {
                    device_id: panel.id,
                    name: n.to_string(),
                    port_type: port_type::C8P8C.to_string(),
                    positions: 1,
                })
                .await?;
            inv.create_front_port(NewFrontPort {
                device_id: panel.id,
                name: n.to_string(),
                port_type: port_type::C8P8C.to_string(),
                rear_port_id: rear.id,
            })
            .await?;
        }
        events.success(&format!(
            "Created {} port pairs on {}",
            req.panel_ports, pp_name
        ));
    }

    // Surge protectors, consuming panel rear ports left to right
    let panel_rear = inv.list_rear_ports(panel.id).await?;
    let mut surge_names = Vec::new();
    let mut next_port = 0usize;
    for (pole, count) in &poles {
        for n in 1..=*count {
            let name = format!("sp-{}-mast{}-{}", site.slug, pole, n);
            let (surge, surge_created) = ensure_device(
                inv,
                events,
                &site,
                NewDevice {
                    name: name.clone(),
                    device_type: req.surge_type.clone(),
                    role: device_role::SURGE_PROTECTOR.to_string(),
                    site_id: site.id,
                    rack_id: None,
                    position: None,
                    status: device_status::PLANNED.to_string(),
                    serial: None,
                    asset_tag: None,
                    custom_fields: HashMap::new(),
                },
            )
            .await?;
            let surge_port = match inv.list_rear_ports(surge.id).await?.into_iter().next() {
                Some(port) => port,
                None if surge_created => {
                    inv.create_rear_port(NewRearPort {
                        device_id: surge.id,
                        name: "1".to_string(),
                        port_type: port_type::C8P8C.to_string(),
                        positions: 1,
                    })
                    .await?
                }
                None => {
                    return Err(ProvisionError::MissingPrerequisite(format!(
                        "Surge protector '{}' has no rear port",
                        name
                    ))
                    .into())
                }
            };

            let panel_port = panel_rear.get(next_port).ok_or_else(|| {
                ProvisionError::MissingPrerequisite(format!(
                    "Patch panel '{}' has no rear port at position {}",
                    pp_name,
                    next_port + 1
                ))
            })?;
            next_port += 1;

            cable_if_free(
                inv,
                events,
                Termination::RearPort(surge_port.id),
                surge_port.connected,
                Termination::RearPort(panel_port.id),
                panel_port.connected,
                &format!("{} to panel port {}", name, panel_port.name),
            )
            .await?;
            surge_names.push(name);
        }
    }

    // Access switch
    let switch_name = format!("sw-{}-01.{}", site.slug, settings.infra_domain);
    let (switch, _) = ensure_device(
        inv,
        events,
        &site,
        NewDevice {
            name: switch_name.clone(),
            device_type: req.switch_type.clone(),
            role: device_role::SWITCH.to_string(),
            site_id: site.id,
            rack_id: Some(rack.id),
            position: None,
            status: device_status::PLANNED.to_string(),
            serial: req.switch_serial.clone(),
            asset_tag: req.switch_asset_tag.clone(),
            custom_fields: HashMap::new(),
        },
    )
    .await?;
    let switch_node = NodeRef::Device(switch.id);

    // Panel drops: switch port i to front port i
    let panel_front = inv.list_front_ports(panel.id).await?;
    for i in 1..=req.panel_ports {
        let sw_port = require_iface(inv, switch_node, &i.to_string(), &switch_name).await?;
        let front = panel_front
            .iter()
            .find(|p| p.name == i.to_string())
            .ok_or_else(|| {
                ProvisionError::MissingPrerequisite(format!(
                    "Patch panel '{}' has no front port '{}'",
                    pp_name, i
                ))
            })?;
        cable_if_free(
            inv,
            events,
            Termination::Interface(sw_port.id),
            sw_port.connected,
            Termination::FrontPort(front.id),
            front.connected,
            &format!("switch port {} to panel front port {}", i, front.name),
        )
        .await?;
    }

    // Unused copper goes out of service
    let mut disabled: Vec<u32> = SWITCH_ALWAYS_DISABLED.to_vec();
    disabled.extend(req.panel_ports + 1..=MAX_PANEL_PORTS + 1);
    for port in disabled {
        disable_iface(inv, events, switch_node, &port.to_string(), &switch_name).await?;
    }

    // Management access drop
    let mut mgmt_port = require_iface(inv, switch_node, SWITCH_MGMT_PORT, &switch_name).await?;
    if mgmt_port.mode.as_deref() != Some(iface_mode::ACCESS)
        || mgmt_port.untagged_vlan != Some(vlan.id)
    {
        mgmt_port.mode = Some(iface_mode::ACCESS.to_string());
        mgmt_port.untagged_vlan = Some(vlan.id);
        mgmt_port.description = "Mgmt".to_string();
        inv.update_interface(&mgmt_port).await?;
        events.success(&format!(
            "Configured switch port {} as management access",
            SWITCH_MGMT_PORT
        ));
    } else {
        events.info(&format!(
            "Switch port {} already configured for management",
            SWITCH_MGMT_PORT
        ));
    }

    // Router uplink bundle on the switch side
    let po1 = ensure_lag(inv, events, switch_node, "po1", &switch_name).await?;
    for name in SWITCH_UPLINK_PORTS {
        enslave_iface(inv, events, switch_node, name, po1.id, &switch_name).await?;
    }

    // Switch management address
    let vlan_iface_name = format!("vlan{}", vlan.vid);
    let sw_vlan_iface = ensure_virtual_iface(
        inv,
        events,
        switch_node,
        &vlan_iface_name,
        None,
        &switch_name,
    )
    .await?;
    let sw_ip = primitives::configure_ip(
        inv,
        events,
        &mgmt_block.host_cidr(10),
        IfaceBinding::for_interface(&sw_vlan_iface),
        &format!("Mgmt {}", switch_name),
    )
    .await?;
    set_primary_v4(inv, events, &switch, sw_ip.id).await?;

    // Backbone router
    let router_name = format!("bbr-{}.{}", site.slug, settings.infra_domain);
    let (router, _) = ensure_device(
        inv,
        events,
        &site,
        NewDevice {
            name: router_name.clone(),
            device_type: req.router_type.clone(),
            role: device_role::ROUTER.to_string(),
            site_id: site.id,
            rack_id: Some(rack.id),
            position: None,
            status: device_status::PLANNED.to_string(),
            serial: req.router_serial.clone(),
            asset_tag: req.router_asset_tag.clone(),
            custom_fields: HashMap::new(),
        },
    )
    .await?;
    let router_node = NodeRef::Device(router.id);

    let bond0 = ensure_lag(inv, events, router_node, "bond0", &router_name).await?;
    for (member, uplink) in [("enp1s0", "11"), ("enp2s0", "12")] {
        enslave_iface(inv, events, router_node, member, bond0.id, &router_name).await?;
        let member_iface = require_iface(inv, router_node, member, &router_name).await?;
        let sw_port = require_iface(inv, switch_node, uplink, &switch_name).await?;
        cable_if_free(
            inv,
            events,
            Termination::Interface(member_iface.id),
            member_iface.connected,
            Termination::Interface(sw_port.id),
            sw_port.connected,
            &format!("router {} to switch port {}", member, uplink),
        )
        .await?;
    }
    disable_iface(inv, events, router_node, "enp3s0", &router_name).await?;

    // Router management address on the bundle
    let router_vlan_iface = ensure_virtual_iface(
        inv,
        events,
        router_node,
        &vlan_iface_name,
        Some(bond0.id),
        &router_name,
    )
    .await?;
    primitives::configure_ip(
        inv,
        events,
        &mgmt_block.host_cidr(1),
        IfaceBinding::for_interface(&router_vlan_iface),
        &format!("Mgmt {}", router_name),
    )
    .await?;

    // Loopbacks, keyed by the operator-supplied node id
    let lo = require_iface(inv, router_node, "lo", &router_name).await?;
    let v4_base =
        CidrBlock::parse(&settings.loopback_v4_base).map_err(anyhow::Error::msg)?;
    let v6_base =
        CidrBlock::parse(&settings.loopback_v6_base).map_err(anyhow::Error::msg)?;
    let loopback_v4 = format!("{}/32", v4_base.host(u128::from(req.node_id)));
    // The node id appears as decimal digits in the last address group:
    // node 23 gets ::23, not ::17
    let v6_host = u128::from_str_radix(&req.node_id.to_string(), 16)
        .map_err(|e| anyhow::anyhow!("node id {} has no v6 group form: {}", req.node_id, e))?;
    let loopback_v6 = format!("{}/128", v6_base.host(v6_host));
    let lo_binding = IfaceBinding::for_interface(&lo);
    let lo_v4 = primitives::configure_ip(inv, events, &loopback_v4, lo_binding, "Loopback").await?;
    let lo_v6 = primitives::configure_ip(inv, events, &loopback_v6, lo_binding, "Loopback").await?;

    let mut router = inv
        .get_device_by_name(&router_name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Router '{}' vanished during provisioning", router_name))?;
    if router.primary_ip4 != Some(lo_v4.id) || router.primary_ip6 != Some(lo_v6.id) {
        router.primary_ip4 = Some(lo_v4.id);
        router.primary_ip6 = Some(lo_v6.id);
        inv.update_device(&router).await?;
        events.success(&format!("Set primary addresses on {}", router_name));
    }

    events.success(&format!("Backbone POP for {} is provisioned", site.name));

    Ok(BackbonePopReport {
        site: site.name.clone(),
        site_number: site_no,
        mgmt_vlan_vid: vlan.vid,
        mgmt_prefix: mgmt_prefix.prefix,
        rack: rack.name,
        patch_panel: pp_name,
        surge_protectors: surge_names,
        switch: switch_name,
        router: router_name,
        loopback_v4,
        loopback_v6,
    })
}

/// Fetch a device by name, creating it when absent. A device that exists
/// at another site fails validation rather than being silently adopted.
async fn ensure_device(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    site: &Site,
    new: NewDevice,
) -> Result<(Device, bool)> {
    if let Some(existing) = inv.get_device_by_name(&new.name).await? {
        if existing.site_id != site.id {
            return Err(ProvisionError::Validation(format!(
                "Device '{}' already exists at another site",
                new.name
            ))
            .into());
        }
        events.info(&format!("Device '{}' already present", new.name));
        return Ok((existing, false));
    }
    let name = new.name.clone();
    let device = inv.create_device(new).await?;
    events.success(&format!("Created device '{}'", name));
    Ok((device, true))
}

async fn cable_if_free(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    a: Termination,
    a_connected: bool,
    b: Termination,
    b_connected: bool,
    label: &str,
) -> Result<bool> {
    if a_connected || b_connected {
        events.info(&format!("Cable {}: already connected, skipping", label));
        return Ok(false);
    }
    inv.create_cable(NewCable {
        a,
        b,
        status: cable_status::PLANNED.to_string(),
    })
    .await?;
    events.success(&format!("Cabled {}", label));
    Ok(true)
}

async fn require_iface(
    inv: &dyn Inventory,
    node: NodeRef,
    name: &str,
    device_name: &str,
) -> Result<Interface> {
    inv.find_interface(node, name).await?.ok_or_else(|| {
        ProvisionError::MissingPrerequisite(format!(
            "Interface '{}' is missing on '{}'",
            name, device_name
        ))
        .into()
    })
}

async fn disable_iface(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    node: NodeRef,
    name: &str,
    device_name: &str,
) -> Result<()> {
    let mut iface = require_iface(inv, node, name, device_name).await?;
    if iface.enabled {
        iface.enabled = false;
        inv.update_interface(&iface).await?;
        events.success(&format!("Disabled {} on {}", name, device_name));
    }
    Ok(())
}

async fn ensure_lag(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    node: NodeRef,
    name: &str,
    device_name: &str,
) -> Result<Interface> {
    if let Some(existing) = inv.find_interface(node, name).await? {
        return Ok(existing);
    }
    let lag = inv
        .create_interface(NewInterface {
            node,
            name: name.to_string(),
            iface_type: iface_type::LAG.to_string(),
            enabled: true,
            mode: Some(iface_mode::TAGGED_ALL.to_string()),
            untagged_vlan: None,
            lag: None,
            parent: None,
            description: String::new(),
            tags: Vec::new(),
            custom_fields: HashMap::new(),
        })
        .await?;
    events.success(&format!("Created link aggregate {} on {}", name, device_name));
    Ok(lag)
}

async fn enslave_iface(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    node: NodeRef,
    name: &str,
    lag_id: i64,
    device_name: &str,
) -> Result<()> {
    let mut iface = require_iface(inv, node, name, device_name).await?;
    if iface.lag != Some(lag_id) {
        iface.lag = Some(lag_id);
        inv.update_interface(&iface).await?;
        events.success(&format!("Bundled {} on {}", name, device_name));
    }
    Ok(())
}

async fn ensure_virtual_iface(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    node: NodeRef,
    name: &str,
    parent: Option<i64>,
    device_name: &str,
) -> Result<Interface> {
    if let Some(existing) = inv.find_interface(node, name).await? {
        return Ok(existing);
    }
    let iface = inv
        .create_interface(NewInterface {
            node,
            name: name.to_string(),
            iface_type: iface_type::VIRTUAL.to_string(),
            enabled: true,
            mode: None,
            untagged_vlan: None,
            lag: None,
            parent,
            description: String::new(),
            tags: Vec::new(),
            custom_fields: HashMap::new(),
        })
        .await?;
    events.success(&format!("Created interface {} on {}", name, device_name));
    Ok(iface)
}

async fn set_primary_v4(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    device: &Device,
    ip_id: i64,
) -> Result<()> {
    if device.primary_ip4 == Some(ip_id) {
        return Ok(());
    }
    let mut updated = inv
        .get_device_by_name(&device.name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Device '{}' vanished during provisioning", device.name))?;
    if updated.primary_ip4 != Some(ip_id) {
        updated.primary_ip4 = Some(ip_id);
        inv.update_device(&updated).await?;
        events.success(&format!("Set primary address on {}", device.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::testutil::pop_fixture;
    use crate::provision::Recorder;

    fn request() -> BackbonePopRequest {
        BackbonePopRequest {
            site_name: "Pobelhausen".to_string(),
            rack_name: "A".to_string(),
            rack_height: 12,
            panel_ports: 4,
            pole_layout: "1:2 2:1".to_string(),
            node_id: 23,
            switch_serial: Some("SW123".to_string()),
            switch_asset_tag: None,
            router_serial: Some("RT456".to_string()),
            router_asset_tag: None,
            panel_type: default_panel_type(),
            surge_type: default_surge_type(),
            switch_type: default_switch_type(),
            router_type: default_router_type(),
        }
    }

    #[tokio::test]
    async fn test_full_pop_provisioning() {
        let fixture = pop_fixture().await;
        let events = Recorder::new();
        let report = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();

        assert_eq!(report.site_number, 0);
        assert_eq!(report.mgmt_vlan_vid, 3000);
        assert_eq!(report.mgmt_prefix, "172.30.0.0/24");
        assert_eq!(report.patch_panel, "pp-pbhsw-A.1");
        assert_eq!(report.switch, "sw-pbhsw-01.in.ffho.net");
        assert_eq!(report.router, "bbr-pbhsw.in.ffho.net");
        assert_eq!(
            report.surge_protectors,
            vec!["sp-pbhsw-mast1-1", "sp-pbhsw-mast1-2", "sp-pbhsw-mast2-1"]
        );
        assert_eq!(report.loopback_v4, "10.132.255.23/32");
        assert_eq!(report.loopback_v6, "2a03:2260:2342:ffff::23/128");

        let inv = &fixture.inv;
        let rack = inv.find_rack(fixture.site.id, "A").await.unwrap().unwrap();
        assert_eq!(rack.status, "planned");
        let panel = inv.get_device_by_name("pp-pbhsw-A.1").await.unwrap().unwrap();
        assert_eq!(panel.status, "planned");
        let rear = inv.list_rear_ports(panel.id).await.unwrap();
        assert_eq!(rear.len(), 4);
        // Three surge protectors occupy the first three rear ports
        assert!(rear[0].connected && rear[1].connected && rear[2].connected);
        assert!(!rear[3].connected);

        let switch = inv
            .get_device_by_name("sw-pbhsw-01.in.ffho.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(switch.status, "planned");
        let node = NodeRef::Device(switch.id);
        for i in 1..=4u32 {
            let port = inv.find_interface(node, &i.to_string()).await.unwrap().unwrap();
            assert!(port.connected, "switch port {} should be cabled", i);
        }
        for i in [5u32, 6, 7, 8, 9, 13, 14] {
            let port = inv.find_interface(node, &i.to_string()).await.unwrap().unwrap();
            assert!(!port.enabled, "switch port {} should be disabled", i);
        }
        let mgmt = inv.find_interface(node, "10").await.unwrap().unwrap();
        assert_eq!(mgmt.mode.as_deref(), Some("access"));
        assert!(mgmt.untagged_vlan.is_some());
        let po1 = inv.find_interface(node, "po1").await.unwrap().unwrap();
        for name in ["11", "12"] {
            let member = inv.find_interface(node, name).await.unwrap().unwrap();
            assert_eq!(member.lag, Some(po1.id));
            assert!(member.connected);
        }
        assert!(switch.primary_ip4.is_some());

        let router = inv
            .get_device_by_name("bbr-pbhsw.in.ffho.net")
            .await
            .unwrap()
            .unwrap();
        let rnode = NodeRef::Device(router.id);
        let bond0 = inv.find_interface(rnode, "bond0").await.unwrap().unwrap();
        for name in ["enp1s0", "enp2s0"] {
            let member = inv.find_interface(rnode, name).await.unwrap().unwrap();
            assert_eq!(member.lag, Some(bond0.id));
            assert!(member.connected);
        }
        let enp3 = inv.find_interface(rnode, "enp3s0").await.unwrap().unwrap();
        assert!(!enp3.enabled);
        let vlan_if = inv.find_interface(rnode, "vlan3000").await.unwrap().unwrap();
        assert_eq!(vlan_if.parent, Some(bond0.id));
        assert!(router.primary_ip4.is_some() && router.primary_ip6.is_some());

        let v4 = inv.find_ip("10.132.255.23/32").await.unwrap().unwrap();
        assert_eq!(router.primary_ip4, Some(v4.id));
        let v6 = inv
            .find_ip("2a03:2260:2342:ffff::23/128")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(router.primary_ip6, Some(v6.id));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let fixture = pop_fixture().await;
        let events = Recorder::new();
        let first = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();
        let second = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();

        assert_eq!(first.site_number, second.site_number);
        assert_eq!(first.mgmt_prefix, second.mgmt_prefix);

        // No duplicate prefix was carved on the second run
        let children = fixture
            .inv
            .list_prefixes_within("172.30.0.0/16")
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn test_reuses_existing_site_number() {
        let fixture = pop_fixture().await;
        fixture
            .inv
            .create_prefix(crate::models::NewPrefix {
                prefix: "172.30.9.0/24".to_string(),
                status: "active".to_string(),
                role: None,
                site_id: Some(fixture.site.id),
                vlan_id: None,
                description: String::new(),
                is_pool: false,
            })
            .await
            .unwrap();

        let events = Recorder::new();
        let report = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();
        assert_eq!(report.site_number, 9);
        assert_eq!(report.mgmt_vlan_vid, 3009);
    }

    #[tokio::test]
    async fn test_unknown_site_fails_validation() {
        let fixture = pop_fixture().await;
        let events = Recorder::new();
        let mut req = request();
        req.site_name = "Nowhere".to_string();
        let err = run(&fixture.inv, &events, &fixture.settings, req)
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_surge_overflow_fails_validation() {
        let fixture = pop_fixture().await;
        let events = Recorder::new();
        let mut req = request();
        req.pole_layout = "1:3 2:2".to_string();
        let err = run(&fixture.inv, &events, &fixture.settings, req)
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_device_type_is_prerequisite() {
        let fixture = pop_fixture().await;
        let events = Recorder::new();
        let mut req = request();
        req.router_type = "unknown-router".to_string();
        let err = run(&fixture.inv, &events, &fixture.settings, req)
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::MissingPrerequisite(_)) => {}
            other => panic!("expected MissingPrerequisite, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_aggregate_exhaustion_is_typed() {
        let fixture = pop_fixture().await;
        let mut settings = fixture.settings.clone();
        settings.mgmt_aggregate = "172.30.0.0/23".to_string();
        fixture
            .inv
            .create_prefix(crate::models::NewPrefix {
                prefix: "172.30.0.0/23".to_string(),
                status: "container".to_string(),
                role: None,
                site_id: None,
                vlan_id: None,
                description: String::new(),
                is_pool: false,
            })
            .await
            .unwrap();
        for p in ["172.30.0.0/24", "172.30.1.0/24"] {
            fixture
                .inv
                .create_prefix(crate::models::NewPrefix {
                    prefix: p.to_string(),
                    status: "active".to_string(),
                    role: None,
                    site_id: None,
                    vlan_id: None,
                    description: String::new(),
                    is_pool: false,
                })
                .await
                .unwrap();
        }

        let events = Recorder::new();
        let err = run(&fixture.inv, &events, &settings, request())
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::PoolExhausted(_)) => {}
            other => panic!("expected PoolExhausted, got {:?}", other),
        }
    }
}
