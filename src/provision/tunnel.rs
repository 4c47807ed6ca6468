use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::inventory::Inventory;
use crate::models::{
    iface_type, prefix_role, prefix_status, IfaceBinding, Interface, NewInterface, NodeRef,
    NodeView, Prefix,
};
use crate::utils::{transfer_prefix_description, tunnel_interface_name, CidrBlock};

use super::{primitives, EventLog, ProvisionError, ProvisionSettings};

/// Custom field naming the peer device of a tunnel interface
const CF_PEER_DEVICE: &str = "wg_peer_device";
/// Custom field naming the peer virtual machine of a tunnel interface
const CF_PEER_VM: &str = "wg_peer_vm";

/// Host prefix length of the tunnel addresses, per family
fn host_prefix_len(family: u8) -> u8 {
    if family == 4 {
        31
    } else {
        64
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum NodeSelector {
    Device(String),
    VirtualMachine(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TunnelRequest {
    pub server: NodeSelector,
    pub client: NodeSelector,
    /// Provision an out-of-band management tunnel instead of a
    /// cross-connect
    #[serde(default)]
    pub oob: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TunnelReport {
    pub server: String,
    pub client: String,
    pub server_interface: String,
    pub client_interface: String,
    pub prefix_v4: String,
    pub prefix_v6: String,
    pub server_addresses: Vec<String>,
    pub client_addresses: Vec<String>,
}

/// Establish a WireGuard tunnel between two nodes: one interface per
/// end named after the remote peer, a transfer prefix per address
/// family carved from the role's container pool, and host addresses on
/// both ends. Re-runs reuse the interfaces and prefixes they find.
pub async fn run(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    settings: &ProvisionSettings,
    req: TunnelRequest,
) -> Result<TunnelReport> {
    let server = resolve(inv, &req.server).await?;
    let client = resolve(inv, &req.client).await?;
    if server.node == client.node {
        return Err(ProvisionError::Validation(
            "Server and client must be different nodes".to_string(),
        )
        .into());
    }

    if inv.find_tag(&settings.tunnel_tag).await?.is_none() {
        return Err(ProvisionError::MissingPrerequisite(format!(
            "Tag '{}' is not registered",
            settings.tunnel_tag
        ))
        .into());
    }
    // Both peers are checked before the first mutation so the operator
    // sees every missing key at once
    let mut keys_missing = false;
    for node in [&server, &client] {
        if !has_wireguard_keys(node) {
            events.failure(&format!(
                "Node '{}' is missing WireGuard key material",
                node.name
            ));
            keys_missing = true;
        }
    }
    if keys_missing {
        return Err(ProvisionError::MissingPrerequisite(
            "WireGuard key material is not set on both peers".to_string(),
        )
        .into());
    }

    // Each end's interface is named after the remote peer
    let server_if_name = tunnel_interface_name(&client.name, &settings.infra_domain, req.oob);
    let client_if_name = tunnel_interface_name(&server.name, &settings.infra_domain, req.oob);
    let server_iface =
        ensure_tunnel_iface(inv, events, settings, &server, &client, &server_if_name).await?;
    let client_iface =
        ensure_tunnel_iface(inv, events, settings, &client, &server, &client_if_name).await?;

    let role = if req.oob {
        prefix_role::VPN_OOBM
    } else {
        prefix_role::VPN_X_CONNECT
    };
    let description =
        transfer_prefix_description(&server.name, &client.name, &settings.infra_domain);

    let prefix_v4 = transfer_prefix(inv, events, role, 4, &description).await?;
    let prefix_v6 = transfer_prefix(inv, events, role, 6, &description).await?;
    let block_v4 = CidrBlock::parse(&prefix_v4.prefix).map_err(anyhow::Error::msg)?;
    let block_v6 = CidrBlock::parse(&prefix_v6.prefix).map_err(anyhow::Error::msg)?;

    // v4: net+0 server, net+1 client; v6: net+1 server, net+2 client
    let mut server_addresses = Vec::new();
    let mut client_addresses = Vec::new();
    for (block, server_offset, client_offset) in [(block_v4, 0u128, 1u128), (block_v6, 1, 2)] {
        let server_addr = block.host_cidr(server_offset);
        let client_addr = block.host_cidr(client_offset);
        primitives::configure_ip(
            inv,
            events,
            &server_addr,
            IfaceBinding::for_interface(&server_iface),
            &description,
        )
        .await?;
        primitives::configure_ip(
            inv,
            events,
            &client_addr,
            IfaceBinding::for_interface(&client_iface),
            &description,
        )
        .await?;
        server_addresses.push(server_addr);
        client_addresses.push(client_addr);
    }

    events.success(&format!(
        "Tunnel between {} and {} is provisioned",
        server.name, client.name
    ));

    Ok(TunnelReport {
        server: server.name,
        client: client.name,
        server_interface: server_if_name,
        client_interface: client_if_name,
        prefix_v4: prefix_v4.prefix,
        prefix_v6: prefix_v6.prefix,
        server_addresses,
        client_addresses,
    })
}

async fn resolve(inv: &dyn Inventory, selector: &NodeSelector) -> Result<NodeView> {
    let node = match selector {
        NodeSelector::Device(name) => {
            let device = inv.get_device_by_name(name).await?.ok_or_else(|| {
                ProvisionError::Validation(format!("Unknown device '{}'", name))
            })?;
            NodeRef::Device(device.id)
        }
        NodeSelector::VirtualMachine(name) => {
            let vm = inv.get_vm_by_name(name).await?.ok_or_else(|| {
                ProvisionError::Validation(format!("Unknown virtual machine '{}'", name))
            })?;
            NodeRef::VirtualMachine(vm.id)
        }
    };
    inv.get_node(node)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Node {:?} vanished during lookup", node))
}

/// Both halves of the key pair must already be present in the node's
/// config context
fn has_wireguard_keys(node: &NodeView) -> bool {
    let wg = node.local_context.as_ref().and_then(|c| c.get("wireguard"));
    ["privkey", "pubkey"].iter().all(|field| {
        wg.and_then(|w| w.get(field))
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.is_empty())
    })
}

fn peer_field(peer: &NodeView) -> &'static str {
    match peer.node {
        NodeRef::Device(_) => CF_PEER_DEVICE,
        NodeRef::VirtualMachine(_) => CF_PEER_VM,
    }
}

fn custom_field_str<'a>(iface: &'a Interface, key: &str) -> Option<&'a str> {
    iface
        .custom_fields
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Find or create the tunnel interface on `local`, enforcing that an
/// existing interface of that name belongs to this tunnel's peer
async fn ensure_tunnel_iface(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    settings: &ProvisionSettings,
    local: &NodeView,
    peer: &NodeView,
    name: &str,
) -> Result<Interface> {
    let key = peer_field(peer);
    if let Some(mut existing) = inv.find_interface(local.node, name).await? {
        let claimed_device = custom_field_str(&existing, CF_PEER_DEVICE);
        let claimed_vm = custom_field_str(&existing, CF_PEER_VM);
        match (claimed_device, claimed_vm) {
            (None, None) => {
                existing
                    .custom_fields
                    .insert(key.to_string(), serde_json::json!(peer.name));
                let updated = inv.update_interface(&existing).await?;
                events.success(&format!(
                    "Claimed interface '{}' on {} for peer {}",
                    name, local.name, peer.name
                ));
                Ok(updated)
            }
            _ if custom_field_str(&existing, key) == Some(peer.name.as_str())
                && claimed_device.is_some() != claimed_vm.is_some() =>
            {
                events.info(&format!(
                    "Interface '{}' on {} already points at {}",
                    name, local.name, peer.name
                ));
                Ok(existing)
            }
            _ => Err(ProvisionError::Validation(format!(
                "Interface '{}' on {} belongs to another tunnel",
                name, local.name
            ))
            .into()),
        }
    } else {
        let mut custom_fields = HashMap::new();
        custom_fields.insert(key.to_string(), serde_json::json!(peer.name));
        let iface = inv
            .create_interface(NewInterface {
                node: local.node,
                name: name.to_string(),
                iface_type: iface_type::VIRTUAL.to_string(),
                enabled: true,
                mode: None,
                untagged_vlan: None,
                lag: None,
                parent: None,
                description: format!("Tunnel to {}", peer.name),
                tags: vec![settings.tunnel_tag.clone()],
                custom_fields,
            })
            .await?;
        events.success(&format!(
            "Created tunnel interface '{}' on {}",
            name, local.name
        ));
        Ok(iface)
    }
}

/// Find the tunnel's transfer prefix by description, or carve a fresh
/// one from the first container of the role with room left
async fn transfer_prefix(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    role: &str,
    family: u8,
    description: &str,
) -> Result<Prefix> {
    let containers: Vec<Prefix> = inv
        .list_prefixes_by_role(role, family)
        .await?
        .into_iter()
        .filter(|p| p.status == prefix_status::CONTAINER)
        .collect();
    if containers.is_empty() {
        return Err(ProvisionError::MissingPrerequisite(format!(
            "No IPv{} container prefix with role '{}'",
            family, role
        ))
        .into());
    }

    for container in &containers {
        let children = inv.list_prefixes_within(&container.prefix).await?;
        if let Some(existing) = children.iter().find(|p| p.description == description) {
            events.info(&format!(
                "Reusing transfer prefix {} ({})",
                existing.prefix, description
            ));
            return Ok(existing.clone());
        }
    }

    let desired_len = host_prefix_len(family);
    for container in &containers {
        let template = primitives::child_prefix(container, description.to_string());
        match primitives::allocate_subblock(inv, events, container, desired_len, template).await {
            Ok(prefix) => return Ok(prefix),
            Err(err) => match err.downcast_ref::<ProvisionError>() {
                Some(ProvisionError::PoolExhausted(_)) => continue,
                _ => return Err(err),
            },
        }
    }
    Err(ProvisionError::PoolExhausted(format!(
        "No free /{} in any IPv{} container with role '{}'",
        desired_len, family, role
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Inventory, MemoryInventory};
    use crate::models::{Device, NewPrefix};
    use crate::provision::testutil::wg_context;
    use crate::provision::{ProvisionSettings, Recorder};

    struct Fixture {
        inv: MemoryInventory,
        settings: ProvisionSettings,
        server: Device,
    }

    async fn tunnel_fixture() -> Fixture {
        let inv = MemoryInventory::new();
        let site = inv.add_site("Core", "core", "active").await;
        inv.add_tag("Wireguard", "wireguard").await;

        let server = inv
            .add_device_raw(Device {
                id: 0,
                name: "gw01.in.ffho.net".to_string(),
                device_type: "apu-4d4".to_string(),
                role: "router".to_string(),
                site_id: site.id,
                rack_id: None,
                position: None,
                status: "active".to_string(),
                serial: None,
                asset_tag: None,
                primary_ip4: None,
                primary_ip6: None,
                custom_fields: Default::default(),
                local_context: Some(wg_context("server-pubkey")),
            })
            .await;
        inv.add_vm(
            "ops01.in.ffho.net",
            "active",
            Default::default(),
            Some(wg_context("client-pubkey")),
        )
        .await;

        for (prefix, family_role) in [
            ("10.2.0.0/24", prefix_role::VPN_X_CONNECT),
            ("2a03:2260:2342:f000::/56", prefix_role::VPN_X_CONNECT),
            ("10.3.0.0/24", prefix_role::VPN_OOBM),
            ("2a03:2260:2342:e000::/56", prefix_role::VPN_OOBM),
        ] {
            inv.create_prefix(NewPrefix {
                prefix: prefix.to_string(),
                status: prefix_status::CONTAINER.to_string(),
                role: Some(family_role.to_string()),
                site_id: None,
                vlan_id: None,
                description: String::new(),
                is_pool: false,
            })
            .await
            .unwrap();
        }

        Fixture {
            inv,
            settings: ProvisionSettings::default(),
            server,
        }
    }

    fn request() -> TunnelRequest {
        TunnelRequest {
            server: NodeSelector::Device("gw01.in.ffho.net".to_string()),
            client: NodeSelector::VirtualMachine("ops01.in.ffho.net".to_string()),
            oob: false,
        }
    }

    #[tokio::test]
    async fn test_tunnel_end_to_end() {
        let fixture = tunnel_fixture().await;
        let events = Recorder::new();
        let report = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();

        assert_eq!(report.server_interface, "wg-ops01");
        assert_eq!(report.client_interface, "wg-gw01");
        assert_eq!(report.prefix_v4, "10.2.0.0/31");
        assert_eq!(report.prefix_v6, "2a03:2260:2342:f000::/64");
        assert_eq!(
            report.server_addresses,
            vec!["10.2.0.0/31", "2a03:2260:2342:f000::1/64"]
        );
        assert_eq!(
            report.client_addresses,
            vec!["10.2.0.1/31", "2a03:2260:2342:f000::2/64"]
        );

        let iface = fixture
            .inv
            .find_interface(NodeRef::Device(fixture.server.id), "wg-ops01")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            iface.custom_fields.get(CF_PEER_VM),
            Some(&serde_json::json!("ops01.in.ffho.net"))
        );
        assert!(iface.tags.contains(&"wireguard".to_string()));
    }

    #[tokio::test]
    async fn test_rerun_reuses_prefix_and_interfaces() {
        let fixture = tunnel_fixture().await;
        let events = Recorder::new();
        let first = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();
        let second = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();
        assert_eq!(first.prefix_v4, second.prefix_v4);
        assert_eq!(first.prefix_v6, second.prefix_v6);

        let children = fixture.inv.list_prefixes_within("10.2.0.0/24").await.unwrap();
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn test_second_tunnel_gets_next_block() {
        let fixture = tunnel_fixture().await;
        fixture
            .inv
            .add_vm(
                "ops02.in.ffho.net",
                "active",
                Default::default(),
                Some(wg_context("other-pubkey")),
            )
            .await;
        let events = Recorder::new();
        run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap();
        let second = run(
            &fixture.inv,
            &events,
            &fixture.settings,
            TunnelRequest {
                server: NodeSelector::Device("gw01.in.ffho.net".to_string()),
                client: NodeSelector::VirtualMachine("ops02.in.ffho.net".to_string()),
                oob: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(second.prefix_v4, "10.2.0.2/31");
        assert_eq!(second.prefix_v6, "2a03:2260:2342:f001::/64");
    }

    #[tokio::test]
    async fn test_oob_flag_selects_role_and_name() {
        let fixture = tunnel_fixture().await;
        let events = Recorder::new();
        let mut req = request();
        req.oob = true;
        let report = run(&fixture.inv, &events, &fixture.settings, req)
            .await
            .unwrap();
        assert_eq!(report.server_interface, "oob-ops01");
        assert_eq!(report.prefix_v4, "10.3.0.0/31");
    }

    #[tokio::test]
    async fn test_missing_tag_is_prerequisite() {
        let fixture = tunnel_fixture().await;
        let mut settings = fixture.settings.clone();
        settings.tunnel_tag = "no-such-tag".to_string();
        let events = Recorder::new();
        let err = run(&fixture.inv, &events, &settings, request())
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::MissingPrerequisite(_)) => {}
            other => panic!("expected MissingPrerequisite, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_pubkey_is_prerequisite() {
        let fixture = tunnel_fixture().await;
        fixture
            .inv
            .add_vm("bare.in.ffho.net", "active", Default::default(), None)
            .await;
        let events = Recorder::new();
        let err = run(
            &fixture.inv,
            &events,
            &fixture.settings,
            TunnelRequest {
                server: NodeSelector::Device("gw01.in.ffho.net".to_string()),
                client: NodeSelector::VirtualMachine("bare.in.ffho.net".to_string()),
                oob: false,
            },
        )
        .await
        .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::MissingPrerequisite(_)) => {}
            other => panic!("expected MissingPrerequisite, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_privkey_is_prerequisite() {
        let fixture = tunnel_fixture().await;
        fixture
            .inv
            .add_vm(
                "halfkeyed.in.ffho.net",
                "active",
                Default::default(),
                Some(serde_json::json!({
                    "wireguard": { "privkey": "", "pubkey": "k1" }
                })),
            )
            .await;
        let events = Recorder::new();
        let err = run(
            &fixture.inv,
            &events,
            &fixture.settings,
            TunnelRequest {
                server: NodeSelector::Device("gw01.in.ffho.net".to_string()),
                client: NodeSelector::VirtualMachine("halfkeyed.in.ffho.net".to_string()),
                oob: false,
            },
        )
        .await
        .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::MissingPrerequisite(_)) => {}
            other => panic!("expected MissingPrerequisite, got {:?}", other),
        }

        // Aborted before any prefix was carved or interface created
        let children = fixture.inv.list_prefixes_within("10.2.0.0/24").await.unwrap();
        assert!(children.is_empty());
        let iface = fixture
            .inv
            .find_interface(NodeRef::Device(fixture.server.id), "wg-halfkeyed")
            .await
            .unwrap();
        assert!(iface.is_none());
    }

    #[tokio::test]
    async fn test_key_check_reports_both_peers() {
        let fixture = tunnel_fixture().await;
        fixture
            .inv
            .add_vm("bare-a.in.ffho.net", "active", Default::default(), None)
            .await;
        fixture
            .inv
            .add_vm("bare-b.in.ffho.net", "active", Default::default(), None)
            .await;
        let events = Recorder::new();
        run(
            &fixture.inv,
            &events,
            &fixture.settings,
            TunnelRequest {
                server: NodeSelector::VirtualMachine("bare-a.in.ffho.net".to_string()),
                client: NodeSelector::VirtualMachine("bare-b.in.ffho.net".to_string()),
                oob: false,
            },
        )
        .await
        .unwrap_err();
        let failures: Vec<_> = events
            .take()
            .into_iter()
            .filter(|e| e.message.contains("missing WireGuard key material"))
            .collect();
        assert_eq!(failures.len(), 2);
    }

    #[tokio::test]
    async fn test_foreign_interface_fails_validation() {
        let fixture = tunnel_fixture().await;
        let mut custom_fields = HashMap::new();
        custom_fields.insert(
            CF_PEER_DEVICE.to_string(),
            serde_json::json!("someone-else.in.ffho.net"),
        );
        fixture
            .inv
            .create_interface(NewInterface {
                node: NodeRef::Device(fixture.server.id),
                name: "wg-ops01".to_string(),
                iface_type: iface_type::VIRTUAL.to_string(),
                enabled: true,
                mode: None,
                untagged_vlan: None,
                lag: None,
                parent: None,
                description: String::new(),
                tags: Vec::new(),
                custom_fields,
            })
            .await
            .unwrap();

        let events = Recorder::new();
        let err = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_typed() {
        let fixture = tunnel_fixture().await;
        // Fill the v4 cross-connect container completely
        for i in 0..128u32 {
            fixture
                .inv
                .create_prefix(NewPrefix {
                    prefix: format!("10.2.0.{}/31", i * 2),
                    status: prefix_status::ACTIVE.to_string(),
                    role: Some(prefix_role::VPN_X_CONNECT.to_string()),
                    site_id: None,
                    vlan_id: None,
                    description: format!("pair {}", i),
                    is_pool: false,
                })
                .await
                .unwrap();
        }
        let events = Recorder::new();
        let err = run(&fixture.inv, &events, &fixture.settings, request())
            .await
            .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::PoolExhausted(_)) => {}
            other => panic!("expected PoolExhausted, got {:?}", other),
        }
    }
}
