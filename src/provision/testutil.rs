use std::collections::HashMap;

use crate::inventory::{Inventory, MemoryInventory};
use crate::models::{NewDevice, NewPrefix, Site};

use super::ProvisionSettings;

pub struct Fixture {
    pub inv: MemoryInventory,
    pub site: Site,
    pub settings: ProvisionSettings,
}

/// Inventory seeded the way a real host looks before a POP bring-up:
/// site and device types exist, the management aggregate is registered,
/// nothing site-specific has been provisioned yet.
pub async fn pop_fixture() -> Fixture {
    let inv = MemoryInventory::new();
    let site = inv.add_site("Pobelhausen", "pbhsw", "active").await;

    inv.register_device_type("19\" 24-port Panel", "patch-panel-24", &[]).await;
    inv.register_device_type("Single-port Surge Protector", "surge-protector-1", &[]).await;
    inv.register_device_type(
        "WS-12-250-AC",
        "ws-12-250-ac",
        &[
            ("1", "1000base-t"),
            ("2", "1000base-t"),
            ("3", "1000base-t"),
            ("4", "1000base-t"),
            ("5", "1000base-t"),
            ("6", "1000base-t"),
            ("7", "1000base-t"),
            ("8", "1000base-t"),
            ("9", "1000base-t"),
            ("10", "1000base-t"),
            ("11", "1000base-t"),
            ("12", "1000base-t"),
            ("13", "1000base-t"),
            ("14", "1000base-t"),
        ],
    )
    .await;
    inv.register_device_type(
        "APU4D4",
        "apu-4d4",
        &[
            ("enp1s0", "1000base-t"),
            ("enp2s0", "1000base-t"),
            ("enp3s0", "1000base-t"),
            ("lo", "virtual"),
        ],
    )
    .await;

    inv.create_prefix(NewPrefix {
        prefix: "172.30.0.0/16".to_string(),
        status: "container".to_string(),
        role: None,
        site_id: None,
        vlan_id: None,
        description: "Management".to_string(),
        is_pool: false,
    })
    .await
    .unwrap();

    Fixture {
        inv,
        site,
        settings: ProvisionSettings::default(),
    }
}

/// Shorthand for an active device creation request
pub fn new_device(name: &str, device_type: &str, role: &str, site_id: i64) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        device_type: device_type.to_string(),
        role: role.to_string(),
        site_id,
        rack_id: None,
        position: None,
        status: "active".to_string(),
        serial: None,
        asset_tag: None,
        custom_fields: HashMap::new(),
    }
}

/// WireGuard key material in the shape the tunnel workflow expects
pub fn wg_context(pubkey: &str) -> serde_json::Value {
    serde_json::json!({
        "wireguard": {
            "privkey": "private-key-material",
            "pubkey": pubkey,
        }
    })
}
