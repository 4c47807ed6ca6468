use anyhow::Result;

use crate::inventory::Inventory;
use crate::models::{
    device_status, ip_status, prefix_status, IfaceBinding, IpAddress, NewIpAddress, NewPrefix,
    NewRack, NewVlan, Prefix, Rack, Site, Vlan,
};
use crate::utils::{first_fit, CidrBlock};

use super::{EventLog, ProvisionError};

/// Look up a VLAN by site and name, creating it when absent
pub async fn ensure_vlan(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    site: &Site,
    name: &str,
    vid: i32,
) -> Result<Vlan> {
    if let Some(vlan) = inv.find_vlan(site.id, name).await? {
        if vlan.vid != vid {
            return Err(ProvisionError::Validation(format!(
                "VLAN '{}' exists with vid {}, expected {}",
                name, vlan.vid, vid
            ))
            .into());
        }
        events.info(&format!("VLAN '{}' (vid {}) already present", name, vlan.vid));
        return Ok(vlan);
    }
    let vlan = inv
        .create_vlan(NewVlan {
            site_id: Some(site.id),
            name: name.to_string(),
            vid,
            status: "active".to_string(),
        })
        .await?;
    events.success(&format!("Created VLAN '{}' (vid {})", name, vid));
    Ok(vlan)
}

/// Look up a prefix by its CIDR, creating it when absent
pub async fn ensure_prefix(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    prefix: NewPrefix,
) -> Result<Prefix> {
    if let Some(existing) = inv.find_prefix(&prefix.prefix).await? {
        events.info(&format!("Prefix {} already present", existing.prefix));
        return Ok(existing);
    }
    let created = inv.create_prefix(prefix).await?;
    events.success(&format!("Created prefix {}", created.prefix));
    Ok(created)
}

/// Look up a rack by site and name, creating it when absent
pub async fn ensure_rack(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    site: &Site,
    name: &str,
    u_height: i32,
) -> Result<Rack> {
    if let Some(rack) = inv.find_rack(site.id, name).await? {
        events.info(&format!("Rack '{}' already present in {}", name, site.name));
        return Ok(rack);
    }
    let rack = inv
        .create_rack(NewRack {
            site_id: site.id,
            name: name.to_string(),
            status: device_status::PLANNED.to_string(),
            u_height,
        })
        .await?;
    events.success(&format!("Created rack '{}' in {}", name, site.name));
    Ok(rack)
}

/// Carve the first free block of `desired_len` out of `container` and
/// persist it. Fails with PoolExhausted when no remaining gap can hold a
/// block of that size.
pub async fn allocate_subblock(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    container: &Prefix,
    desired_len: u8,
    template: NewPrefix,
) -> Result<Prefix> {
    let outer = CidrBlock::parse(&container.prefix).map_err(anyhow::Error::msg)?;
    let children = inv.list_prefixes_within(&container.prefix).await?;
    let allocated: Vec<CidrBlock> = children
        .iter()
        .filter_map(|p| CidrBlock::parse(&p.prefix).ok())
        .collect();

    let block = first_fit(&outer, &allocated, desired_len).ok_or_else(|| {
        ProvisionError::PoolExhausted(format!(
            "no free /{} in {}",
            desired_len, container.prefix
        ))
    })?;

    let created = inv
        .create_prefix(NewPrefix {
            prefix: block.to_string(),
            ..template
        })
        .await?;
    events.success(&format!(
        "Allocated {} from {}",
        created.prefix, container.prefix
    ));
    Ok(created)
}

/// Result of resolving a site's management octet
pub struct MgmtAllocation {
    /// Third octet of the site's management /24
    pub octet: u8,
    /// The existing management prefix, when the site already has one
    pub existing: Option<Prefix>,
}

/// Resolve the site number: reuse the third octet of the site's existing
/// management prefix, or pick the first free /24 in the aggregate.
pub async fn next_free_mgmt_octet(
    inv: &dyn Inventory,
    site: &Site,
    aggregate: &str,
) -> Result<MgmtAllocation> {
    let outer = CidrBlock::parse(aggregate).map_err(anyhow::Error::msg)?;
    let children = inv.list_prefixes_within(aggregate).await?;

    if let Some(existing) = children.iter().find(|p| p.site_id == Some(site.id)) {
        let block = CidrBlock::parse(&existing.prefix).map_err(anyhow::Error::msg)?;
        return Ok(MgmtAllocation {
            octet: ((block.network >> 8) & 0xff) as u8,
            existing: Some(existing.clone()),
        });
    }

    let allocated: Vec<CidrBlock> = children
        .iter()
        .filter_map(|p| CidrBlock::parse(&p.prefix).ok())
        .collect();
    let block = first_fit(&outer, &allocated, 24).ok_or_else(|| {
        ProvisionError::PoolExhausted(format!("no free /24 in {}", aggregate))
    })?;
    Ok(MgmtAllocation {
        octet: ((block.network >> 8) & 0xff) as u8,
        existing: None,
    })
}

/// Look up an address, creating and binding it to `binding` when absent.
/// An address that already exists is left exactly as found.
pub async fn configure_ip(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    address: &str,
    binding: IfaceBinding,
    description: &str,
) -> Result<IpAddress> {
    if let Some(existing) = inv.find_ip(address).await? {
        if existing.interface == Some(binding) {
            events.info(&format!("Address {} already bound", address));
        } else {
            events.info(&format!(
                "Address {} already present, leaving assignment untouched",
                address
            ));
        }
        return Ok(existing);
    }
    let created = inv
        .create_ip(NewIpAddress {
            address: address.to_string(),
            status: ip_status::ACTIVE.to_string(),
            interface: Some(binding),
            description: description.to_string(),
        })
        .await?;
    events.success(&format!("Assigned {}", address));
    Ok(created)
}

/// Template for a prefix carved out of a container; keeps call sites
/// readable when most fields carry over
pub fn child_prefix(container: &Prefix, description: String) -> NewPrefix {
    NewPrefix {
        prefix: String::new(),
        status: prefix_status::ACTIVE.to_string(),
        role: container.role.clone(),
        site_id: container.site_id,
        vlan_id: None,
        description,
        is_pool: false,
    }
}
