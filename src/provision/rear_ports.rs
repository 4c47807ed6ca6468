use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::inventory::Inventory;
use crate::models::{cable_status, Device, NewCable, Termination};

use super::{EventLog, ProvisionError};

#[derive(Debug, Clone, Deserialize)]
pub struct RearPortConnectRequest {
    pub panel_a: String,
    pub panel_b: String,
    /// Record the cables as connected; without the flag they stay planned
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RearPortConnectReport {
    pub panel_a: String,
    pub panel_b: String,
    pub connected: u32,
    pub skipped: u32,
}

/// Wire two patch panels back to back: rear port N of panel A to rear
/// port N of panel B. Ports that already carry a cable are skipped.
pub async fn run(
    inv: &dyn Inventory,
    events: &dyn EventLog,
    req: RearPortConnectRequest,
) -> Result<RearPortConnectReport> {
    if req.panel_a == req.panel_b {
        return Err(ProvisionError::Validation(
            "Cannot connect a panel to itself".to_string(),
        )
        .into());
    }

    let panel_a = require_panel(inv, &req.panel_a).await?;
    let panel_b = require_panel(inv, &req.panel_b).await?;

    let ports_a = inv.list_rear_ports(panel_a.id).await?;
    let ports_b = inv.list_rear_ports(panel_b.id).await?;
    if ports_a.len() != ports_b.len() {
        return Err(ProvisionError::Validation(format!(
            "Port counts differ: '{}' has {}, '{}' has {}",
            panel_a.name,
            ports_a.len(),
            panel_b.name,
            ports_b.len()
        ))
        .into());
    }
    if ports_a.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "'{}' has no rear ports",
            panel_a.name
        ))
        .into());
    }

    let status = if req.connected {
        cable_status::CONNECTED
    } else {
        cable_status::PLANNED
    };

    let mut connected = 0u32;
    let mut skipped = 0u32;
    for (a, b) in ports_a.iter().zip(ports_b.iter()) {
        if a.connected || b.connected {
            events.info(&format!(
                "Ports {}:{} / {}:{} already cabled, skipping",
                panel_a.name, a.name, panel_b.name, b.name
            ));
            skipped += 1;
            continue;
        }
        inv.create_cable(NewCable {
            a: Termination::RearPort(a.id),
            b: Termination::RearPort(b.id),
            status: status.to_string(),
        })
        .await?;
        events.success(&format!(
            "Cabled {}:{} to {}:{} ({})",
            panel_a.name, a.name, panel_b.name, b.name, status
        ));
        connected += 1;
    }

    Ok(RearPortConnectReport {
        panel_a: panel_a.name,
        panel_b: panel_b.name,
        connected,
        skipped,
    })
}

async fn require_panel(inv: &dyn Inventory, name: &str) -> Result<Device> {
    inv.get_device_by_name(name).await?.ok_or_else(|| {
        ProvisionError::Validation(format!("Unknown device '{}'", name)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryInventory;
    use crate::models::NewRearPort;
    use crate::provision::testutil::{new_device, pop_fixture};
    use crate::provision::Recorder;

    async fn panel_with_ports(
        inv: &MemoryInventory,
        site_id: i64,
        name: &str,
        ports: u32,
    ) -> Device {
        let device = inv
            .create_device(new_device(name, "patch-panel-24", "patch-panel", site_id))
            .await
            .unwrap();
        for n in 1..=ports {
            inv.create_rear_port(NewRearPort {
                device_id: device.id,
                name: n.to_string(),
                port_type: "8p8c".to_string(),
                positions: 1,
            })
            .await
            .unwrap();
        }
        device
    }

    #[tokio::test]
    async fn test_connects_ports_pairwise() {
        let fixture = pop_fixture().await;
        let a = panel_with_ports(&fixture.inv, fixture.site.id, "pp-a.1", 4).await;
        let b = panel_with_ports(&fixture.inv, fixture.site.id, "pp-b.1", 4).await;

        let events = Recorder::new();
        let report = run(
            &fixture.inv,
            &events,
            RearPortConnectRequest {
                panel_a: "pp-a.1".to_string(),
                panel_b: "pp-b.1".to_string(),
                connected: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(report.connected, 4);
        assert_eq!(report.skipped, 0);
        for device in [a.id, b.id] {
            let ports = fixture.inv.list_rear_ports(device).await.unwrap();
            assert!(ports.iter().all(|p| p.connected));
        }
    }

    #[tokio::test]
    async fn test_rerun_skips_cabled_ports() {
        let fixture = pop_fixture().await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-a.1", 3).await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-b.1", 3).await;

        let req = RearPortConnectRequest {
            panel_a: "pp-a.1".to_string(),
            panel_b: "pp-b.1".to_string(),
            connected: false,
        };
        let events = Recorder::new();
        run(&fixture.inv, &events, req.clone()).await.unwrap();
        let second = run(&fixture.inv, &events, req).await.unwrap();
        assert_eq!(second.connected, 0);
        assert_eq!(second.skipped, 3);
    }

    #[tokio::test]
    async fn test_count_mismatch_fails_validation() {
        let fixture = pop_fixture().await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-a.1", 4).await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-b.1", 3).await;

        let events = Recorder::new();
        let err = run(
            &fixture.inv,
            &events,
            RearPortConnectRequest {
                panel_a: "pp-a.1".to_string(),
                panel_b: "pp-b.1".to_string(),
                connected: false,
            },
        )
        .await
        .unwrap_err();
        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cables_default_to_planned() {
        let fixture = pop_fixture().await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-a.1", 1).await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-b.1", 1).await;

        let events = Recorder::new();
        let report = run(
            &fixture.inv,
            &events,
            RearPortConnectRequest {
                panel_a: "pp-a.1".to_string(),
                panel_b: "pp-b.1".to_string(),
                connected: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(report.connected, 1);
        let planned = events
            .take()
            .iter()
            .any(|e| e.message.contains("(planned)"));
        assert!(planned);
    }

    #[tokio::test]
    async fn test_connected_flag_sets_cable_status() {
        let fixture = pop_fixture().await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-a.1", 1).await;
        panel_with_ports(&fixture.inv, fixture.site.id, "pp-b.1", 1).await;

        let events = Recorder::new();
        run(
            &fixture.inv,
            &events,
            RearPortConnectRequest {
                panel_a: "pp-a.1".to_string(),
                panel_b: "pp-b.1".to_string(),
                connected: true,
            },
        )
        .await
        .unwrap();
        let connected = events
            .take()
            .iter()
            .any(|e| e.message.contains("(connected)"));
        assert!(connected);
    }
}
