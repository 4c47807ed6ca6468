use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

pub mod backbone_pop;
pub mod primitives;
pub mod rear_ports;
pub mod tunnel;

#[cfg(test)]
pub mod testutil;

/// Base VLAN id for per-site management VLANs
pub const MGMT_VLAN_BASE: i32 = 3000;

/// Typed failure taxonomy for the provisioning workflows. Carried through
/// anyhow and downcast at the API boundary.
#[derive(Debug, Clone)]
pub enum ProvisionError {
    /// Operator input contradicts itself or the inventory
    Validation(String),
    /// No free block of the requested size remains in any container
    PoolExhausted(String),
    /// A required pre-existing object is absent from the inventory
    MissingPrerequisite(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            ProvisionError::PoolExhausted(msg) => write!(f, "Address pool exhausted: {}", msg),
            ProvisionError::MissingPrerequisite(msg) => {
                write!(f, "Missing prerequisite: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProvisionError {}

/// Event severity values
pub mod severity {
    pub const INFO: &str = "info";
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
}

/// One entry in a workflow's operator-visible event stream
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub severity: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Sink for operator-visible workflow events
pub trait EventLog: Send + Sync {
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn failure(&self, message: &str);
}

/// Records events for the response body and mirrors them to tracing
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Event> {
        self.events.lock().map(|mut e| std::mem::take(&mut *e)).unwrap_or_default()
    }

    fn push(&self, severity: &'static str, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(Event {
                severity,
                message: message.to_string(),
                at: Utc::now(),
            });
        }
    }
}

impl EventLog for Recorder {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
        self.push(severity::INFO, message);
    }

    fn success(&self, message: &str) {
        tracing::info!("{}", message);
        self.push(severity::SUCCESS, message);
    }

    fn failure(&self, message: &str) {
        tracing::warn!("{}", message);
        self.push(severity::FAILURE, message);
    }
}

/// Site-independent provisioning parameters, loaded from the environment
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Domain suffix appended to infrastructure node names
    pub infra_domain: String,
    /// Aggregate the per-site management /24s are carved from
    pub mgmt_aggregate: String,
    /// Base networks for router loopback addresses, indexed by node id
    pub loopback_v4_base: String,
    pub loopback_v6_base: String,
    /// Tag that marks tunnel interfaces; must pre-exist on the host
    pub tunnel_tag: String,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            infra_domain: "in.ffho.net".to_string(),
            mgmt_aggregate: "172.30.0.0/16".to_string(),
            loopback_v4_base: "10.132.255.0/24".to_string(),
            loopback_v6_base: "2a03:2260:2342:ffff::/64".to_string(),
            tunnel_tag: "wireguard".to_string(),
        }
    }
}
