use std::env;

use crate::provision::ProvisionSettings;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub netbox_url: String,
    pub netbox_token: String,
    pub infra_domain: String,
    pub mgmt_aggregate: String,
    pub loopback_v4_base: String,
    pub loopback_v6_base: String,
    pub tunnel_tag: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        let defaults = ProvisionSettings::default();
        Self {
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            netbox_url: get_env("NETBOX_URL", "http://localhost:8000"),
            netbox_token: get_env("NETBOX_TOKEN", ""),
            infra_domain: get_env("INFRA_DOMAIN", &defaults.infra_domain),
            mgmt_aggregate: get_env("MGMT_AGGREGATE", &defaults.mgmt_aggregate),
            loopback_v4_base: get_env("LOOPBACK_V4_BASE", &defaults.loopback_v4_base),
            loopback_v6_base: get_env("LOOPBACK_V6_BASE", &defaults.loopback_v6_base),
            tunnel_tag: get_env("TUNNEL_TAG", &defaults.tunnel_tag),
        }
    }

    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            infra_domain: self.infra_domain.clone(),
            mgmt_aggregate: self.mgmt_aggregate.clone(),
            loopback_v4_base: self.loopback_v4_base.clone(),
            loopback_v6_base: self.loopback_v6_base.clone(),
            tunnel_tag: self.tunnel_tag.clone(),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
