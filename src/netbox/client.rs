use anyhow::Result;
use reqwest::Client;
use std::time::Duration;

use super::types::*;

/// NetBox API client
pub struct NetBoxClient {
    base_url: String,
    token: String,
    client: Client,
}

impl NetBoxClient {
    pub fn new(url: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    /// Helper to perform a filtered GET list request
    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let resp = self
            .client
            .get(self.api_url(endpoint))
            .query(&[("limit", "1000".to_string())])
            .query(query)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("NetBox API error {}: {}", status, body));
        }

        let paginated: PaginatedResponse<T> = resp.json().await?;
        Ok(paginated.results)
    }

    /// Helper to create a resource via POST
    async fn create_resource<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let resp = self
            .client
            .post(self.api_url(endpoint))
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("NetBox API create error: {}", body));
        }

        Ok(resp.json().await?)
    }

    /// Helper to partially update a resource via PATCH
    async fn patch_resource<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let resp = self
            .client
            .patch(self.api_url(endpoint))
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("NetBox API update error: {}", body));
        }

        Ok(resp.json().await?)
    }

    /// Test connectivity to NetBox
    pub async fn test_connection(&self) -> bool {
        match self
            .client
            .get(self.api_url("/dcim/sites/?limit=1"))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    // --- Sites and racks ---

    pub async fn get_sites_by_name(&self, name: &str) -> Result<Vec<NbSite>> {
        self.list("/dcim/sites/", &[("name", name.to_string())]).await
    }

    pub async fn get_racks(&self, site_id: i64, name: &str) -> Result<Vec<NbRack>> {
        self.list(
            "/dcim/racks/",
            &[("site_id", site_id.to_string()), ("name", name.to_string())],
        )
        .await
    }

    pub async fn create_rack(&self, rack: &RackCreate) -> Result<NbRack> {
        self.create_resource("/dcim/racks/", rack).await
    }

    // --- Device types and roles ---

    pub async fn get_device_type_by_slug(&self, slug: &str) -> Result<Option<NbDeviceType>> {
        Ok(self
            .list("/dcim/device-types/", &[("slug", slug.to_string())])
            .await?
            .into_iter()
            .next())
    }

    pub async fn get_role_by_slug(&self, slug: &str) -> Result<Option<NbDeviceRole>> {
        Ok(self
            .list("/dcim/device-roles/", &[("slug", slug.to_string())])
            .await?
            .into_iter()
            .next())
    }

    // --- Devices and virtual machines ---

    pub async fn get_devices_by_name(&self, name: &str) -> Result<Vec<NbDevice>> {
        self.list("/dcim/devices/", &[("name", name.to_string())]).await
    }

    pub async fn get_device(&self, id: i64) -> Result<Option<NbDevice>> {
        Ok(self
            .list("/dcim/devices/", &[("id", id.to_string())])
            .await?
            .into_iter()
            .next())
    }

    pub async fn create_device(&self, device: &DeviceCreate) -> Result<NbDevice> {
        self.create_resource("/dcim/devices/", device).await
    }

    pub async fn patch_device(&self, id: i64, body: &serde_json::Value) -> Result<NbDevice> {
        self.patch_resource(&format!("/dcim/devices/{}/", id), body).await
    }

    pub async fn get_vms_by_name(&self, name: &str) -> Result<Vec<NbVirtualMachine>> {
        self.list("/virtualization/virtual-machines/", &[("name", name.to_string())])
            .await
    }

    pub async fn get_vm(&self, id: i64) -> Result<Option<NbVirtualMachine>> {
        Ok(self
            .list("/virtualization/virtual-machines/", &[("id", id.to_string())])
            .await?
            .into_iter()
            .next())
    }

    // --- Interfaces ---

    pub async fn list_device_interfaces(&self, device_id: i64) -> Result<Vec<NbInterface>> {
        self.list("/dcim/interfaces/", &[("device_id", device_id.to_string())])
            .await
    }

    pub async fn list_vm_interfaces(&self, vm_id: i64) -> Result<Vec<NbInterface>> {
        self.list(
            "/virtualization/interfaces/",
            &[("virtual_machine_id", vm_id.to_string())],
        )
        .await
    }

    pub async fn create_device_interface(&self, iface: &InterfaceCreate) -> Result<NbInterface> {
        self.create_resource("/dcim/interfaces/", iface).await
    }

    pub async fn create_vm_interface(&self, iface: &InterfaceCreate) -> Result<NbInterface> {
        self.create_resource("/virtualization/interfaces/", iface).await
    }

    pub async fn patch_device_interface(
        &self,
        id: i64,
        body: &serde_json::Value,
    ) -> Result<NbInterface> {
        self.patch_resource(&format!("/dcim/interfaces/{}/", id), body).await
    }

    pub async fn patch_vm_interface(
        &self,
        id: i64,
        body: &serde_json::Value,
    ) -> Result<NbInterface> {
        self.patch_resource(&format!("/virtualization/interfaces/{}/", id), body)
            .await
    }

    // --- Pass-through ports ---

    pub async fn list_rear_ports(&self, device_id: i64) -> Result<Vec<NbRearPort>> {
        self.list("/dcim/rear-ports/", &[("device_id", device_id.to_string())])
            .await
    }

    pub async fn list_front_ports(&self, device_id: i64) -> Result<Vec<NbFrontPort>> {
        self.list("/dcim/front-ports/", &[("device_id", device_id.to_string())])
            .await
    }

    pub async fn create_rear_port(&self, port: &RearPortCreate) -> Result<NbRearPort> {
        self.create_resource("/dcim/rear-ports/", port).await
    }

    pub async fn create_front_port(&self, port: &FrontPortCreate) -> Result<NbFrontPort> {
        self.create_resource("/dcim/front-ports/", port).await
    }

    // --- Cables ---

    pub async fn create_cable(&self, cable: &CableCreate) -> Result<NbCable> {
        self.create_resource("/dcim/cables/", cable).await
    }

    // --- VLANs, prefixes and addresses ---

    pub async fn get_vlans(&self, site_id: i64, name: &str) -> Result<Vec<NbVlan>> {
        self.list(
            "/ipam/vlans/",
            &[("site_id", site_id.to_string()), ("name", name.to_string())],
        )
        .await
    }

    pub async fn create_vlan(&self, vlan: &VlanCreate) -> Result<NbVlan> {
        self.create_resource("/ipam/vlans/", vlan).await
    }

    pub async fn get_prefix_role_by_slug(&self, slug: &str) -> Result<Option<NbIpamRole>> {
        Ok(self
            .list("/ipam/roles/", &[("slug", slug.to_string())])
            .await?
            .into_iter()
            .next())
    }

    pub async fn get_prefixes_exact(&self, prefix: &str) -> Result<Vec<NbPrefix>> {
        self.list("/ipam/prefixes/", &[("prefix", prefix.to_string())]).await
    }

    pub async fn get_prefixes_within(&self, container: &str) -> Result<Vec<NbPrefix>> {
        self.list("/ipam/prefixes/", &[("within", container.to_string())])
            .await
    }

    pub async fn get_prefixes_by_role(&self, role: &str, family: u8) -> Result<Vec<NbPrefix>> {
        self.list(
            "/ipam/prefixes/",
            &[("role", role.to_string()), ("family", family.to_string())],
        )
        .await
    }

    pub async fn create_prefix(&self, prefix: &PrefixCreate) -> Result<NbPrefix> {
        self.create_resource("/ipam/prefixes/", prefix).await
    }

    pub async fn get_ips_by_address(&self, address: &str) -> Result<Vec<NbIpAddress>> {
        self.list("/ipam/ip-addresses/", &[("address", address.to_string())])
            .await
    }

    pub async fn create_ip(&self, ip: &IpAddressCreate) -> Result<NbIpAddress> {
        self.create_resource("/ipam/ip-addresses/", ip).await
    }

    // --- Tags ---

    pub async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<NbTag>> {
        Ok(self
            .list("/extras/tags/", &[("slug", slug.to_string())])
            .await?
            .into_iter()
            .next())
    }
}
