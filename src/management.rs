use crate::device::DeviceClient;
use crate::errors::{Result, TransportError};
use crate::params::{Method, params};
use crate::transport::{ClientOptions, RawClient};
use reqwest::IntoUrl;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// One device entry from the server's configured-devices list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredDevice {
    /// The name of the device.
    #[serde(rename = "DeviceName")]
    pub name: String,
    /// The ASCOM standard name for the type of device.
    #[serde(rename = "DeviceType")]
    pub device_type: String,
    /// The index of the device among devices of the same type.
    #[serde(rename = "DeviceNumber")]
    pub device_number: u32,
    /// A globally unique id for this device.
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
}

/// General information about the server, from the management description
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerDescription {
    /// Server name.
    pub server_name: String,
    /// Manufacturer name.
    pub manufacturer: String,
    /// Manufacturer version.
    pub manufacturer_version: String,
    /// Server location.
    pub location: String,
}

/// Client for an Alpaca server's management endpoints.
///
/// Stateless request/response against the `management/` namespace; typically
/// used right after discovery to enumerate a server's devices. Failures
/// surface through the same error taxonomy as device calls.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    inner: RawClient,
}

impl ManagementClient {
    /// Create a client for the server at `base_url`
    /// (e.g. `http://astroberry.local:11111/`).
    pub fn new(base_url: impl IntoUrl) -> Result<Self, TransportError> {
        Self::new_with(base_url, ClientOptions::default())
    }

    /// Create a client for a server address as produced by discovery.
    pub fn new_from_addr(addr: impl Into<SocketAddr>) -> Result<Self, TransportError> {
        Self::new(format!("http://{}/", addr.into()))
    }

    /// Create a client with explicit [`ClientOptions`].
    pub fn new_with(
        base_url: impl IntoUrl,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            inner: RawClient::new(base_url, options)?,
        })
    }

    /// The Alpaca API versions supported by this server.
    pub async fn api_versions(&self) -> Result<Vec<u32>> {
        self.inner
            .request(Method::Get, "management/apiversions", params! {})
            .await
    }

    /// Description of the server as a whole (not of any one device).
    pub async fn description(&self) -> Result<ServerDescription> {
        self.inner
            .request(Method::Get, "management/v1/description", params! {})
            .await
    }

    /// The devices this server exposes.
    pub async fn configured_devices(&self) -> Result<Vec<ConfiguredDevice>> {
        self.inner
            .request(Method::Get, "management/v1/configureddevices", params! {})
            .await
    }

    /// Build a [`DeviceClient`] for one of this server's devices, sharing
    /// this client's connection pool and transaction source.
    pub fn device(&self, device: &ConfiguredDevice) -> Result<DeviceClient, TransportError> {
        DeviceClient::from_raw(&self.inner, &device.device_type, device.device_number)
    }
}
