use crate::connection::{CompletionMode, ConnectionState, ConnectionStateMachine, Direction};
use crate::errors::{Error, Result, TransportError};
use crate::params::{Method, OpaqueParams, params};
use crate::transport::{ClientOptions, RawClient};
use reqwest::IntoUrl;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::OnceCell;

/// One entry of a Platform 7 `devicestate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceStateItem {
    /// The property name, cased as in the device interface definition.
    pub name: String,
    /// The corresponding value, dynamically typed.
    pub value: serde_json::Value,
}

/// Client for one device instance on an Alpaca server.
///
/// Owns the HTTP binding to
/// `http://{host}:{port}/api/v1/{device_type}/{device_number}/` and the
/// connect/disconnect state machine for that binding. Device-type wrappers
/// compose this type and delegate their members to [`get`](Self::get) and
/// [`put`](Self::put).
///
/// # Connection lifecycle
///
/// [`connect`](Self::connect) and [`disconnect`](Self::disconnect) start an
/// asynchronous operation; [`connecting`](Self::connecting) is the completion
/// property. **Always poll `connecting` at least once after starting an
/// operation**: for devices without native async connect the operation is
/// emulated over the blocking `Connected` property, and a failure of that
/// write is only surfaced on the first subsequent `connecting` read. This is
/// a deliberate part of the contract so that calling code is identical for
/// old and new servers.
#[derive(Debug)]
pub struct DeviceClient {
    inner: RawClient,
    device_type: String,
    device_number: u32,
    interface_version: OnceCell<i32>,
    connection: Mutex<ConnectionStateMachine>,
}

/// Interface version required for native `connect`/`disconnect`/`connecting`
/// support, per device type (the Platform 7 interface revisions).
fn modern_interface_version(device_type: &str) -> i32 {
    match device_type {
        "camera" | "focuser" | "rotator" | "telescope" => 4,
        "dome" | "filterwheel" | "safetymonitor" | "switch" => 3,
        "covercalibrator" | "observingconditions" => 2,
        // Unknown device types take the emulated path, which only relies on
        // the legacy Connected property.
        _ => i32::MAX,
    }
}

impl DeviceClient {
    /// Create a client for the given device on the server at `base_url`
    /// (e.g. `http://astroberry.local:11111/`).
    ///
    /// The device type is one of the standard ASCOM device type names and is
    /// matched case-insensitively.
    pub fn new(
        base_url: impl IntoUrl,
        device_type: &str,
        device_number: u32,
    ) -> Result<Self, TransportError> {
        Self::new_with(base_url, device_type, device_number, ClientOptions::default())
    }

    /// Create a client for a server address as produced by discovery.
    pub fn new_from_addr(
        addr: impl Into<SocketAddr>,
        device_type: &str,
        device_number: u32,
    ) -> Result<Self, TransportError> {
        Self::new(format!("http://{}/", addr.into()), device_type, device_number)
    }

    /// Create a client with explicit [`ClientOptions`].
    pub fn new_with(
        base_url: impl IntoUrl,
        device_type: &str,
        device_number: u32,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        Self::from_raw(&RawClient::new(base_url, options)?, device_type, device_number)
    }

    pub(crate) fn from_raw(
        server: &RawClient,
        device_type: &str,
        device_number: u32,
    ) -> Result<Self, TransportError> {
        let device_type = device_type.to_ascii_lowercase();
        let inner = server.join(&format!("api/v1/{device_type}/{device_number}/"))?;
        Ok(Self {
            inner,
            device_type,
            device_number,
            interface_version: OnceCell::new(),
            connection: Mutex::new(ConnectionStateMachine::new()),
        })
    }

    /// The lower-cased device type name of this binding.
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// The zero-based device number of this binding.
    pub const fn device_number(&self) -> u32 {
        self.device_number
    }

    fn connection(&self) -> MutexGuard<'_, ConnectionStateMachine> {
        self.connection.lock().expect("connection state poisoned")
    }

    /// Read a device member via `GET`, decoding `Value` into `R`.
    pub async fn get<R: DeserializeOwned + 'static>(
        &self,
        member: &str,
        params: OpaqueParams,
    ) -> Result<R> {
        self.inner.request(Method::Get, member, params).await
    }

    /// Invoke a device member via `PUT`, decoding `Value` into `R`.
    pub async fn put<R: DeserializeOwned + 'static>(
        &self,
        member: &str,
        params: OpaqueParams,
    ) -> Result<R> {
        self.inner.request(Method::Put, member, params).await
    }

    /// Invoke a device member via `PUT`, ignoring any returned value.
    pub async fn put_void(&self, member: &str, params: OpaqueParams) -> Result<()> {
        self.put(member, params).await
    }
}

/// Members common to all ASCOM devices.
impl DeviceClient {
    /// Invoke the device-specific custom action named in
    /// [`supported_actions`](Self::supported_actions).
    ///
    /// Actions are the standardised mechanic for exposing functionality
    /// beyond the built-in device interfaces; parameter and return strings
    /// can carry arbitrarily complex data, for example as JSON.
    pub async fn action(&self, action: &str, parameters: &str) -> Result<String> {
        self.put(
            "action",
            params! { "Action": action, "Parameters": parameters },
        )
        .await
    }

    /// Transmit an arbitrary string to the device without waiting for a
    /// response.
    #[deprecated(note = "Use the more flexible Action and SupportedActions mechanic.")]
    pub async fn command_blind(&self, command: &str, raw: bool) -> Result<()> {
        self.put_void("commandblind", params! { "Command": command, "Raw": raw })
            .await
    }

    /// Transmit an arbitrary string to the device and wait for a boolean
    /// response.
    #[deprecated(note = "Use the more flexible Action and SupportedActions mechanic.")]
    pub async fn command_bool(&self, command: &str, raw: bool) -> Result<bool> {
        self.put("commandbool", params! { "Command": command, "Raw": raw })
            .await
    }

    /// Transmit an arbitrary string to the device and wait for a string
    /// response.
    #[deprecated(note = "Use the more flexible Action and SupportedActions mechanic.")]
    pub async fn command_string(&self, command: &str, raw: bool) -> Result<String> {
        self.put("commandstring", params! { "Command": command, "Raw": raw })
            .await
    }

    /// The current hardware connection state, as reported by the device.
    pub async fn connected(&self) -> Result<bool> {
        self.get("connected", params! {}).await
    }

    /// Set the legacy synchronous `Connected` property directly.
    ///
    /// Prefer [`connect`](Self::connect)/[`disconnect`](Self::disconnect),
    /// which work uniformly across device generations.
    pub async fn set_connected(&self, connected: bool) -> Result<()> {
        self.put_void("connected", params! { "Connected": connected })
            .await
    }

    /// Description of the device, such as manufacturer and model number.
    pub async fn description(&self) -> Result<String> {
        self.get("description", params! {}).await
    }

    /// Descriptive and version information about the driver, one string per
    /// comma-separated item.
    pub async fn driver_info(&self) -> Result<Vec<String>> {
        let info: String = self.get("driverinfo", params! {}).await?;
        Ok(info.split(',').map(|item| item.trim().to_owned()).collect())
    }

    /// Major.minor version string of the driver.
    pub async fn driver_version(&self) -> Result<String> {
        self.get("driverversion", params! {}).await
    }

    /// The interface definition version this device supports.
    ///
    /// Fetched from the device on first use and cached for the lifetime of
    /// this client.
    pub async fn interface_version(&self) -> Result<i32> {
        self.interface_version
            .get_or_try_init(|| self.get("interfaceversion", params! {}))
            .await
            .copied()
    }

    /// The short display name of the device.
    pub async fn name(&self) -> Result<String> {
        self.get("name", params! {}).await
    }

    /// The custom action names usable with [`action`](Self::action).
    pub async fn supported_actions(&self) -> Result<Vec<String>> {
        self.get("supportedactions", params! {}).await
    }

    /// All operational state values the device can report definitively.
    ///
    /// _Platform 7 onward._ Entries with unknown values are omitted by the
    /// device, so callers must tolerate missing names.
    pub async fn device_state(&self) -> Result<Vec<DeviceStateItem>> {
        self.get("devicestate", params! {}).await
    }
}

/// Connect/disconnect lifecycle.
impl DeviceClient {
    /// The lifecycle state of this binding. No network round-trip.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection().state()
    }

    /// Start connecting to the device hardware.
    ///
    /// Returns as soon as the operation is under way; poll
    /// [`connecting`](Self::connecting) until it reports `false` to observe
    /// the outcome (see the type-level docs for why this is mandatory).
    pub async fn connect(&self) -> Result<()> {
        self.start_transition(Direction::Connect).await
    }

    /// Start disconnecting from the device hardware. Mirrors
    /// [`connect`](Self::connect).
    pub async fn disconnect(&self) -> Result<()> {
        self.start_transition(Direction::Disconnect).await
    }

    async fn start_transition(&self, direction: Direction) -> Result<()> {
        let mode = self.completion_mode().await?;
        match mode {
            CompletionMode::Native => {
                // An error here means the operation never started; the
                // binding keeps its previous state.
                self.put_void(direction.start_action(), params! {}).await?;
                self.connection().begin(mode, direction);
                Ok(())
            }
            CompletionMode::Emulated => {
                // The blocking write completes (or fails) right here, but the
                // outcome is reported through the completion property so that
                // callers can't tell old devices from new ones.
                let result = self
                    .put_void("connected", params! { "Connected": direction.target() })
                    .await;
                let mut connection = self.connection();
                connection.begin(mode, direction);
                if let Err(err) = result {
                    connection.defer(err);
                }
                Ok(())
            }
        }
    }

    /// Completion property: whether a connect/disconnect operation is still
    /// in flight.
    ///
    /// A `false` return is the only trustworthy success signal; a failed
    /// operation surfaces its error on this read, leaving the binding
    /// `Disconnected`. With no operation in flight this reports `false`
    /// without a network round-trip.
    pub async fn connecting(&self) -> Result<bool> {
        let (in_flight, deferred) = {
            let mut connection = self.connection();
            (connection.in_flight(), connection.take_deferred())
        };

        if let Some(err) = deferred {
            self.connection().fail();
            return Err(err);
        }

        let Some((mode, direction)) = in_flight else {
            return Ok(false);
        };

        match mode {
            // The emulated write already finished; the transition is done.
            CompletionMode::Emulated => {
                self.connection().complete(direction);
                Ok(false)
            }
            CompletionMode::Native => match self.get("connecting", params! {}).await {
                Ok(true) => Ok(true),
                Ok(false) => {
                    self.connection().complete(direction);
                    Ok(false)
                }
                Err(err) => {
                    self.connection().fail();
                    Err(err)
                }
            },
        }
    }

    async fn completion_mode(&self) -> Result<CompletionMode> {
        let version = match self.interface_version().await {
            Ok(version) => version,
            // Devices that error on `interfaceversion` predate async connect.
            Err(Error::Device(_)) => 1,
            Err(err) => return Err(err),
        };
        Ok(if version >= modern_interface_version(&self.device_type) {
            CompletionMode::Native
        } else {
            CompletionMode::Emulated
        })
    }
}
