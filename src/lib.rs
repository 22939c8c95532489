//! Async Rust client for the [ASCOM Alpaca](https://ascom-standards.org/AlpacaDeveloper/)
//! device API.
//!
//! Alpaca exposes astronomy hardware (telescopes, cameras, domes, ...) over
//! a REST/JSON protocol, with a companion UDP mechanism for finding servers
//! on the local network. This crate implements the client side of both:
//!
//! - [`DiscoveryClient`] locates servers via UDP broadcast/multicast;
//! - [`ManagementClient`] enumerates a server's configured devices;
//! - [`DeviceClient`] binds one remote device instance and carries the
//!   members common to all device types, plus raw [`get`](DeviceClient::get)/
//!   [`put`](DeviceClient::put) access for building typed wrappers on top;
//! - protocol errors surface as [`DeviceError`] (classified by [`ErrorKind`]),
//!   network failures as [`TransportError`].
//!
//! Connecting follows the Platform 7 asynchronous model on devices that
//! support it and transparently emulates it on older ones; either way, poll
//! [`DeviceClient::connecting`] after [`DeviceClient::connect`] until it
//! reports `false`:
//!
//! ```no_run
//! use ascom_alpaca_client::{DeviceClient, DiscoveryClient};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let servers = DiscoveryClient::new().search_ipv4().await?;
//! let telescope = DeviceClient::new_from_addr(servers[0], "telescope", 0)?;
//!
//! telescope.connect().await?;
//! while telescope.connecting().await? {
//!     tokio::time::sleep(Duration::from_millis(500)).await;
//! }
//!
//! println!("connected to {}", telescope.name().await?);
//! # Ok(())
//! # }
//! ```
//!
//! The library never retries a failed call (device commands are not
//! idempotent) and never blocks without a deadline: HTTP calls carry the
//! [`ClientOptions::timeout`] and discovery listens for a bounded window.

mod connection;
mod device;
mod discovery;
mod errors;
mod management;
mod params;
mod response;
mod transaction;
mod transport;

#[cfg(test)]
mod test_server;

pub use connection::ConnectionState;
pub use device::{DeviceClient, DeviceStateItem};
pub use discovery::{DEFAULT_DISCOVERY_PORT, DiscoveryClient};
pub use errors::{DeviceError, Error, ErrorCode, ErrorKind, Result, TransportError};
pub use management::{ConfiguredDevice, ManagementClient, ServerDescription};
pub use params::{AlpacaParam, OpaqueParams};
pub use transaction::TransactionSource;
pub use transport::ClientOptions;
