//! Discovery of Alpaca device servers on the local network.

use net_literals::ipv6;
use netdev::Interface;
use serde::Deserialize;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};

/// The well-known Alpaca discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 32227;

pub(crate) const DISCOVERY_MSG: &[u8] = b"alpacadiscovery1";
pub(crate) const DISCOVERY_ADDR_V6: Ipv6Addr = ipv6!("ff12::a1:9aca");

#[derive(Debug, Deserialize)]
struct AlpacaPort {
    #[serde(rename = "AlpacaPort")]
    alpaca_port: u16,
}

fn get_active_interfaces() -> impl Iterator<Item = Interface> {
    netdev::get_interfaces()
        .into_iter()
        .filter(Interface::is_running)
}

#[tracing::instrument(level = "trace")]
pub(crate) fn bind_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    // Non-blocking mode is required to hand the socket to tokio.
    socket.set_nonblocking(true)?;
    // Reuse address for parallel client instances in e.g. tests.
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        // We want to receive v4-mapped responses on the same socket.
        socket.set_only_v6(false)?;
    }
    // SIO_UDP_CONNRESET is needed to ignore the occasional "port unreachable"
    // errors on Windows; those tend to render the socket unusable otherwise.
    #[cfg(windows)]
    {
        use std::os::windows::prelude::AsRawSocket;
        use windows_sys::Win32::Networking::WinSock::{
            SIO_UDP_CONNRESET, WSAGetLastError, ioctlsocket,
        };

        #[expect(
            clippy::as_conversions,
            clippy::cast_possible_truncation,
            clippy::cast_possible_wrap
        )]
        let result =
            unsafe { ioctlsocket(socket.as_raw_socket() as _, SIO_UDP_CONNRESET as _, &mut 0) };
        if result != 0 {
            return Err(io::Error::from_raw_os_error(unsafe { WSAGetLastError() }));
        }
    }
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Strip v4-mapping and collapse the IPv4 loopback block, so that one server
/// reachable over several local routes dedups to one address.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip.to_canonical() {
        IpAddr::V4(v4) if v4.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other,
    }
}

/// Client discovering Alpaca servers reachable from local network interfaces.
///
/// Sends the discovery token over UDP to every active local interface and
/// collects distinct responding server addresses within a bounded window.
/// Interfaces that cannot be queried are skipped with a warning; only failure
/// to set up the query socket itself is fatal.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryClient {
    /// Number of discovery requests to send on each interface.
    ///
    /// Defaults to 1.
    pub num_requests: usize,
    /// How long to listen for responses after each round of requests.
    ///
    /// Defaults to 2 seconds. The search always returns once the window
    /// closes, even if nothing responded.
    pub timeout: Duration,
    /// Discovery port to send requests to.
    ///
    /// Defaults to 32227.
    pub discovery_port: u16,
}

impl DiscoveryClient {
    /// Create a discovery client with default settings.
    pub const fn new() -> Self {
        Self {
            num_requests: 1,
            timeout: Duration::from_secs(2),
            discovery_port: DEFAULT_DISCOVERY_PORT,
        }
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryClient {
    /// Discover Alpaca servers over IPv4.
    ///
    /// The discovery token is broadcast on every running interface's IPv4
    /// subnets (loopback addresses get a direct send, as broadcast does not
    /// traverse loopback on all platforms). Returns the distinct responding
    /// server addresses, in arrival order.
    #[tracing::instrument]
    pub async fn search_ipv4(&self) -> io::Result<Vec<SocketAddr>> {
        let socket = bind_socket(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
        socket.set_broadcast(true)?;

        let mut found = Vec::new();
        for request_num in 0..self.num_requests {
            tracing::debug!(request_num, "Sending IPv4 discovery requests");
            for interface in get_active_interfaces() {
                for net in &interface.ipv4 {
                    let dest = if net.addr().is_loopback() {
                        Ipv4Addr::LOCALHOST
                    } else {
                        net.broadcast()
                    };
                    if let Err(err) = socket
                        .send_to(DISCOVERY_MSG, (dest, self.discovery_port))
                        .await
                    {
                        tracing::warn!(
                            interface = %interface.name,
                            %dest,
                            %err,
                            "Skipping unreachable interface address",
                        );
                    }
                }
            }
            self.collect_responses(&socket, &mut found).await;
        }
        Ok(found)
    }

    /// Discover Alpaca servers over IPv6.
    ///
    /// The discovery token is multicast to the Alpaca group `ff12::a1:9aca`
    /// once per running IPv6-capable interface. v4-mapped responses are
    /// reported as IPv4 addresses.
    #[tracing::instrument]
    pub async fn search_ipv6(&self) -> io::Result<Vec<SocketAddr>> {
        let socket = bind_socket(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)))?;

        let mut found = Vec::new();
        for request_num in 0..self.num_requests {
            tracing::debug!(request_num, "Sending IPv6 discovery requests");
            for interface in get_active_interfaces() {
                if interface.ipv6.is_empty() {
                    continue;
                }
                if let Err(err) = SockRef::from(&socket).set_multicast_if_v6(interface.index) {
                    tracing::warn!(interface = %interface.name, %err, "Skipping interface");
                    continue;
                }
                if let Err(err) = socket
                    .send_to(DISCOVERY_MSG, (DISCOVERY_ADDR_V6, self.discovery_port))
                    .await
                {
                    tracing::warn!(interface = %interface.name, %err, "Skipping interface");
                }
            }
            self.collect_responses(&socket, &mut found).await;
        }
        Ok(found)
    }

    /// Collect and dedup responses until the listen window closes.
    async fn collect_responses(&self, socket: &UdpSocket, found: &mut Vec<SocketAddr>) {
        let deadline = Instant::now() + self.timeout;
        // "{"AlpacaPort":65535}" plus some slack for whitespace.
        let mut buf = [0_u8; 64];
        loop {
            let (len, src) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok(received)) => received,
                Ok(Err(err)) => {
                    tracing::warn!(%err, "Error receiving discovery response");
                    continue;
                }
                Err(_elapsed) => {
                    tracing::debug!("Discovery listen window closed");
                    break;
                }
            };
            match serde_json::from_slice::<AlpacaPort>(&buf[..len]) {
                Ok(AlpacaPort { alpaca_port }) => {
                    let addr = SocketAddr::new(canonical_ip(src.ip()), alpaca_port);
                    if found.contains(&addr) {
                        tracing::debug!(%addr, "Duplicate discovery response");
                    } else {
                        tracing::debug!(%addr, "Discovered Alpaca server");
                        found.push(addr);
                    }
                }
                Err(err) => {
                    tracing::warn!(%src, %err, "Received unknown discovery packet");
                }
            }
        }
    }
}
