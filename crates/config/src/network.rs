//! Configuration for network variables.

use libp2p::{multiaddr::Protocol, Multiaddr};
use serde::{Deserialize, Serialize};
use std::{net::Ipv4Addr, time::Duration};

/// The default port for nodes that join through the rendezvous node (os-assigned).
const DEFAULT_LISTEN_PORT: u16 = 0;

/// The default port the rendezvous node listens on.
const DEFAULT_RENDEZVOUS_PORT: u16 = 9000;

/// The container for all network configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// The address this node listens on.
    ///
    /// Ignored by the rendezvous node, see [RendezvousConfig].
    pub listen_addr: Multiaddr,
    /// How long an idle connection is kept alive.
    ///
    /// Directory membership mirrors the connection, so this must outlive any gap between
    /// assignments.
    #[serde(with = "humantime_serde")]
    pub idle_connection_timeout: Duration,
    /// The protocol version advertised through identify.
    pub identify_protocol_version: String,
    /// How long a joining node waits for its connection to the rendezvous node.
    #[serde(with = "humantime_serde")]
    pub bootstrap_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: tcp_on_all_interfaces(DEFAULT_LISTEN_PORT),
            idle_connection_timeout: Duration::from_secs(24 * 60 * 60),
            identify_protocol_version: "/stylenet/1.0.0".to_string(),
            bootstrap_timeout: Duration::from_secs(10),
        }
    }
}

/// Address resolution bounds for the peer directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// How many times the address book is polled after a peer connects.
    pub address_poll_attempts: u32,
    /// The delay between polls.
    #[serde(with = "humantime_serde")]
    pub address_poll_interval: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { address_poll_attempts: 5, address_poll_interval: Duration::from_secs(1) }
    }
}

/// Limits for framed transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// The largest body a peer may announce, in bytes.
    pub max_body_size: u64,
    /// The longest header line accepted, in bytes (excluding the line feed).
    pub max_header_len: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { max_body_size: 256 * 1024 * 1024, max_header_len: 64 }
    }
}

/// Settings for the rendezvous node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// The address the rendezvous node listens on.
    pub listen_addr: Multiaddr,
    /// The address written to the bootstrap descriptor.
    ///
    /// Defaults to the first listen address with an unspecified ip replaced by loopback.
    pub advertise_addr: Option<Multiaddr>,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self { listen_addr: tcp_on_all_interfaces(DEFAULT_RENDEZVOUS_PORT), advertise_addr: None }
    }
}

/// `/ip4/0.0.0.0/tcp/{port}`
fn tcp_on_all_interfaces(port: u16) -> Multiaddr {
    Multiaddr::empty().with(Protocol::Ip4(Ipv4Addr::UNSPECIFIED)).with(Protocol::Tcp(port))
}
