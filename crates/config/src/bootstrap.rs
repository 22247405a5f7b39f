//! The rendezvous bootstrap descriptor.
//!
//! A single line holding the rendezvous node's multiaddr, ending in `/p2p/<peer id>`. The
//! rendezvous node writes it on startup and every other node reads it before dialing.

use eyre::{eyre, Context as _};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    path::Path,
    str::FromStr,
};
use tracing::info;

/// How to reach the rendezvous node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapDescriptor {
    /// The rendezvous node's identity.
    pub peer_id: PeerId,
    /// The transport address, without the trailing `/p2p` component.
    pub address: Multiaddr,
}

impl BootstrapDescriptor {
    /// Create a new instance of Self.
    pub fn new(peer_id: PeerId, address: Multiaddr) -> Self {
        Self { peer_id, address }
    }

    /// Read the descriptor at `path`.
    ///
    /// A missing, empty or malformed file is an error.
    pub fn read(path: &Path) -> eyre::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read bootstrap descriptor {}", path.display()))?;
        let line = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| eyre!("bootstrap descriptor {} is empty", path.display()))?;
        line.parse()
            .wrap_err_with(|| format!("malformed bootstrap descriptor {}", path.display()))
    }

    /// Write the descriptor to `path`, replacing any previous contents.
    pub fn write(&self, path: &Path) -> eyre::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{self}\n"))
            .wrap_err_with(|| format!("failed to write bootstrap descriptor {}", path.display()))?;
        info!(target: "config", ?path, descriptor = %self, "wrote bootstrap descriptor");
        Ok(())
    }

    /// The full multiaddr, including `/p2p/<peer id>`.
    pub fn multiaddr(&self) -> Multiaddr {
        self.address.clone().with(Protocol::P2p(self.peer_id))
    }
}

impl fmt::Display for BootstrapDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.multiaddr())
    }
}

impl FromStr for BootstrapDescriptor {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut address: Multiaddr = s.trim().parse().wrap_err("invalid multiaddr")?;
        match address.pop() {
            Some(Protocol::P2p(peer_id)) if !address.is_empty() => Ok(Self { peer_id, address }),
            Some(Protocol::P2p(_)) => Err(eyre!("multiaddr has no transport address")),
            _ => Err(eyre!("multiaddr must end with /p2p/<peer id>")),
        }
    }
}

/// The address other nodes should dial for a listener.
///
/// An unspecified ip (`0.0.0.0` or `::`) can't be dialed, so it is replaced by loopback.
pub fn advertised_address(listen_addr: &Multiaddr) -> Multiaddr {
    listen_addr
        .iter()
        .map(|protocol| match protocol {
            Protocol::Ip4(ip) if ip.is_unspecified() => Protocol::Ip4(Ipv4Addr::LOCALHOST),
            Protocol::Ip6(ip) if ip.is_unspecified() => Protocol::Ip6(Ipv6Addr::LOCALHOST),
            other => other,
        })
        .collect()
}
