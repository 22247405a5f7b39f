//! Commands, events and the handle for the swarm.

use crate::error::{NetworkError, NetworkResult};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Connection notifications published by the network.
///
/// A peer is "connected" while at least one connection to it is open. Every transition is
/// published exactly once and in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The first connection to this peer was established.
    PeerConnected(PeerId),
    /// The last connection to this peer closed.
    PeerDisconnected(PeerId),
}

/// Commands for the swarm.
#[derive(Debug)]
pub enum NetworkCommand {
    /// Listeners
    Listeners { reply: oneshot::Sender<Vec<Multiaddr>> },
    /// Connect to a peer if not already connected.
    ///
    /// The reply is sent once a connection is established or every address failed.
    Dial {
        /// The peer to connect to.
        peer_id: PeerId,
        /// Addresses to try.
        addrs: Vec<Multiaddr>,
        /// Oneshot for reply
        reply: oneshot::Sender<NetworkResult<()>>,
    },
    /// The dialable addresses known for a peer.
    PeerAddresses { peer_id: PeerId, reply: oneshot::Sender<Vec<Multiaddr>> },
    /// Peers with at least one open connection.
    ConnectedPeers { reply: oneshot::Sender<Vec<PeerId>> },
}

/// Network handle.
///
/// Cheap to clone. Commands go through the swarm task and streams through the
/// [libp2p_stream::Control].
#[derive(Clone)]
pub struct NetworkHandle {
    /// This node's identity.
    local_peer_id: PeerId,
    /// Sending channel to the network to process commands.
    sender: mpsc::Sender<NetworkCommand>,
    /// Opens and accepts protocol streams.
    control: libp2p_stream::Control,
}

impl NetworkHandle {
    /// Create a new instance of Self.
    pub fn new(
        local_peer_id: PeerId,
        sender: mpsc::Sender<NetworkCommand>,
        control: libp2p_stream::Control,
    ) -> Self {
        Self { local_peer_id, sender, control }
    }

    /// This node's [PeerId].
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Request listeners from the swarm.
    pub async fn listeners(&self) -> NetworkResult<Vec<Multiaddr>> {
        let (reply, listeners) = oneshot::channel();
        self.sender.send(NetworkCommand::Listeners { reply }).await?;
        Ok(listeners.await?)
    }

    /// Connect to a peer and wait for the connection.
    pub async fn dial(&self, peer_id: PeerId, addrs: Vec<Multiaddr>) -> NetworkResult<()> {
        let (reply, ack) = oneshot::channel();
        self.sender.send(NetworkCommand::Dial { peer_id, addrs, reply }).await?;
        ack.await?
    }

    /// The dialable addresses the swarm knows for a peer.
    pub async fn peer_addresses(&self, peer_id: PeerId) -> NetworkResult<Vec<Multiaddr>> {
        let (reply, addrs) = oneshot::channel();
        self.sender.send(NetworkCommand::PeerAddresses { peer_id, reply }).await?;
        Ok(addrs.await?)
    }

    /// Peers with at least one open connection.
    pub async fn connected_peers(&self) -> NetworkResult<Vec<PeerId>> {
        let (reply, peers) = oneshot::channel();
        self.sender.send(NetworkCommand::ConnectedPeers { reply }).await?;
        Ok(peers.await?)
    }

    /// Open a new stream on an established connection.
    pub(crate) async fn open_protocol_stream(
        &self,
        peer_id: PeerId,
        protocol: StreamProtocol,
    ) -> NetworkResult<libp2p::Stream> {
        self.control.clone().open_stream(peer_id, protocol.clone()).await.map_err(|e| {
            NetworkError::OpenStream { peer_id, protocol, reason: e.to_string() }
        })
    }

    /// Register the handler for inbound streams of `protocol`.
    pub(crate) fn accept_protocol_streams(
        &self,
        protocol: StreamProtocol,
    ) -> NetworkResult<libp2p_stream::IncomingStreams> {
        self.control
            .clone()
            .accept(protocol.clone())
            .map_err(|_| NetworkError::AlreadyRegistered(protocol))
    }
}

impl fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkHandle").field("local_peer_id", &self.local_peer_id).finish()
    }
}
