//! In-process network for tests.
//!
//! Every joined peer gets a `/memory/<n>` address. Streams are tokio duplex pipes. Connections
//! are symmetric and publish the same [NetworkEvent]s as the swarm.

use crate::{
    error::{NetworkError, NetworkResult},
    transport::{AddressResolver, TransferTransport},
    types::NetworkEvent,
};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt as _};
use libp2p::{identity::Keypair, multiaddr::Protocol, Multiaddr, PeerId, StreamProtocol};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::{io::DuplexStream, sync::mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt as _};

/// Buffer size of each in-memory stream.
const DUPLEX_BUFFER_SIZE: usize = 64 * 1024;

/// A stream between two memory transports.
pub type MemoryStream = Compat<DuplexStream>;

/// One joined peer.
#[derive(Debug)]
struct MemoryPeer {
    /// The peer's only address.
    address: Multiaddr,
    /// Whether other peers can resolve the address.
    advertised: bool,
    /// Connection notifications.
    events: mpsc::UnboundedSender<NetworkEvent>,
    /// Inbound stream handlers by protocol.
    acceptors: HashMap<StreamProtocol, mpsc::UnboundedSender<(PeerId, MemoryStream)>>,
    /// Currently connected peers.
    connections: HashSet<PeerId>,
}

/// Shared hub state.
#[derive(Debug, Default)]
struct HubState {
    /// The next `/memory/<n>` port.
    next_port: u64,
    /// Every joined peer.
    peers: HashMap<PeerId, MemoryPeer>,
}

/// A network of in-process peers.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<HubState>>,
}

impl MemoryNetwork {
    /// Create a new instance of Self.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a new peer with a random identity.
    pub fn join(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<NetworkEvent>) {
        self.join_with(true)
    }

    /// Join a peer whose address never resolves for other peers.
    pub fn join_unadvertised(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<NetworkEvent>) {
        self.join_with(false)
    }

    fn join_with(
        &self,
        advertised: bool,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<NetworkEvent>) {
        let peer_id = Keypair::generate_ed25519().public().to_peer_id();
        let (events, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        state.next_port += 1;
        let address = Multiaddr::empty().with(Protocol::Memory(state.next_port));
        state.peers.insert(
            peer_id,
            MemoryPeer {
                address,
                advertised,
                events,
                acceptors: HashMap::new(),
                connections: HashSet::new(),
            },
        );
        (MemoryTransport { peer_id, hub: self.clone() }, rx)
    }

    /// The address of a joined peer.
    pub fn address_of(&self, peer_id: &PeerId) -> Option<Multiaddr> {
        self.inner.lock().peers.get(peer_id).map(|peer| peer.address.clone())
    }

    /// Close the connection between two peers.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.inner.lock();
        let removed = state.peers.get_mut(a).is_some_and(|peer| peer.connections.remove(b));
        if let Some(peer) = state.peers.get_mut(b) {
            peer.connections.remove(a);
        }
        if removed {
            notify(&state, a, NetworkEvent::PeerDisconnected(*b));
            notify(&state, b, NetworkEvent::PeerDisconnected(*a));
        }
    }

    /// Remove a peer, closing all of its connections.
    pub fn leave(&self, peer_id: &PeerId) {
        let mut state = self.inner.lock();
        if let Some(peer) = state.peers.remove(peer_id) {
            for remote in peer.connections {
                if let Some(other) = state.peers.get_mut(&remote) {
                    other.connections.remove(peer_id);
                }
                notify(&state, &remote, NetworkEvent::PeerDisconnected(*peer_id));
            }
        }
    }

    /// Connect two peers and publish the notifications.
    fn connect(&self, a: PeerId, b: PeerId) -> NetworkResult<()> {
        let mut state = self.inner.lock();
        if !state.peers.contains_key(&b) {
            return Err(NetworkError::Connect { peer_id: b, reason: "unknown peer".to_string() });
        }
        let added = state.peers.get_mut(&a).is_some_and(|peer| peer.connections.insert(b));
        if let Some(peer) = state.peers.get_mut(&b) {
            peer.connections.insert(a);
        }
        if added {
            notify(&state, &a, NetworkEvent::PeerConnected(b));
            notify(&state, &b, NetworkEvent::PeerConnected(a));
        }
        Ok(())
    }
}

/// Send a notification to a peer's event stream.
fn notify(state: &HubState, peer_id: &PeerId, event: NetworkEvent) {
    if let Some(peer) = state.peers.get(peer_id) {
        let _ = peer.events.send(event);
    }
}

/// One peer's view of a [MemoryNetwork].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// This peer's identity.
    peer_id: PeerId,
    /// The shared network.
    hub: MemoryNetwork,
}

#[async_trait]
impl AddressResolver for MemoryTransport {
    async fn peer_addresses(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
        let state = self.hub.inner.lock();
        let connected =
            state.peers.get(&self.peer_id).is_some_and(|me| me.connections.contains(peer_id));
        match state.peers.get(peer_id) {
            Some(peer) if connected && peer.advertised => vec![peer.address.clone()],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl TransferTransport for MemoryTransport {
    type Stream = MemoryStream;

    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn dial(&self, peer_id: PeerId, _addrs: Vec<Multiaddr>) -> NetworkResult<()> {
        self.hub.connect(self.peer_id, peer_id)
    }

    async fn open_stream(
        &self,
        peer_id: PeerId,
        addrs: Vec<Multiaddr>,
        protocol: StreamProtocol,
    ) -> NetworkResult<Self::Stream> {
        self.dial(peer_id, addrs).await?;

        let (local, remote) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);
        let state = self.hub.inner.lock();
        let acceptor = state
            .peers
            .get(&peer_id)
            .and_then(|peer| peer.acceptors.get(&protocol))
            .ok_or_else(|| NetworkError::OpenStream {
                peer_id,
                protocol: protocol.clone(),
                reason: "protocol not supported".to_string(),
            })?;
        acceptor.send((self.peer_id, remote.compat())).map_err(|_| NetworkError::OpenStream {
            peer_id,
            protocol: protocol.clone(),
            reason: "handler dropped".to_string(),
        })?;

        Ok(local.compat())
    }

    fn accept(
        &self,
        protocol: StreamProtocol,
    ) -> NetworkResult<BoxStream<'static, (PeerId, Self::Stream)>> {
        let mut state = self.hub.inner.lock();
        let peer = state.peers.get_mut(&self.peer_id).ok_or_else(|| NetworkError::Connect {
            peer_id: self.peer_id,
            reason: "left the network".to_string(),
        })?;

        // a dropped handler may be replaced
        if peer.acceptors.get(&protocol).is_some_and(|tx| !tx.is_closed()) {
            return Err(NetworkError::AlreadyRegistered(protocol));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        peer.acceptors.insert(protocol, tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn connected_peers(&self) -> NetworkResult<Vec<PeerId>> {
        let state = self.hub.inner.lock();
        Ok(state
            .peers
            .get(&self.peer_id)
            .map(|peer| peer.connections.iter().copied().collect())
            .unwrap_or_default())
    }
}
