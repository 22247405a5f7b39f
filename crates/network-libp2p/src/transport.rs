//! The transport capability used by directories and node sessions.
//!
//! Sessions only need to open and accept named streams and to look up peer addresses. Keeping
//! that behind a trait lets the same session code run over libp2p or the in-memory network.

use crate::{
    error::{NetworkError, NetworkResult},
    types::NetworkHandle,
};
use async_trait::async_trait;
use futures::{stream::BoxStream, AsyncRead, AsyncWrite, StreamExt as _};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use tracing::warn;

/// Lookup of dialable addresses for connected peers.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// The addresses currently known for `peer_id`. Empty if none resolved yet.
    async fn peer_addresses(&self, peer_id: &PeerId) -> Vec<Multiaddr>;
}

/// Open and accept protocol-tagged byte streams.
#[async_trait]
pub trait TransferTransport: AddressResolver + Clone + Send + Sync + 'static {
    /// A bidirectional, ordered byte stream. Dropping it closes the stream.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// This node's identity.
    fn local_peer_id(&self) -> PeerId;

    /// Connect to `peer_id` unless already connected.
    async fn dial(&self, peer_id: PeerId, addrs: Vec<Multiaddr>) -> NetworkResult<()>;

    /// Open a new stream to `peer_id`, connecting through `addrs` first if needed.
    async fn open_stream(
        &self,
        peer_id: PeerId,
        addrs: Vec<Multiaddr>,
        protocol: StreamProtocol,
    ) -> NetworkResult<Self::Stream>;

    /// Inbound streams for `protocol`. Each protocol may only be accepted once.
    fn accept(
        &self,
        protocol: StreamProtocol,
    ) -> NetworkResult<BoxStream<'static, (PeerId, Self::Stream)>>;

    /// Peers with an open connection.
    async fn connected_peers(&self) -> NetworkResult<Vec<PeerId>>;
}

#[async_trait]
impl AddressResolver for NetworkHandle {
    async fn peer_addresses(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
        match NetworkHandle::peer_addresses(self, *peer_id).await {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(target: "network", ?peer_id, ?e, "address lookup failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl TransferTransport for NetworkHandle {
    type Stream = libp2p::Stream;

    fn local_peer_id(&self) -> PeerId {
        NetworkHandle::local_peer_id(self)
    }

    async fn dial(&self, peer_id: PeerId, addrs: Vec<Multiaddr>) -> NetworkResult<()> {
        NetworkHandle::dial(self, peer_id, addrs).await
    }

    async fn open_stream(
        &self,
        peer_id: PeerId,
        addrs: Vec<Multiaddr>,
        protocol: StreamProtocol,
    ) -> NetworkResult<Self::Stream> {
        if peer_id == NetworkHandle::local_peer_id(self) {
            return Err(NetworkError::OpenStream {
                peer_id,
                protocol,
                reason: "can not open a stream to self".to_string(),
            });
        }
        NetworkHandle::dial(self, peer_id, addrs).await?;
        self.open_protocol_stream(peer_id, protocol).await
    }

    fn accept(
        &self,
        protocol: StreamProtocol,
    ) -> NetworkResult<BoxStream<'static, (PeerId, Self::Stream)>> {
        Ok(self.accept_protocol_streams(protocol)?.boxed())
    }

    async fn connected_peers(&self) -> NetworkResult<Vec<PeerId>> {
        NetworkHandle::connected_peers(self).await
    }
}
