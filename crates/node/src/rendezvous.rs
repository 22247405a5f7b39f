//! The rendezvous node: peer discovery and work assignment.
//!
//! Never carries payload bytes. It follows connection notifications to keep the
//! [PeerDirectory] current and answers assignment requests from it.

use crate::error::NodeResult;
use futures::StreamExt as _;
use sn_network_libp2p::{
    peers::PeerDirectory,
    stream::{read_assignment_request, write_assignment_reply, FrameCodec, REQUEST_PEER_PROTOCOL},
    NetworkEvent, TransferTransport,
};
use sn_types::PeerId;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Serves the peer directory over the assignment protocol.
#[derive(Debug)]
pub struct RendezvousService<T> {
    /// The transport.
    transport: T,
    /// Shared membership and round-robin state.
    directory: Arc<PeerDirectory>,
    /// Frame codec for assignment exchanges.
    codec: FrameCodec,
}

impl<T: TransferTransport> RendezvousService<T> {
    /// Create a new instance of Self.
    pub fn new(transport: T, directory: Arc<PeerDirectory>, codec: FrameCodec) -> Self {
        Self { transport, directory, codec }
    }

    /// Register the assignment handler and start following `events`.
    ///
    /// The returned task ends when the event stream closes.
    pub fn spawn(
        self,
        mut events: mpsc::UnboundedReceiver<NetworkEvent>,
    ) -> NodeResult<JoinHandle<()>> {
        let mut requests = self.transport.accept(REQUEST_PEER_PROTOCOL)?;

        // assignment requests
        let directory = self.directory.clone();
        let codec = self.codec;
        let assignments = tokio::spawn(async move {
            while let Some((requester, mut stream)) = requests.next().await {
                let directory = directory.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        serve_assignment(&directory, &codec, requester, &mut stream).await
                    {
                        warn!(target: "rendezvous", ?requester, ?e, "assignment exchange failed");
                    }
                });
            }
            debug!(target: "rendezvous", "assignment handler closed");
        });

        // membership
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.on_network_event(event);
            }
            info!(target: "rendezvous", "network events closed - rendezvous shutting down");
            assignments.abort();
        });

        Ok(task)
    }

    /// Apply a connection notification to the directory.
    ///
    /// The connected mark is set before address resolution is spawned so a later disconnect is
    /// never overtaken by the admission.
    fn on_network_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::PeerConnected(peer_id) => {
                debug!(target: "rendezvous", ?peer_id, "peer connected");
                self.directory.register_connection(peer_id);
                let directory = self.directory.clone();
                let transport = self.transport.clone();
                tokio::spawn(async move {
                    directory.admit(peer_id, &transport).await;
                });
            }
            NetworkEvent::PeerDisconnected(peer_id) => {
                debug!(target: "rendezvous", ?peer_id, "peer disconnected");
                self.directory.on_disconnect(&peer_id);
            }
        }
    }
}

/// Answer one assignment request.
async fn serve_assignment<S>(
    directory: &PeerDirectory,
    codec: &FrameCodec,
    requester: PeerId,
    stream: &mut S,
) -> NodeResult<()>
where
    S: futures::AsyncRead + futures::AsyncWrite + Unpin,
{
    read_assignment_request(codec, stream).await?;
    let outcome = directory.request_assignment(&requester);
    write_assignment_reply(codec, stream, &outcome).await?;
    Ok(())
}
