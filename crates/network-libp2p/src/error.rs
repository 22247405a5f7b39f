//! Error types for the stylenet network.

use crate::stream::CodecError;
use libp2p::{swarm::DialError, PeerId, StreamProtocol, TransportError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The result for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Networking error type.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Swarm error dialing a peer.
    #[error(transparent)]
    Dial(#[from] DialError),
    /// The dial was accepted but no connection was established.
    #[error("failed to connect to {peer_id}: {reason}")]
    Connect {
        /// The peer that could not be reached.
        peer_id: PeerId,
        /// Why the connection failed.
        reason: String,
    },
    /// The listening address could not be bound.
    #[error(transparent)]
    Listen(#[from] TransportError<std::io::Error>),
    /// The swarm could not be built.
    #[error("failed to build swarm: {0}")]
    Build(String),
    /// Opening a stream to a connected peer failed.
    #[error("failed to open {protocol} stream to {peer_id}: {reason}")]
    OpenStream {
        /// The remote peer.
        peer_id: PeerId,
        /// The requested protocol.
        protocol: StreamProtocol,
        /// The transport's reason.
        reason: String,
    },
    /// Inbound streams for this protocol already have a handler.
    #[error("protocol already registered: {0}")]
    AlreadyRegistered(StreamProtocol),
    /// Framing error on a stream.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// mpsc receiver dropped.
    #[error("mpsc error: {0}")]
    MpscSender(String),
    /// oneshot sender dropped.
    #[error("oneshot error: {0}")]
    AckChannelClosed(String),
}

impl From<oneshot::error::RecvError> for NetworkError {
    fn from(e: oneshot::error::RecvError) -> Self {
        Self::AckChannelClosed(e.to_string())
    }
}

impl<T> From<mpsc::error::SendError<T>> for NetworkError {
    fn from(e: mpsc::error::SendError<T>) -> Self {
        Self::MpscSender(e.to_string())
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Codec(CodecError::Io(e))
    }
}
