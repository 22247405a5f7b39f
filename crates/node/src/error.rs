//! Error types for node sessions.

use crate::engine::EngineError;
use sn_network_libp2p::{error::NetworkError, stream::CodecError};
use thiserror::Error;

/// The result for node session operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Error types for initiator, processor and rendezvous sessions.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The style engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Transport failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Framing failure on a stream.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Local file error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A content job started before any style artifact arrived.
    #[error("no style artifact received")]
    NoStyle,

    /// The rendezvous node could not be reached in time.
    #[error("rendezvous node {0} not connected")]
    BootstrapUnreachable(sn_types::PeerId),
}
