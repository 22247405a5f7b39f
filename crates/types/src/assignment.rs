//! Work assignment handed out by the rendezvous directory.

use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};

/// A processor selected for one unit of work.
///
/// The addresses are a snapshot of what the directory knew at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// The processor's identity.
    pub peer_id: PeerId,
    /// Known addresses to reach the processor directly.
    pub addresses: Vec<Multiaddr>,
}

impl Assignment {
    /// Create a new instance of Self.
    pub fn new(peer_id: PeerId, addresses: Vec<Multiaddr>) -> Self {
        Self { peer_id, addresses }
    }
}

/// The directory's answer to an assignment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// The next eligible processor.
    Assigned(Assignment),
    /// No other eligible peer with a known address.
    NoPeerAvailable,
    /// The requester is not allowed to ask for work.
    NoTokens,
}
