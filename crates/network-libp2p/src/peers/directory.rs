//! The rendezvous node's view of reachable peers.
//!
//! Membership follows connection notifications. A peer is only admitted once its addresses
//! resolve, and work is handed out round-robin over the admission order.

use super::policy::{AllowAll, AssignmentPolicy};
use crate::transport::AddressResolver;
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use sn_config::DirectoryConfig;
use sn_types::{now, Assignment, AssignmentOutcome, TimestampMillis};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// A connected peer with at least one known address.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The peer's identity.
    pub peer_id: PeerId,
    /// Dialable addresses.
    pub addresses: HashSet<Multiaddr>,
    /// When the peer was admitted.
    pub connected_at: TimestampMillis,
}

/// Roster, records, connected set and cursor change together under one lock.
#[derive(Debug, Default)]
struct DirectoryState {
    /// Admitted peers in admission order.
    roster: Vec<PeerId>,
    /// Records for every peer in the roster.
    records: HashMap<PeerId, PeerRecord>,
    /// Peers the transport reports as connected, admitted or not.
    connected: HashSet<PeerId>,
    /// Advanced by every assignment attempt. Taken modulo the roster length at use.
    cursor: u64,
}

/// Tracks reachable peers and hands out round-robin assignments.
pub struct PeerDirectory {
    /// Guarded state. Never held across an await.
    state: Mutex<DirectoryState>,
    /// Who may request and receive work.
    policy: Arc<dyn AssignmentPolicy>,
    /// Address resolution bounds.
    config: DirectoryConfig,
}

impl PeerDirectory {
    /// Create a directory that allows every peer.
    pub fn new(config: DirectoryConfig) -> Self {
        Self::with_policy(config, Arc::new(AllowAll))
    }

    /// Create a directory with an assignment policy.
    pub fn with_policy(config: DirectoryConfig, policy: Arc<dyn AssignmentPolicy>) -> Self {
        Self { state: Mutex::new(DirectoryState::default()), policy, config }
    }

    /// Record that the transport reports `peer_id` as connected.
    ///
    /// Must run before [Self::admit] so a disconnect that arrives during address resolution
    /// cancels the admission.
    pub fn register_connection(&self, peer_id: PeerId) {
        self.state.lock().connected.insert(peer_id);
    }

    /// Poll `resolver` until the peer has an address, then add it to the roster.
    ///
    /// Returns `true` if the peer is in the roster afterwards. A peer that disconnects or never
    /// resolves an address within the configured bound is not added.
    pub async fn admit<R>(&self, peer_id: PeerId, resolver: &R) -> bool
    where
        R: AddressResolver + ?Sized,
    {
        let attempts = self.config.address_poll_attempts.max(1);
        for attempt in 1..=attempts {
            if !self.is_connected(&peer_id) {
                debug!(target: "peer-directory", ?peer_id, "disconnected during address resolution");
                return false;
            }

            let addresses = resolver.peer_addresses(&peer_id).await;
            if !addresses.is_empty() {
                return self.insert_record(peer_id, addresses);
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.address_poll_interval).await;
            }
        }

        warn!(target: "peer-directory", ?peer_id, attempts, "no address resolved - peer not added");
        false
    }

    /// Handle a connect notification: [Self::register_connection] then [Self::admit].
    pub async fn on_connect<R>(&self, peer_id: PeerId, resolver: &R) -> bool
    where
        R: AddressResolver + ?Sized,
    {
        self.register_connection(peer_id);
        self.admit(peer_id, resolver).await
    }

    /// Handle a disconnect notification.
    ///
    /// Idempotent. Returns `true` if the peer was in the roster.
    pub fn on_disconnect(&self, peer_id: &PeerId) -> bool {
        let mut state = self.state.lock();
        state.connected.remove(peer_id);
        let removed = state.records.remove(peer_id).is_some();
        if removed {
            state.roster.retain(|id| id != peer_id);
            info!(target: "peer-directory", ?peer_id, roster = state.roster.len(), "peer removed");
        }
        removed
    }

    /// Select the next eligible peer for `requester`.
    ///
    /// Makes at most one pass over the roster starting at the cursor and advances the cursor on
    /// every attempt. Nothing else changes.
    pub fn request_assignment(&self, requester: &PeerId) -> AssignmentOutcome {
        let mut state = self.state.lock();

        if !self.policy.may_request(requester) {
            info!(target: "peer-directory", ?requester, "requester has no tokens");
            return AssignmentOutcome::NoTokens;
        }

        let len = state.roster.len();
        if len <= 1 {
            debug!(target: "peer-directory", ?requester, len, "not enough peers to assign");
            return AssignmentOutcome::NoPeerAvailable;
        }

        for _ in 0..len {
            let candidate = state.roster[(state.cursor % len as u64) as usize];
            state.cursor += 1;

            if candidate == *requester || !self.policy.may_assign(&candidate) {
                continue;
            }

            return match state.records.get(&candidate) {
                Some(record) if !record.addresses.is_empty() => {
                    info!(target: "peer-directory", ?requester, assigned = ?candidate, "assigned peer");
                    let addresses = record.addresses.iter().cloned().collect();
                    AssignmentOutcome::Assigned(Assignment::new(candidate, addresses))
                }
                _ => {
                    warn!(target: "peer-directory", ?candidate, "selected peer has no record");
                    AssignmentOutcome::NoPeerAvailable
                }
            };
        }

        debug!(target: "peer-directory", ?requester, "no eligible peer");
        AssignmentOutcome::NoPeerAvailable
    }

    /// Admitted peers in round-robin order.
    pub fn roster(&self) -> Vec<PeerId> {
        self.state.lock().roster.clone()
    }

    /// The record for an admitted peer.
    pub fn record(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.state.lock().records.get(peer_id).cloned()
    }

    /// The number of admitted peers.
    pub fn len(&self) -> usize {
        self.state.lock().roster.len()
    }

    /// Whether no peer is admitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `peer_id` is admitted.
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.state.lock().records.contains_key(peer_id)
    }

    /// The current cursor value.
    pub fn cursor(&self) -> u64 {
        self.state.lock().cursor
    }

    /// Whether the transport reports the peer as connected.
    fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.state.lock().connected.contains(peer_id)
    }

    /// Add or refresh a record. Only connected peers are admitted.
    fn insert_record(&self, peer_id: PeerId, addresses: Vec<Multiaddr>) -> bool {
        let mut state = self.state.lock();
        if !state.connected.contains(&peer_id) {
            debug!(target: "peer-directory", ?peer_id, "disconnected before admission");
            return false;
        }

        let addresses: HashSet<_> = addresses.into_iter().collect();
        if let Some(record) = state.records.get_mut(&peer_id) {
            record.addresses = addresses;
            debug!(target: "peer-directory", ?peer_id, "peer addresses refreshed");
            return true;
        }

        state.records.insert(peer_id, PeerRecord { peer_id, addresses, connected_at: now() });
        state.roster.push(peer_id);
        info!(target: "peer-directory", ?peer_id, roster = state.roster.len(), "peer added");
        true
    }

    /// Start round-robin at `cursor`.
    #[cfg(test)]
    pub(crate) fn set_cursor(&self, cursor: u64) {
        self.state.lock().cursor = cursor;
    }
}

impl std::fmt::Debug for PeerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PeerDirectory")
            .field("roster", &state.roster)
            .field("cursor", &state.cursor)
            .field("config", &self.config)
            .finish()
    }
}
