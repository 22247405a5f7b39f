//! Who may receive work and who may ask for it.

use libp2p::PeerId;
use parking_lot::RwLock;
pub use sn_config::{AccountMode, TokenAccount};
use sn_config::TokensConfig;
use std::collections::HashMap;

/// Eligibility decisions consulted by the directory while it holds its lock.
///
/// Implementations must not block.
pub trait AssignmentPolicy: Send + Sync + 'static {
    /// Whether `peer_id` may be handed work.
    fn may_assign(&self, peer_id: &PeerId) -> bool;

    /// Whether `peer_id` may request an assignment at all.
    fn may_request(&self, peer_id: &PeerId) -> bool;
}

/// Every peer may request and receive work.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AssignmentPolicy for AllowAll {
    fn may_assign(&self, _peer_id: &PeerId) -> bool {
        true
    }

    fn may_request(&self, _peer_id: &PeerId) -> bool {
        true
    }
}

/// In-memory token accounts.
///
/// Peers without an account use the default account.
#[derive(Debug, Default)]
pub struct TokenLedger {
    /// Accounts by peer.
    accounts: RwLock<HashMap<PeerId, TokenAccount>>,
    /// Used for unknown peers.
    default_account: TokenAccount,
}

impl TokenLedger {
    /// Create a new instance of Self.
    pub fn new(default_account: TokenAccount) -> Self {
        Self { accounts: RwLock::new(HashMap::new()), default_account }
    }

    /// Build the ledger from the `tokens` config section.
    pub fn from_config(config: &TokensConfig) -> Self {
        Self {
            accounts: RwLock::new(config.accounts.clone()),
            default_account: config.default_account,
        }
    }

    /// Insert or replace a peer's account.
    pub fn set_account(&self, peer_id: PeerId, account: TokenAccount) {
        self.accounts.write().insert(peer_id, account);
    }

    /// The account used for `peer_id`.
    pub fn account(&self, peer_id: &PeerId) -> TokenAccount {
        self.accounts.read().get(peer_id).copied().unwrap_or(self.default_account)
    }
}

impl AssignmentPolicy for TokenLedger {
    fn may_assign(&self, peer_id: &PeerId) -> bool {
        let account = self.account(peer_id);
        account.enabled && matches!(account.mode, AccountMode::Processor | AccountMode::All)
    }

    fn may_request(&self, peer_id: &PeerId) -> bool {
        self.account(peer_id).balance > 0
    }
}
