//! Token accounts consulted by the rendezvous directory.

use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The role a peer's account allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    /// Only sends work.
    Initiator,
    /// Only receives work.
    Processor,
    /// Both.
    All,
}

/// A peer's token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenAccount {
    /// Remaining tokens.
    pub balance: i64,
    /// Disabled accounts never receive work.
    pub enabled: bool,
    /// What the peer is allowed to do.
    pub mode: AccountMode,
}

impl TokenAccount {
    /// Create a new instance of Self.
    pub fn new(balance: i64, enabled: bool, mode: AccountMode) -> Self {
        Self { balance, enabled, mode }
    }
}

impl Default for TokenAccount {
    fn default() -> Self {
        Self { balance: 100, enabled: true, mode: AccountMode::All }
    }
}

/// Token accounting for the rendezvous node.
///
/// Disabled by default, in which case every peer may request and receive work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    /// Enforce the accounts below.
    pub enabled: bool,
    /// Used for peers without an entry in `accounts`.
    pub default_account: TokenAccount,
    /// Accounts by peer id.
    pub accounts: HashMap<PeerId, TokenAccount>,
}
