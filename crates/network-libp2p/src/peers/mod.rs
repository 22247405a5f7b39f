//! Module for tracking peers on the rendezvous node.

mod directory;
mod policy;
pub use directory::{PeerDirectory, PeerRecord};
pub use policy::{AccountMode, AllowAll, AssignmentPolicy, TokenAccount, TokenLedger};
