// SPDX-License-Identifier: Apache-2.0
//! Types shared by every stylenet crate.

mod assignment;
mod files;
mod time;
pub use assignment::*;
pub use files::*;
pub use time::*;

// re-exports for easier maintainability
pub use libp2p::{identity::Keypair, multiaddr::Protocol, Multiaddr, PeerId, StreamProtocol};
