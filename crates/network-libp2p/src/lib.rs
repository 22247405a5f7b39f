// SPDX-License-Identifier: Apache-2.0
//! Peer-to-peer network interface for stylenet built using libp2p.
//!
//! Provides the swarm and its handle, the transport capability used by node sessions, the framed
//! transfer protocol and the rendezvous peer directory.

pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
mod network;
pub mod peers;
pub mod stream;
mod transport;
pub mod types;

pub use network::{StyleBehaviour, StyleNetwork};
pub use transport::{AddressResolver, TransferTransport};
pub use types::{NetworkCommand, NetworkEvent, NetworkHandle};

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod directory_tests;

#[cfg(test)]
#[path = "tests/network_tests.rs"]
mod network_tests;
