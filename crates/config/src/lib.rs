//! Crate for configuring a node.
//!
//! Node-specific configuration, the data directory layout, identity keys and the rendezvous
//! bootstrap descriptor.
mod bootstrap;
pub use bootstrap::*;
mod dirs;
pub use dirs::*;
pub mod key_config;
pub use key_config::*;
mod network;
pub use network::*;
mod node_config;
pub use node_config::*;
mod tokens;
pub use tokens::*;
mod traits;
pub use traits::*;
