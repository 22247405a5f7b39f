//! Node identity keys.
//!
//! The identity is an ed25519 keypair. The peer id derived from it is how other nodes and the
//! directory address this node.

use eyre::Context as _;
use libp2p::{identity::Keypair, PeerId};
use std::{
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};
use tracing::info;

/// The node's identity keypair.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    /// The keypair used by the transport.
    keypair: Keypair,
    /// Where the key was loaded from or saved to, if persisted.
    path: Option<PathBuf>,
}

impl KeyConfig {
    /// Generate a keypair that is never written to disk.
    pub fn ephemeral() -> Self {
        Self { keypair: Keypair::generate_ed25519(), path: None }
    }

    /// Load the key at `path`, or generate one and save it there.
    ///
    /// The file holds the protobuf keypair encoding and is only readable by the owner.
    pub fn load_or_generate(path: &Path) -> eyre::Result<Self> {
        if path.exists() {
            let bytes = fs::read(path)
                .wrap_err_with(|| format!("failed to read identity key {}", path.display()))?;
            let keypair = Keypair::from_protobuf_encoding(&bytes)
                .wrap_err_with(|| format!("invalid identity key {}", path.display()))?;
            info!(target: "config", ?path, peer_id = %keypair.public().to_peer_id(), "loaded identity key");
            return Ok(Self { keypair, path: Some(path.to_path_buf()) });
        }

        let keypair = Keypair::generate_ed25519();
        let encoded = keypair.to_protobuf_encoding().wrap_err("failed to encode identity key")?;
        write_private(path, &encoded)
            .wrap_err_with(|| format!("failed to write identity key {}", path.display()))?;
        info!(target: "config", ?path, peer_id = %keypair.public().to_peer_id(), "generated identity key");
        Ok(Self { keypair, path: Some(path.to_path_buf()) })
    }

    /// The keypair.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The peer id derived from the public key.
    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// The key file, if this identity is persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Write `bytes` to a new file readable only by the owner.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
