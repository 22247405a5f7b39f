// SPDX-License-Identifier: Apache-2.0
//! Launch the stylenet node roles.
//!
//! Each role runs the libp2p network plus its session tasks in one process. The rendezvous
//! node serves the peer directory, processors stylize images, and an initiator distributes one
//! batch and then keeps collecting results.

use eyre::WrapErr as _;
use futures::future::select_all;
use sn_config::{advertised_address, BootstrapDescriptor, KeyConfig, NodeConfig, StyleNetDirs};
use sn_network_libp2p::{
    peers::{PeerDirectory, TokenLedger},
    stream::FrameCodec, NetworkEvent, NetworkHandle, StyleNetwork,
};
use sn_types::{Multiaddr, Protocol};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

pub mod engine;
mod error;
pub mod initiator;
pub mod processor;
pub mod rendezvous;

pub use engine::{CommandStyleEngine, EngineError, StyleEngine};
pub use error::{NodeError, NodeResult};
pub use initiator::{Initiator, ResultEvent, RunSummary};
pub use processor::{Processor, ProcessorDirs, ProcessorStats, StyleArtifact};
pub use rendezvous::RendezvousService;

/// Polls while waiting for the swarm to report its listen addresses.
const LISTENER_POLL_ATTEMPTS: usize = 50;
const LISTENER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A launched node.
///
/// Owns the network task and the role's long-running tasks.
#[derive(Debug)]
pub struct RunningNode {
    /// Handle to the running network.
    handle: NetworkHandle,
    /// Long-running tasks. Never empty.
    tasks: Vec<JoinHandle<()>>,
}

impl RunningNode {
    /// The network handle.
    pub fn handle(&self) -> &NetworkHandle {
        &self.handle
    }

    /// Wait until any task of the node exits.
    pub async fn wait(self) -> eyre::Result<()> {
        let (res, _, remaining) = select_all(self.tasks).await;
        for task in remaining {
            task.abort();
        }
        res.wrap_err("node task failed")
    }
}

/// Launch the rendezvous node.
///
/// The identity key is always persisted so the written bootstrap descriptor stays valid across
/// restarts.
pub async fn launch_rendezvous<P: StyleNetDirs>(
    datadir: &P,
    config: &NodeConfig,
) -> eyre::Result<RunningNode> {
    datadir.ensure_dirs()?;
    let key = KeyConfig::load_or_generate(&datadir.key_path())?;

    let (event_stream, events) = mpsc::unbounded_channel();
    let (mut network, handle) = StyleNetwork::new(key.keypair().clone(), &config.network, event_stream)?;
    let listen_addr = config.rendezvous.listen_addr.clone();
    network
        .start_listening(listen_addr.clone())
        .wrap_err_with(|| format!("failed to listen on {listen_addr}"))?;
    let network_task = network.spawn();

    let address = match &config.rendezvous.advertise_addr {
        Some(addr) => addr.clone(),
        None => dialable_listen_address(&handle, &listen_addr).await?,
    };
    let descriptor = BootstrapDescriptor::new(key.peer_id(), address);
    descriptor.write(&datadir.bootstrap_path())?;
    info!(target: "rendezvous", %descriptor, path = ?datadir.bootstrap_path(), "bootstrap descriptor written");

    let directory = Arc::new(rendezvous_directory(config));
    let service = RendezvousService::new(handle.clone(), directory, codec(config));
    let rendezvous_task = service.spawn(events)?;

    Ok(RunningNode { handle, tasks: vec![network_task, rendezvous_task] })
}

/// The rendezvous node's peer directory.
///
/// Enforces the configured token accounts when `tokens.enabled` is set.
pub fn rendezvous_directory(config: &NodeConfig) -> PeerDirectory {
    if config.tokens.enabled {
        info!(
            target: "rendezvous",
            accounts = config.tokens.accounts.len(),
            "token accounts enforced"
        );
        let ledger = TokenLedger::from_config(&config.tokens);
        PeerDirectory::with_policy(config.directory.clone(), Arc::new(ledger))
    } else {
        PeerDirectory::new(config.directory.clone())
    }
}

/// Launch a processor and join it to the rendezvous node.
pub async fn launch_processor<P: StyleNetDirs>(
    datadir: &P,
    config: &NodeConfig,
    persist_identity: bool,
) -> eyre::Result<RunningNode> {
    let joined = join_network(datadir, config, persist_identity).await?;

    let dirs = ProcessorDirs {
        staging: datadir.staging_dir(),
        styles: datadir.styles_dir(),
        output: datadir.results_dir(),
    };
    let engine = Arc::new(CommandStyleEngine::new(&config.engine));
    let processor =
        Processor::new(joined.handle.clone(), engine, codec(config), dirs, config.processor.clone());
    let processor_task = processor.spawn()?;

    Ok(RunningNode {
        handle: joined.handle,
        tasks: vec![joined.network_task, joined.event_task, processor_task],
    })
}

/// Launch an initiator, distribute the content directory and keep collecting results.
///
/// Returns once every content file was handled. Results keep arriving on the returned node.
pub async fn launch_initiator<P: StyleNetDirs>(
    datadir: &P,
    config: &NodeConfig,
    persist_identity: bool,
    style_image: &Path,
    content_dir: &Path,
) -> eyre::Result<(RunningNode, RunSummary)> {
    let joined = join_network(datadir, config, persist_identity).await?;

    let engine = Arc::new(CommandStyleEngine::new(&config.engine));
    let initiator = Initiator::new(
        joined.handle.clone(),
        engine,
        joined.rendezvous,
        codec(config),
        datadir.style_artifact_path(),
        datadir.results_dir(),
    );

    // results may arrive as soon as the first image is sent
    let (listener_task, mut results) = initiator.spawn_result_listener()?;
    let operator_log = tokio::spawn(async move {
        let (mut saved, mut failed) = (0usize, 0usize);
        while let Some(event) = results.recv().await {
            match event {
                ResultEvent::Saved { .. } => saved += 1,
                ResultEvent::Failed { .. } => failed += 1,
            }
            info!(target: "initiator", saved, failed, "results so far");
        }
    });

    let summary = initiator
        .run(style_image, content_dir)
        .await
        .wrap_err("style distribution failed")?;

    let node = RunningNode {
        handle: joined.handle,
        tasks: vec![joined.network_task, joined.event_task, listener_task, operator_log],
    };
    Ok((node, summary))
}

/// A node connected to the rendezvous node.
struct JoinedNetwork {
    handle: NetworkHandle,
    network_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
    rendezvous: BootstrapDescriptor,
}

/// Start the network for a non-rendezvous role and connect to the rendezvous node.
///
/// The descriptor must be readable and the rendezvous node reachable within the bootstrap
/// timeout.
async fn join_network<P: StyleNetDirs>(
    datadir: &P,
    config: &NodeConfig,
    persist_identity: bool,
) -> eyre::Result<JoinedNetwork> {
    datadir.ensure_dirs()?;
    let rendezvous = BootstrapDescriptor::read(&datadir.bootstrap_path())?;
    let key = if persist_identity {
        KeyConfig::load_or_generate(&datadir.key_path())?
    } else {
        KeyConfig::ephemeral()
    };
    info!(target: "node", peer_id = %key.peer_id(), persisted = persist_identity, "node identity");

    let (event_stream, mut events) = mpsc::unbounded_channel();
    let (mut network, handle) = StyleNetwork::new(key.keypair().clone(), &config.network, event_stream)?;
    let listen_addr = config.network.listen_addr.clone();
    network
        .start_listening(listen_addr.clone())
        .wrap_err_with(|| format!("failed to listen on {listen_addr}"))?;
    let network_task = network.spawn();

    let dial = handle.dial(rendezvous.peer_id, vec![rendezvous.address.clone()]);
    match tokio::time::timeout(config.network.bootstrap_timeout, dial).await {
        Ok(Ok(())) => info!(target: "node", %rendezvous, "connected to rendezvous node"),
        Ok(Err(e)) => {
            network_task.abort();
            return Err(NodeError::Network(e))
                .wrap_err_with(|| format!("failed to reach rendezvous node {rendezvous}"));
        }
        Err(_) => {
            network_task.abort();
            return Err(NodeError::BootstrapUnreachable(rendezvous.peer_id).into());
        }
    }

    let rendezvous_peer = rendezvous.peer_id;
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                NetworkEvent::PeerConnected(peer_id) => {
                    debug!(target: "node", ?peer_id, "peer connected")
                }
                NetworkEvent::PeerDisconnected(peer_id) if peer_id == rendezvous_peer => {
                    warn!(target: "node", ?peer_id, "disconnected from rendezvous node")
                }
                NetworkEvent::PeerDisconnected(peer_id) => {
                    debug!(target: "node", ?peer_id, "peer disconnected")
                }
            }
        }
    });

    Ok(JoinedNetwork { handle, network_task, event_task, rendezvous })
}

/// The frame codec limits from config.
fn codec(config: &NodeConfig) -> FrameCodec {
    FrameCodec::new(config.transfer.max_header_len, config.transfer.max_body_size)
}

/// The address other nodes should dial to reach `listen_addr`.
///
/// A fixed port is advertised directly. An ephemeral port is only known once the swarm reports
/// its listeners, so those are polled.
async fn dialable_listen_address(
    handle: &NetworkHandle,
    listen_addr: &Multiaddr,
) -> eyre::Result<Multiaddr> {
    let fixed_port = listen_addr.iter().any(|p| matches!(p, Protocol::Tcp(port) if port != 0));
    if fixed_port {
        return Ok(advertised_address(listen_addr));
    }

    for _ in 0..LISTENER_POLL_ATTEMPTS {
        let listeners = handle.listeners().await?;
        let loopback = listeners.iter().find(|addr| {
            addr.iter().any(|p| match p {
                Protocol::Ip4(ip) => ip.is_loopback(),
                Protocol::Ip6(ip) => ip.is_loopback(),
                _ => false,
            })
        });
        if let Some(addr) = loopback.or(listeners.first()) {
            return Ok(addr.clone());
        }
        tokio::time::sleep(LISTENER_POLL_INTERVAL).await;
    }

    eyre::bail!("no listen address reported for {listen_addr}")
}
