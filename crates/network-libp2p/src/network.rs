//! The libp2p swarm behind [NetworkHandle].
//!
//! The swarm runs TCP with noise and yamux. Identify tells each side the other's listen
//! addresses, and libp2p-stream carries the transfer protocols.

use crate::{
    error::{NetworkError, NetworkResult},
    types::{NetworkCommand, NetworkEvent, NetworkHandle},
};
use futures::StreamExt as _;
use libp2p::{
    core::ConnectedPoint,
    identify,
    identity::Keypair,
    multiaddr::Protocol,
    noise,
    swarm::{
        dial_opts::{DialOpts, PeerCondition},
        DialError, NetworkBehaviour, SwarmEvent,
    },
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use sn_config::NetworkConfig;
use std::collections::{HashMap, HashSet};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, trace, warn};

/// Capacity of the command channel.
const COMMAND_CHANNEL_SIZE: usize = 100;

/// The behaviours driven by the swarm.
#[derive(NetworkBehaviour)]
pub struct StyleBehaviour {
    /// Exchanges listen addresses with every connected peer.
    pub identify: identify::Behaviour,
    /// Raw protocol streams.
    pub stream: libp2p_stream::Behaviour,
}

impl StyleBehaviour {
    /// Create a new instance of Self.
    fn new(keypair: &Keypair, config: &NetworkConfig) -> Self {
        let identify = identify::Behaviour::new(identify::Config::new(
            config.identify_protocol_version.clone(),
            keypair.public(),
        ));
        Self { identify, stream: libp2p_stream::Behaviour::new() }
    }
}

/// The network for stylenet nodes.
pub struct StyleNetwork {
    /// The swarm.
    swarm: Swarm<StyleBehaviour>,
    /// The receiver for processing network handle requests.
    commands: mpsc::Receiver<NetworkCommand>,
    /// Connection notifications for the application layer.
    event_stream: mpsc::UnboundedSender<NetworkEvent>,
    /// Dialable addresses per connected peer.
    ///
    /// Filled from identify and from outbound connections.
    address_book: HashMap<PeerId, HashSet<Multiaddr>>,
    /// Dial replies waiting for a connection.
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<NetworkResult<()>>>>,
}

impl StyleNetwork {
    /// Create a new instance of Self and its handle.
    ///
    /// Connection notifications are sent on `event_stream`. The channel is unbounded so the
    /// swarm never drops or blocks on a notification.
    pub fn new(
        keypair: Keypair,
        config: &NetworkConfig,
        event_stream: mpsc::UnboundedSender<NetworkEvent>,
    ) -> NetworkResult<(Self, NetworkHandle)> {
        let swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
            .map_err(|e| NetworkError::Build(e.to_string()))?
            .with_behaviour(|keypair| StyleBehaviour::new(keypair, config))
            .map_err(|e| NetworkError::Build(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(config.idle_connection_timeout))
            .build();

        let control = swarm.behaviour().stream.new_control();
        let (sender, commands) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let handle = NetworkHandle::new(*swarm.local_peer_id(), sender, control);
        let network = Self {
            swarm,
            commands,
            event_stream,
            address_book: HashMap::new(),
            pending_dials: HashMap::new(),
        };

        Ok((network, handle))
    }

    /// Return this node's [PeerId].
    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    /// Start listening on `addr`.
    ///
    /// Binding happens immediately, so an unusable address is an error here.
    pub fn start_listening(&mut self, addr: Multiaddr) -> NetworkResult<()> {
        self.swarm.listen_on(addr)?;
        Ok(())
    }

    /// Spawn the network on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the swarm until every handle is dropped.
    pub async fn run(mut self) {
        info!(target: "network", peer_id = %self.swarm.local_peer_id(), "network started");
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.process_swarm_event(event),
                command = self.commands.recv() => match command {
                    Some(command) => self.process_command(command),
                    None => {
                        info!(target: "network", "all handles dropped - network shutting down");
                        return;
                    }
                },
            }
        }
    }

    /// Process commands from handles.
    fn process_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Listeners { reply } => {
                let addrs = self.swarm.listeners().cloned().collect();
                let _ = reply.send(addrs);
            }
            NetworkCommand::Dial { peer_id, addrs, reply } => self.dial(peer_id, addrs, reply),
            NetworkCommand::PeerAddresses { peer_id, reply } => {
                let addrs = self
                    .address_book
                    .get(&peer_id)
                    .map(|addrs| addrs.iter().cloned().collect())
                    .unwrap_or_default();
                let _ = reply.send(addrs);
            }
            NetworkCommand::ConnectedPeers { reply } => {
                let peers = self.swarm.connected_peers().copied().collect();
                let _ = reply.send(peers);
            }
        }
    }

    /// Dial a peer unless a connection already exists.
    fn dial(
        &mut self,
        peer_id: PeerId,
        addrs: Vec<Multiaddr>,
        reply: oneshot::Sender<NetworkResult<()>>,
    ) {
        if self.swarm.is_connected(&peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }

        let opts = DialOpts::peer_id(peer_id)
            .addresses(addrs)
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .build();

        match self.swarm.dial(opts) {
            // an in-flight dial resolves every waiting reply
            Ok(()) | Err(DialError::DialPeerConditionFalse(_)) => {
                self.pending_dials.entry(peer_id).or_default().push(reply);
            }
            Err(e) => {
                warn!(target: "network", ?peer_id, ?e, "dial failed");
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    /// Process events from the swarm.
    fn process_swarm_event(&mut self, event: SwarmEvent<StyleBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(StyleBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(target: "network", ?peer_id, addrs = ?info.listen_addrs, "identify received");
                // identify can race a disconnect
                if self.swarm.is_connected(&peer_id) {
                    let book = self.address_book.entry(peer_id).or_default();
                    book.extend(info.listen_addrs.into_iter().map(without_p2p));
                }
            }
            SwarmEvent::Behaviour(event) => {
                trace!(target: "network", ?event, "behaviour event");
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, num_established, .. } => {
                debug!(target: "network", ?peer_id, ?endpoint, "connection established");

                // only outbound connections prove an address is dialable
                if let ConnectedPoint::Dialer { address, .. } = &endpoint {
                    let book = self.address_book.entry(peer_id).or_default();
                    book.insert(without_p2p(address.clone()));
                }

                for reply in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Ok(()));
                }

                if num_established.get() == 1 {
                    self.publish(NetworkEvent::PeerConnected(peer_id));
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, num_established, cause, .. } => {
                debug!(target: "network", ?peer_id, ?cause, "connection closed");
                if num_established == 0 {
                    self.address_book.remove(&peer_id);
                    self.publish(NetworkEvent::PeerDisconnected(peer_id));
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id: Some(peer_id), error, .. } => {
                warn!(target: "network", ?peer_id, ?error, "outgoing connection failed");
                if !self.swarm.is_connected(&peer_id) {
                    let reason = error.to_string();
                    for reply in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                        let _ = reply
                            .send(Err(NetworkError::Connect { peer_id, reason: reason.clone() }));
                    }
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(target: "network", %address, "listening");
            }
            SwarmEvent::ListenerClosed { addresses, reason, .. } => {
                error!(target: "network", ?addresses, ?reason, "listener closed");
            }
            SwarmEvent::ListenerError { error, .. } => {
                error!(target: "network", ?error, "listener error");
            }
            event => {
                trace!(target: "network", ?event, "swarm event");
            }
        }
    }

    /// Publish a connection notification.
    fn publish(&self, event: NetworkEvent) {
        // the receiver is gone only during shutdown
        if let Err(e) = self.event_stream.send(event) {
            debug!(target: "network", ?e, "network event receiver dropped");
        }
    }
}

/// Strip a trailing `/p2p/<peer id>` so addresses can be paired with any identity.
fn without_p2p(mut addr: Multiaddr) -> Multiaddr {
    if matches!(addr.iter().last(), Some(Protocol::P2p(_))) {
        addr.pop();
    }
    addr
}
