//! libp2p swarm driver and the [`OverlayHandle`] that fronts it.
//!
//! [`spawn_overlay`] builds the swarm, waits until every configured
//! listener is up, seeds discovery with the bootstrap nodes and then
//! moves the swarm into a driver task. From then on the swarm is
//! touched only by that task; callers talk to it through
//! [`OverlayCommand`]s sent by the cloneable [`OverlayHandle`].
//!
//! ```text
//! OverlayHandle ──cmd──▶ SwarmDriver ──OverlayEvent──▶ session event loop
//!                         │
//!                         └── Swarm<TopicmeshBehaviour>
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::gossipsub;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{ConnectionId, DialError, NetworkBehaviour, SwarmEvent};
use libp2p::{identify, kad, Multiaddr, PeerId, Swarm};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use topicmesh_types::TopicmeshError;

use crate::address_book::AddressBook;
use crate::command::OverlayCommand;
use crate::config::OverlayConfig;
use crate::discovery::{
    build_discovery_behaviour, extract_peer_id, DiscoveryBehaviour, DiscoveryBehaviourEvent,
};
use crate::events::OverlayEvent;
use crate::gossip;
use crate::identity::NodeIdentity;
use crate::overlay::Overlay;
use crate::psk;
use crate::transport;

/// Convenience alias to avoid shadowing `std::result::Result`
/// which the `#[derive(NetworkBehaviour)]` macro requires.
type BResult<T> = std::result::Result<T, TopicmeshError>;

/// Bounded command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Interval between Kademlia re-bootstraps.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

/// Combined libp2p behaviour for topicmesh.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates
/// `TopicmeshBehaviourEvent` with one variant per field.
#[derive(NetworkBehaviour)]
pub struct TopicmeshBehaviour {
    /// Kademlia + Identify.
    pub discovery: DiscoveryBehaviour,
    /// Topic pub/sub.
    pub gossip: gossipsub::Behaviour,
}

fn build_behaviour(
    key: &libp2p::identity::Keypair,
    config: &OverlayConfig,
) -> BResult<TopicmeshBehaviour> {
    let discovery = build_discovery_behaviour(key, config)?;
    let gossip = gossip::build_gossip_behaviour(key, config.max_transmit_size)?;
    Ok(TopicmeshBehaviour { discovery, gossip })
}

fn bootstrap_error(reason: String) -> TopicmeshError {
    TopicmeshError::Bootstrap { reason }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Builds and starts the overlay node.
///
/// Suspends until every listen address has been announced. Returns
/// the handle used to drive the node and the receiver for its
/// [`OverlayEvent`]s.
///
/// # Errors
///
/// - `TopicmeshError::Config` if the configuration is invalid.
/// - `TopicmeshError::Bootstrap` if the transport cannot be built, a
///   listener cannot be bound (e.g. address in use) or the listeners do
///   not come up within `startup_timeout_secs`.
pub async fn spawn_overlay(
    config: &OverlayConfig,
    identity: &NodeIdentity,
) -> BResult<(OverlayHandle, mpsc::UnboundedReceiver<OverlayEvent>)> {
    config.validate()?;

    let psk = config
        .private_key
        .as_deref()
        .map(psk::pre_shared_key)
        .transpose()?;
    match &psk {
        Some(key) => tracing::info!(fingerprint = %key.fingerprint(), "private overlay admission enabled"),
        None => tracing::info!("public overlay (no private admission key)"),
    }
    if config.uses_default_bootstrap() {
        tracing::warn!(
            private = psk.is_some(),
            "using the placeholder public bootstrap node; it does not serve this overlay's \
             discovery protocol, configure bootstrap_nodes for this deployment"
        );
    }

    let swarm = build_swarm(config, identity, psk)?;
    let local_peer_id = *swarm.local_peer_id();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

    let mut driver = SwarmDriver::new(swarm, command_rx, event_tx, config);

    driver
        .start_listening(
            &config.listen_addrs,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?;
    driver.bootstrap();

    tracing::info!(%local_peer_id, "overlay node started");

    let task = tokio::spawn(driver.run());

    let handle = OverlayHandle {
        local_peer_id,
        command_tx,
        task: Arc::new(Mutex::new(Some(task))),
    };

    Ok((handle, event_rx))
}

fn build_swarm(
    config: &OverlayConfig,
    identity: &NodeIdentity,
    psk: Option<libp2p::pnet::PreSharedKey>,
) -> BResult<Swarm<TopicmeshBehaviour>> {
    let upgrade_timeout = Duration::from_secs(config.dial_timeout_secs);
    let idle_timeout = Duration::from_secs(config.idle_timeout_secs);
    let behaviour_config = config.clone();

    let swarm = libp2p::SwarmBuilder::with_existing_identity(identity.keypair().clone())
        .with_tokio()
        .with_other_transport(|key| {
            transport::build_transport(key, psk, upgrade_timeout)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })
        .map_err(|e| bootstrap_error(format!("failed to configure transport: {e}")))?
        .with_dns()
        .map_err(|e| bootstrap_error(format!("failed to configure DNS resolution: {e}")))?
        .with_behaviour(|key| {
            build_behaviour(key, &behaviour_config)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })
        .map_err(|e| bootstrap_error(format!("failed to build network behaviour: {e}")))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
        .build();

    Ok(swarm)
}

// ---------------------------------------------------------------------------
// OverlayHandle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running overlay node.
///
/// Implements [`Overlay`]. Once the driver has stopped every query
/// answers with an empty result.
#[derive(Clone)]
pub struct OverlayHandle {
    local_peer_id: PeerId,
    command_tx: mpsc::Sender<OverlayCommand>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl OverlayHandle {
    /// Sends a command and waits for its reply.
    ///
    /// Returns `None` if the driver has stopped.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> OverlayCommand,
    ) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx.send(make(reply)).await.ok()?;
        rx.await.ok()
    }

    /// Returns `true` while the driver task is alive.
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

impl std::fmt::Debug for OverlayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayHandle")
            .field("local_peer_id", &self.local_peer_id)
            .field("running", &self.is_running())
            .finish()
    }
}

#[async_trait]
impl Overlay for OverlayHandle {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.request(|reply| OverlayCommand::ListenAddrs { reply })
            .await
            .unwrap_or_default()
    }

    async fn connected_peers(&self) -> Vec<PeerId> {
        self.request(|reply| OverlayCommand::ConnectedPeers { reply })
            .await
            .unwrap_or_default()
    }

    async fn dial_addr(&self, addr: Multiaddr) -> BResult<PeerId> {
        self.request(|reply| OverlayCommand::DialAddr { addr, reply })
            .await
            .unwrap_or(Err(TopicmeshError::NotRunning))
    }

    async fn dial_peer(&self, peer_id: PeerId) -> BResult<()> {
        self.request(|reply| OverlayCommand::DialPeer { peer_id, reply })
            .await
            .unwrap_or(Err(TopicmeshError::NotRunning))
    }

    async fn subscribe(&self, topic: &str) -> BResult<()> {
        let topic = topic.to_owned();
        match self
            .request(|reply| OverlayCommand::Subscribe { topic: topic.clone(), reply })
            .await
        {
            Some(result) => result,
            None => {
                tracing::debug!(%topic, "subscribe ignored: overlay stopped");
                Ok(())
            }
        }
    }

    async fn unsubscribe(&self, topic: &str) -> BResult<()> {
        let topic = topic.to_owned();
        match self
            .request(|reply| OverlayCommand::Unsubscribe { topic: topic.clone(), reply })
            .await
        {
            Some(result) => result,
            None => {
                tracing::debug!(%topic, "unsubscribe ignored: overlay stopped");
                Ok(())
            }
        }
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> BResult<()> {
        let topic = topic.to_owned();
        self.request(|reply| OverlayCommand::Publish { topic, data, reply })
            .await
            .unwrap_or(Err(TopicmeshError::NotRunning))
    }

    async fn known_addresses(&self, peer_id: PeerId) -> Vec<Multiaddr> {
        self.request(|reply| OverlayCommand::KnownAddresses { peer_id, reply })
            .await
            .unwrap_or_default()
    }

    async fn find_peer(&self, peer_id: PeerId) -> BResult<Vec<Multiaddr>> {
        self.request(|reply| OverlayCommand::FindPeer { peer_id, reply })
            .await
            .unwrap_or(Err(TopicmeshError::NotRunning))
    }

    async fn shutdown(&self) {
        let _ = self.command_tx.send(OverlayCommand::Shutdown).await;

        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(%e, "overlay driver task ended abnormally");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SwarmDriver
// ---------------------------------------------------------------------------

/// Reply slot for a dial waiting on its connection outcome.
enum DialReply {
    Addr(oneshot::Sender<BResult<PeerId>>),
    Peer(oneshot::Sender<BResult<()>>),
}

impl DialReply {
    fn resolve(self, outcome: BResult<PeerId>) {
        match self {
            Self::Addr(reply) => {
                let _ = reply.send(outcome);
            }
            Self::Peer(reply) => {
                let _ = reply.send(outcome.map(|_| ()));
            }
        }
    }
}

/// A DHT lookup waiting for its query to finish.
struct PendingLookup {
    peer_id: PeerId,
    reply: oneshot::Sender<BResult<Vec<Multiaddr>>>,
}

/// Owns the swarm; runs inside a single tokio task.
struct SwarmDriver {
    swarm: Swarm<TopicmeshBehaviour>,
    command_rx: mpsc::Receiver<OverlayCommand>,
    event_tx: mpsc::UnboundedSender<OverlayEvent>,
    /// Dials awaiting `ConnectionEstablished` / `OutgoingConnectionError`.
    pending_dials: HashMap<ConnectionId, DialReply>,
    /// Closest-peer queries awaiting their last step.
    pending_lookups: HashMap<kad::QueryId, PendingLookup>,
    /// Addresses learned from Identify, Kademlia and our own dials.
    address_book: AddressBook,
    bootstrap_nodes: Vec<Multiaddr>,
    max_transmit_size: usize,
}

impl SwarmDriver {
    fn new(
        swarm: Swarm<TopicmeshBehaviour>,
        command_rx: mpsc::Receiver<OverlayCommand>,
        event_tx: mpsc::UnboundedSender<OverlayEvent>,
        config: &OverlayConfig,
    ) -> Self {
        Self {
            swarm,
            command_rx,
            event_tx,
            pending_dials: HashMap::new(),
            pending_lookups: HashMap::new(),
            address_book: AddressBook::default(),
            bootstrap_nodes: config.bootstrap_nodes.clone(),
            max_transmit_size: config.max_transmit_size,
        }
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    async fn start_listening(&mut self, addrs: &[Multiaddr], timeout: Duration) -> BResult<()> {
        let mut pending = HashSet::new();
        for addr in addrs {
            let listener_id = self
                .swarm
                .listen_on(addr.clone())
                .map_err(|e| bootstrap_error(format!("failed to listen on {addr}: {e}")))?;
            pending.insert(listener_id);
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while !pending.is_empty() {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(bootstrap_error(format!(
                        "{} listener(s) did not come up within {timeout:?}",
                        pending.len()
                    )));
                }
                event = self.swarm.select_next_some() => {
                    match &event {
                        SwarmEvent::ListenerClosed { listener_id, reason, .. }
                            if pending.contains(listener_id) =>
                        {
                            return Err(bootstrap_error(format!(
                                "listener closed during startup: {reason:?}"
                            )));
                        }
                        SwarmEvent::ListenerError { listener_id, error }
                            if pending.contains(listener_id) =>
                        {
                            return Err(bootstrap_error(format!(
                                "listener failed during startup: {error}"
                            )));
                        }
                        SwarmEvent::NewListenAddr { listener_id, .. } => {
                            pending.remove(listener_id);
                        }
                        _ => {}
                    }
                    self.handle_swarm_event(event);
                }
            }
        }

        Ok(())
    }

    /// Seeds Kademlia with the bootstrap nodes and dials each once.
    fn bootstrap(&mut self) {
        if self.bootstrap_nodes.is_empty() {
            tracing::info!("no bootstrap nodes configured");
            return;
        }

        let nodes = self.bootstrap_nodes.clone();
        let added = self.swarm.behaviour_mut().discovery.add_bootstrap_nodes(&nodes);

        for addr in nodes {
            if let Some((peer_id, clean)) = extract_peer_id(&addr) {
                self.remember_address(peer_id, clean);
            }
            if let Err(e) = self.swarm.dial(addr.clone()) {
                tracing::warn!(%addr, %e, "bootstrap dial failed");
            }
        }

        if added > 0 {
            match self.swarm.behaviour_mut().discovery.bootstrap() {
                Ok(_) => tracing::info!(count = added, "Kademlia bootstrap initiated"),
                Err(e) => tracing::warn!(%e, "Kademlia bootstrap deferred"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    async fn run(mut self) {
        tracing::debug!("overlay driver loop started");

        let mut maintenance =
            tokio::time::interval_at(Instant::now() + MAINTENANCE_INTERVAL, MAINTENANCE_INTERVAL);

        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
                command = self.command_rx.recv() => match command {
                    Some(OverlayCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = maintenance.tick() => {
                    self.handle_maintenance_tick();
                }
            }
        }

        // Dropping the swarm closes every listener and connection;
        // dropping the pending reply senders wakes their callers.
        let connected = self.swarm.connected_peers().count();
        tracing::info!(connected, "overlay driver stopped");
    }

    fn handle_maintenance_tick(&mut self) {
        if !self.bootstrap_nodes.is_empty() {
            if let Err(e) = self.swarm.behaviour_mut().discovery.bootstrap() {
                tracing::debug!(%e, "maintenance: Kademlia re-bootstrap skipped");
            }
        }
        tracing::info!(
            connected_peers = self.swarm.connected_peers().count(),
            "maintenance: network health check"
        );
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: OverlayCommand) {
        tracing::trace!(?command, "overlay command");
        match command {
            OverlayCommand::ListenAddrs { reply } => {
                let _ = reply.send(self.swarm.listeners().cloned().collect());
            }
            OverlayCommand::ConnectedPeers { reply } => {
                let _ = reply.send(self.swarm.connected_peers().cloned().collect());
            }
            OverlayCommand::DialAddr { addr, reply } => {
                self.dial_addr(addr, reply);
            }
            OverlayCommand::DialPeer { peer_id, reply } => {
                self.dial_peer(peer_id, reply);
            }
            OverlayCommand::Subscribe { topic, reply } => {
                let result = gossip::subscribe(&mut self.swarm.behaviour_mut().gossip, &topic);
                if let Ok(true) = result {
                    tracing::info!(%topic, "subscribed to topic");
                }
                let _ = reply.send(result.map(|_| ()));
            }
            OverlayCommand::Unsubscribe { topic, reply } => {
                let result = gossip::unsubscribe(&mut self.swarm.behaviour_mut().gossip, &topic);
                if let Ok(true) = result {
                    tracing::info!(%topic, "unsubscribed from topic");
                }
                let _ = reply.send(result.map(|_| ()));
            }
            OverlayCommand::Publish { topic, data, reply } => {
                let max = self.max_transmit_size;
                let result = gossip::publish(&mut self.swarm.behaviour_mut().gossip, &topic, data, max);
                let _ = reply.send(result);
            }
            OverlayCommand::KnownAddresses { peer_id, reply } => {
                let _ = reply.send(self.lookup_addresses(&peer_id));
            }
            OverlayCommand::FindPeer { peer_id, reply } => {
                let query_id = self.swarm.behaviour_mut().discovery.find_peer(peer_id);
                tracing::debug!(%peer_id, ?query_id, "DHT peer lookup started");
                self.pending_lookups
                    .insert(query_id, PendingLookup { peer_id, reply });
            }
            // Handled by the run loop.
            OverlayCommand::Shutdown => {}
        }
    }

    fn dial_addr(&mut self, addr: Multiaddr, reply: oneshot::Sender<BResult<PeerId>>) {
        let opts = match extract_peer_id(&addr) {
            Some((peer_id, _)) => {
                if self.swarm.is_connected(&peer_id) {
                    let _ = reply.send(Ok(peer_id));
                    return;
                }
                DialOpts::peer_id(peer_id)
                    .addresses(vec![addr.clone()])
                    .condition(PeerCondition::Disconnected)
                    .build()
            }
            None => DialOpts::unknown_peer_id().address(addr.clone()).build(),
        };

        let connection_id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                tracing::debug!(%addr, ?connection_id, "dialing");
                self.pending_dials.insert(connection_id, DialReply::Addr(reply));
            }
            Err(e) => {
                let _ = reply.send(Err(dial_error(&e)));
            }
        }
    }

    fn dial_peer(&mut self, peer_id: PeerId, reply: oneshot::Sender<BResult<()>>) {
        if self.swarm.is_connected(&peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }

        let opts = DialOpts::peer_id(peer_id)
            .addresses(self.address_book.get(&peer_id).to_vec())
            .extend_addresses_through_behaviour()
            .condition(PeerCondition::Disconnected)
            .build();

        let connection_id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                tracing::debug!(%peer_id, ?connection_id, "dialing peer by id");
                self.pending_dials.insert(connection_id, DialReply::Peer(reply));
            }
            Err(e) => {
                let _ = reply.send(Err(dial_error(&e)));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Address book
    // -----------------------------------------------------------------------

    fn remember_address(&mut self, peer_id: PeerId, addr: Multiaddr) {
        self.address_book.insert(peer_id, addr);
    }

    /// Routing-table addresses first, then everything else we learned.
    fn lookup_addresses(&mut self, peer_id: &PeerId) -> Vec<Multiaddr> {
        let mut found = self.swarm.behaviour_mut().discovery.known_addresses(peer_id);
        for addr in self.address_book.get(peer_id) {
            if !found.contains(addr) {
                found.push(addr.clone());
            }
        }
        found
    }

    /// Last connection to `peer_id` went away. Its book entry is kept
    /// only while the routing table still lists the peer.
    fn on_peer_disconnected(&mut self, peer_id: PeerId) {
        let routable = !self
            .swarm
            .behaviour_mut()
            .discovery
            .known_addresses(&peer_id)
            .is_empty();
        if !routable && self.address_book.remove(&peer_id) {
            tracing::debug!(%peer_id, "forgot addresses of disconnected peer");
        }
    }

    /// Kademlia evicted `peer_id` from a full bucket.
    fn on_routing_eviction(&mut self, peer_id: PeerId) {
        if !self.swarm.is_connected(&peer_id) && self.address_book.remove(&peer_id) {
            tracing::debug!(%peer_id, "forgot addresses of peer evicted from routing table");
        }
    }

    // -----------------------------------------------------------------------
    // Swarm events
    // -----------------------------------------------------------------------

    fn handle_swarm_event(&mut self, event: SwarmEvent<TopicmeshBehaviourEvent>) {
        match event {
            // --- Listeners --------------------------------------------
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                tracing::info!(%address, ?listener_id, "new listen address");
                let _ = self.event_tx.send(OverlayEvent::NewListenAddr(address));
            }

            SwarmEvent::ListenerClosed {
                listener_id,
                reason,
                ..
            } => {
                tracing::warn!(?listener_id, ?reason, "listener closed");
            }

            SwarmEvent::ListenerError { listener_id, error } => {
                tracing::warn!(?listener_id, %error, "listener error");
            }

            // --- Connections ------------------------------------------
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                num_established,
                ..
            } => {
                tracing::info!(
                    %peer_id,
                    ?endpoint,
                    num_established = num_established.get(),
                    "connection established"
                );
                if endpoint.is_dialer() {
                    self.remember_address(peer_id, endpoint.get_remote_address().clone());
                }
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    reply.resolve(Ok(peer_id));
                }
                if num_established.get() == 1 {
                    let _ = self.event_tx.send(OverlayEvent::PeerConnected(peer_id));
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, ?cause, num_established, "connection closed");
                if num_established == 0 {
                    self.on_peer_disconnected(peer_id);
                    let _ = self.event_tx.send(OverlayEvent::PeerDisconnected(peer_id));
                }
            }

            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
            } => {
                tracing::warn!(?peer_id, %error, "outgoing connection error");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    reply.resolve(Err(dial_error(&error)));
                }
            }

            SwarmEvent::IncomingConnectionError {
                local_addr,
                send_back_addr,
                error,
                ..
            } => {
                tracing::warn!(
                    %local_addr,
                    %send_back_addr,
                    %error,
                    "incoming connection error"
                );
            }

            // --- Behaviour events -------------------------------------
            SwarmEvent::Behaviour(TopicmeshBehaviourEvent::Discovery(event)) => {
                self.handle_discovery_event(event);
            }

            SwarmEvent::Behaviour(TopicmeshBehaviourEvent::Gossip(event)) => {
                self.handle_gossip_event(event);
            }

            // --- Catch-all --------------------------------------------
            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }

    fn handle_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                let source = message.source.unwrap_or(propagation_source);
                let _ = self.event_tx.send(OverlayEvent::Message {
                    topic: message.topic.to_string(),
                    data: message.data,
                    source,
                });
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer subscribed to topic");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer unsubscribed from topic");
            }
            other => {
                tracing::trace!(?other, "other gossipsub event");
            }
        }
    }

    fn handle_discovery_event(&mut self, event: DiscoveryBehaviourEvent) {
        match event {
            DiscoveryBehaviourEvent::Kademlia(event) => self.handle_kademlia_event(event),
            DiscoveryBehaviourEvent::Identify(event) => self.handle_identify_event(event),
        }
    }

    fn handle_kademlia_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed {
                id, result, step, ..
            } => match result {
                kad::QueryResult::GetClosestPeers(result) => {
                    let finished = step.last || result.is_err();
                    match result {
                        Ok(ok) => {
                            for info in ok.peers {
                                for addr in info.addrs {
                                    self.remember_address(info.peer_id, addr);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(?id, ?e, "closest-peers query ended with error");
                        }
                    }
                    if finished {
                        if let Some(lookup) = self.pending_lookups.remove(&id) {
                            let addrs = self.lookup_addresses(&lookup.peer_id);
                            tracing::debug!(
                                peer_id = %lookup.peer_id,
                                found = addrs.len(),
                                "DHT peer lookup finished"
                            );
                            let _ = lookup.reply.send(Ok(addrs));
                        }
                    }
                }
                kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk {
                    peer,
                    num_remaining,
                })) => {
                    tracing::info!(?id, %peer, num_remaining, "Kademlia bootstrap progress");
                }
                kad::QueryResult::Bootstrap(Err(e)) => {
                    tracing::warn!(?id, ?e, "Kademlia bootstrap failed");
                }
                other => {
                    tracing::trace!(?id, ?step, ?other, "other Kademlia query result");
                }
            },
            kad::Event::RoutingUpdated {
                peer,
                addresses,
                old_peer,
                ..
            } => {
                tracing::debug!(%peer, ?addresses, ?old_peer, "Kademlia routing table updated");
                for addr in addresses.iter() {
                    self.remember_address(peer, addr.clone());
                }
                if let Some(evicted) = old_peer {
                    self.on_routing_eviction(evicted);
                }
            }
            other => {
                tracing::trace!(?other, "other Kademlia event");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                tracing::debug!(
                    %peer_id,
                    protocol_version = %info.protocol_version,
                    agent_version = %info.agent_version,
                    listen_addrs = ?info.listen_addrs,
                    "identify: received peer info"
                );
                for addr in info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .discovery
                        .add_address(&peer_id, addr.clone());
                    self.remember_address(peer_id, addr);
                }
            }
            identify::Event::Error { peer_id, error, .. } => {
                tracing::debug!(%peer_id, %error, "identify: error");
            }
            other => {
                tracing::trace!(?other, "other identify event");
            }
        }
    }
}

fn dial_error(error: &DialError) -> TopicmeshError {
    TopicmeshError::Dial {
        reason: error.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
