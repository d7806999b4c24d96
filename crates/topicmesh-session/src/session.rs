//! Session lifecycle.
//!
//! A [`Session`] is one participant in the overlay. Creating it starts
//! the overlay node, registers the application sink for every
//! configured topic and spawns the background tasks:
//!
//! - the inbound event loop, which feeds the [`TopicDispatcher`];
//! - the [`StaticPeerReconciler`], when static peers are configured.
//!
//! ```text
//! Session::start ─▶ spawn_overlay ─▶ register topics ─▶ spawn tasks
//!                                                         │
//! Session::stop  ─▶ close dispatcher ─▶ signal tasks ─▶ overlay shutdown ─▶ join
//! ```
//!
//! The session never caches connection state; every peer query goes
//! to the overlay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use libp2p::{Multiaddr, PeerId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use topicmesh_network::{spawn_overlay, NodeIdentity, Overlay, OverlayConfig, OverlayEvent};
use topicmesh_types::{Result, TopicmeshError};

use crate::dispatch::{CallbackResult, TopicCallback, TopicDispatcher};
use crate::event_loop::run_event_loop;
use crate::reconcile::{ReconcilerState, StaticPeerReconciler};
use crate::resolver::PeerResolver;

/// A running overlay participant.
pub struct Session {
    overlay: Arc<dyn Overlay>,
    local_peer_id: PeerId,
    dispatcher: Arc<TopicDispatcher>,
    resolver: PeerResolver,
    reconciler_state: ReconcilerState,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    span: tracing::Span,
}

impl Session {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Starts a session with a freshly generated identity.
    ///
    /// `sink` is registered as the callback for every topic in
    /// `config.topics`.
    ///
    /// # Errors
    ///
    /// `TopicmeshError::Config` for an invalid configuration and
    /// `TopicmeshError::Bootstrap` if the node cannot start. No session
    /// exists in either case.
    pub async fn start<F>(config: OverlayConfig, sink: F) -> Result<Self>
    where
        F: Fn(&[u8], &str, &PeerId) -> CallbackResult + Send + Sync + 'static,
    {
        Self::start_with_identity(config, NodeIdentity::generate(), sink).await
    }

    /// Starts a session with an injected identity.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_with_identity<F>(
        config: OverlayConfig,
        identity: NodeIdentity,
        sink: F,
    ) -> Result<Self>
    where
        F: Fn(&[u8], &str, &PeerId) -> CallbackResult + Send + Sync + 'static,
    {
        config.validate()?;
        let (handle, events) = spawn_overlay(&config, &identity).await?;
        Self::with_overlay(Arc::new(handle), events, &config, sink).await
    }

    /// Wires a session over an already running overlay.
    ///
    /// On failure the overlay is shut down before returning.
    ///
    /// # Errors
    ///
    /// `TopicmeshError::Config` if a static peer address is invalid and
    /// `TopicmeshError::Bootstrap` if a configured topic cannot be
    /// subscribed.
    pub async fn with_overlay<F>(
        overlay: Arc<dyn Overlay>,
        events: mpsc::UnboundedReceiver<OverlayEvent>,
        config: &OverlayConfig,
        sink: F,
    ) -> Result<Self>
    where
        F: Fn(&[u8], &str, &PeerId) -> CallbackResult + Send + Sync + 'static,
    {
        let span = tracing::info_span!("topicmesh", scope = "session");
        let local_peer_id = overlay.local_peer_id();

        let targets = match config.static_peer_targets() {
            Ok(targets) => targets,
            Err(e) => {
                overlay.shutdown().await;
                return Err(e);
            }
        };

        let dispatcher = Arc::new(TopicDispatcher::new(Arc::clone(&overlay)));
        let sink: TopicCallback = Arc::new(sink);
        for topic in &config.topics {
            if let Err(e) = dispatcher.add_shared_callback(topic, Arc::clone(&sink)).await {
                overlay.shutdown().await;
                return Err(TopicmeshError::Bootstrap {
                    reason: format!("failed to subscribe to topic '{topic}': {e}"),
                });
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(2);

        tasks.push(tokio::spawn(run_event_loop(
            Arc::clone(&dispatcher),
            events,
            shutdown_rx.clone(),
        )));

        let reconciler =
            StaticPeerReconciler::new(Arc::clone(&overlay), targets, config.reconnect_interval());
        let reconciler_state = reconciler.state();
        if reconciler_state == ReconcilerState::Active {
            tasks.push(tokio::spawn(reconciler.run(shutdown_rx)));
        }

        tracing::info!(
            parent: &span,
            %local_peer_id,
            topics = config.topics.len(),
            static_peers = config.static_peers.len(),
            private = config.private_key.is_some(),
            "session started"
        );

        Ok(Self {
            resolver: PeerResolver::new(Arc::clone(&overlay)),
            overlay,
            local_peer_id,
            dispatcher,
            reconciler_state,
            running: AtomicBool::new(true),
            shutdown_tx,
            tasks: Mutex::new(tasks),
            span,
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Stops the session. Idempotent.
    ///
    /// Unregisters every topic, stops the background tasks and shuts
    /// the overlay down, closing all connections and listeners.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        tracing::info!(parent: &self.span, "stopping session");

        self.dispatcher.close().await;
        let _ = self.shutdown_tx.send(true);
        self.overlay.shutdown().await;

        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(parent: &self.span, %e, "session task ended abnormally");
            }
        }

        tracing::info!(parent: &self.span, "session stopped");
    }

    /// Returns `true` until [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(TopicmeshError::NotRunning)
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Identifier of the local node.
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Snapshot of the connected peers. Empty after stop.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        if !self.is_running() {
            return Vec::new();
        }
        self.overlay.connected_peers().await
    }

    /// Number of connected peers. Zero after stop.
    pub async fn connected_peer_count(&self) -> usize {
        self.connected_peers().await.len()
    }

    /// Addresses the node listens on. Empty after stop.
    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        if !self.is_running() {
            return Vec::new();
        }
        self.overlay.listen_addrs().await
    }

    /// The topic dispatcher.
    pub fn dispatcher(&self) -> &Arc<TopicDispatcher> {
        &self.dispatcher
    }

    /// The peer-by-id resolver.
    pub fn resolver(&self) -> &PeerResolver {
        &self.resolver
    }

    /// Whether static-peer reconciliation runs for this session.
    pub fn reconciler_state(&self) -> ReconcilerState {
        self.reconciler_state
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Dials `addr` and returns the remote peer id.
    ///
    /// # Errors
    ///
    /// `TopicmeshError::NotRunning` after stop, `TopicmeshError::Dial`
    /// if the connection fails.
    pub async fn dial_addr(&self, addr: Multiaddr) -> Result<PeerId> {
        self.ensure_running()?;
        self.overlay.dial_addr(addr).await
    }

    /// Dials a peer using addresses known to discovery.
    ///
    /// # Errors
    ///
    /// `TopicmeshError::NotRunning` after stop, `TopicmeshError::Dial`
    /// if the connection fails.
    pub async fn dial_peer(&self, peer_id: PeerId) -> Result<()> {
        self.ensure_running()?;
        self.overlay.dial_peer(peer_id).await
    }

    /// Publishes `data` on `topic`.
    ///
    /// # Errors
    ///
    /// `TopicmeshError::NotRunning` after stop, `TopicmeshError::Network`
    /// if the overlay rejects the message.
    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        self.ensure_running()?;
        self.overlay.publish(topic, data).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_peer_id", &self.local_peer_id)
            .field("running", &self.is_running())
            .field("reconciler", &self.reconciler_state)
            .finish_non_exhaustive()
    }
}
