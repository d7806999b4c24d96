//! In-memory [`Overlay`] used by the session integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc;

use topicmesh_network::discovery::extract_peer_id;
use topicmesh_network::{Overlay, OverlayConfig, OverlayEvent};
use topicmesh_types::{Result, TopicmeshError};

#[derive(Default)]
struct FakeState {
    running: bool,
    connected: HashSet<PeerId>,
    /// Peers that accept a dial.
    reachable: HashSet<PeerId>,
    subscriptions: HashSet<String>,
    /// Every address passed to `dial_addr`, in call order.
    dial_log: Vec<Multiaddr>,
    known: HashMap<PeerId, Vec<Multiaddr>>,
    /// Addresses a DHT lookup would discover.
    dht: HashMap<PeerId, Vec<Multiaddr>>,
    find_peer_calls: usize,
    published: Vec<(String, Vec<u8>)>,
    fail_subscribe: HashSet<String>,
    shutdown_calls: usize,
}

/// Scriptable overlay. Clones share state.
#[derive(Clone)]
pub struct FakeOverlay {
    local_peer_id: PeerId,
    state: Arc<Mutex<FakeState>>,
    events: mpsc::UnboundedSender<OverlayEvent>,
    dial_delay: Duration,
}

impl FakeOverlay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OverlayEvent>) {
        Self::with_dial_delay(Duration::ZERO)
    }

    /// Every dial sleeps for `delay` before resolving.
    pub fn with_dial_delay(delay: Duration) -> (Self, mpsc::UnboundedReceiver<OverlayEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let overlay = Self {
            local_peer_id: PeerId::random(),
            state: Arc::new(Mutex::new(FakeState {
                running: true,
                ..FakeState::default()
            })),
            events,
            dial_delay: delay,
        };
        (overlay, rx)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_reachable(&self, peer_id: PeerId) {
        self.state().reachable.insert(peer_id);
    }

    pub fn set_unreachable(&self, peer_id: PeerId) {
        self.state().reachable.remove(&peer_id);
    }

    /// Simulates an inbound connection, announced like the swarm driver does.
    pub fn connect(&self, peer_id: PeerId) {
        if self.state().connected.insert(peer_id) {
            let _ = self.events.send(OverlayEvent::PeerConnected(peer_id));
        }
    }

    /// Simulates the remote dropping the connection.
    pub fn disconnect(&self, peer_id: PeerId) {
        if self.state().connected.remove(&peer_id) {
            let _ = self.events.send(OverlayEvent::PeerDisconnected(peer_id));
        }
    }

    pub fn add_known_address(&self, peer_id: PeerId, addr: Multiaddr) {
        self.state().known.entry(peer_id).or_default().push(addr);
    }

    pub fn add_dht_address(&self, peer_id: PeerId, addr: Multiaddr) {
        self.state().dht.entry(peer_id).or_default().push(addr);
    }

    pub fn fail_subscribe(&self, topic: &str) {
        self.state().fail_subscribe.insert(topic.to_owned());
    }

    pub fn connected_peers_snapshot(&self) -> Vec<PeerId> {
        self.state().connected.iter().copied().collect()
    }

    pub fn dial_log(&self) -> Vec<Multiaddr> {
        self.state().dial_log.clone()
    }

    pub fn dial_count(&self) -> usize {
        self.state().dial_log.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state().subscriptions.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn find_peer_calls(&self) -> usize {
        self.state().find_peer_calls
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state().published.clone()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state().shutdown_calls
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Injects an inbound gossip message.
    pub fn deliver(&self, topic: &str, data: &[u8], source: PeerId) {
        let _ = self.events.send(OverlayEvent::Message {
            topic: topic.to_owned(),
            data: data.to_vec(),
            source,
        });
    }
}

#[async_trait]
impl Overlay for FakeOverlay {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn listen_addrs(&self) -> Vec<Multiaddr> {
        if !self.state().running {
            return Vec::new();
        }
        vec!["/ip4/127.0.0.1/tcp/4021".parse().unwrap()]
    }

    async fn connected_peers(&self) -> Vec<PeerId> {
        let state = self.state();
        if !state.running {
            return Vec::new();
        }
        state.connected.iter().copied().collect()
    }

    async fn dial_addr(&self, addr: Multiaddr) -> Result<PeerId> {
        self.state().dial_log.push(addr.clone());
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }

        let mut state = self.state();
        if !state.running {
            return Err(TopicmeshError::NotRunning);
        }
        let peer_id = extract_peer_id(&addr)
            .map(|(peer_id, _)| peer_id)
            .ok_or_else(|| TopicmeshError::Dial {
                reason: format!("{addr} has no peer id"),
            })?;
        if !state.reachable.contains(&peer_id) {
            return Err(TopicmeshError::Dial {
                reason: format!("connection refused by {peer_id}"),
            });
        }
        state.connected.insert(peer_id);
        Ok(peer_id)
    }

    async fn dial_peer(&self, peer_id: PeerId) -> Result<()> {
        let mut state = self.state();
        if !state.running {
            return Err(TopicmeshError::NotRunning);
        }
        if state.reachable.contains(&peer_id) {
            state.connected.insert(peer_id);
            Ok(())
        } else {
            Err(TopicmeshError::Dial {
                reason: format!("no route to {peer_id}"),
            })
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut state = self.state();
        if !state.running {
            return Ok(());
        }
        if state.fail_subscribe.contains(topic) {
            return Err(TopicmeshError::Network {
                reason: format!("subscription to '{topic}' refused"),
            });
        }
        state.subscriptions.insert(topic.to_owned());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.state().subscriptions.remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let mut state = self.state();
        if !state.running {
            return Err(TopicmeshError::NotRunning);
        }
        state.published.push((topic.to_owned(), data));
        Ok(())
    }

    async fn known_addresses(&self, peer_id: PeerId) -> Vec<Multiaddr> {
        self.state().known.get(&peer_id).cloned().unwrap_or_default()
    }

    async fn find_peer(&self, peer_id: PeerId) -> Result<Vec<Multiaddr>> {
        let mut state = self.state();
        state.find_peer_calls += 1;
        if let Some(found) = state.dht.get(&peer_id).cloned() {
            state.known.entry(peer_id).or_default().extend(found);
        }
        Ok(state.known.get(&peer_id).cloned().unwrap_or_default())
    }

    async fn shutdown(&self) {
        let mut state = self.state();
        state.shutdown_calls += 1;
        state.running = false;
        state.connected.clear();
    }
}

/// Config with no network side effects beyond what a test adds.
pub fn test_config() -> OverlayConfig {
    OverlayConfig {
        bootstrap_nodes: Vec::new(),
        topics: Vec::new(),
        ..OverlayConfig::default()
    }
}

pub fn static_addr(peer_id: PeerId, port: u16) -> Multiaddr {
    format!("/ip4/10.0.0.1/tcp/{port}/p2p/{peer_id}").parse().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("topicmesh_session=debug")
        .with_test_writer()
        .try_init();
}
