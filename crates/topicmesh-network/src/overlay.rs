//! The capability surface the session core drives.
//!
//! [`Overlay`] is deliberately narrow: it is everything the session
//! needs from the transport/gossip substrate and nothing more. The
//! libp2p implementation is [`crate::swarm::OverlayHandle`]; tests
//! substitute an in-memory fake.
//!
//! # Stopped overlays
//!
//! Implementations must tolerate being called after shutdown:
//! queries answer with empty results, subscribe/unsubscribe become
//! no-ops, and dials/publishes fail with `TopicmeshError::NotRunning`.

use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};

use topicmesh_types::Result;

/// Live overlay node, shared by every session component.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Identifier of the local node.
    fn local_peer_id(&self) -> PeerId;

    /// Addresses the node is currently listening on.
    async fn listen_addrs(&self) -> Vec<Multiaddr>;

    /// Snapshot of the currently connected peers.
    async fn connected_peers(&self) -> Vec<PeerId>;

    /// Dials a multiaddr and waits for the connection outcome.
    ///
    /// Returns the `PeerId` of the connected remote.
    async fn dial_addr(&self, addr: Multiaddr) -> Result<PeerId>;

    /// Dials a peer by identifier using addresses known to discovery.
    async fn dial_peer(&self, peer_id: PeerId) -> Result<()>;

    /// Joins a topic. Joining an already-joined topic is a no-op.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Leaves a topic. Leaving an unknown topic is a no-op.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Broadcasts `data` on `topic`.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;

    /// Addresses previously learned for `peer_id` by discovery.
    async fn known_addresses(&self, peer_id: PeerId) -> Vec<Multiaddr>;

    /// Runs a discovery lookup for `peer_id`, bounded by the discovery
    /// layer's own timeout, and returns whatever addresses are then
    /// known.
    async fn find_peer(&self, peer_id: PeerId) -> Result<Vec<Multiaddr>>;

    /// Closes all connections and listeners. Idempotent.
    async fn shutdown(&self);
}
