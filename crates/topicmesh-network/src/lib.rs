//! topicmesh libp2p overlay.
//!
//! Provides the overlay capability the session core is built on:
//! node identity, private-overlay admission, transport, DHT discovery,
//! gossip pub/sub and the swarm driver that owns all of it.
//!
//! # Architecture
//!
//! - [`identity`]: Ed25519 node identity and its `PeerId`
//! - [`psk`]: Private admission token (swarm key) encoding
//! - [`transport`]: TCP + optional pnet + Noise + Yamux
//! - [`discovery`]: Kademlia DHT + Identify behaviour
//! - [`address_book`]: Bounded per-peer address cache beside the DHT
//! - [`gossip`]: Gossipsub topic helpers
//! - [`swarm`]: Swarm driver task and [`OverlayHandle`]
//! - [`overlay`]: The [`Overlay`] trait the session core consumes
//! - [`config`]: Overlay configuration with defaults

pub mod address_book;
pub mod command;
pub mod config;
pub mod discovery;
pub mod events;
pub mod gossip;
pub mod identity;
pub mod overlay;
pub mod psk;
pub mod swarm;
pub mod transport;

pub use config::{OverlayConfig, StaticPeer};
pub use events::OverlayEvent;
pub use identity::NodeIdentity;
pub use overlay::Overlay;
pub use swarm::{spawn_overlay, OverlayHandle};
