//! Events emitted by the overlay.
//!
//! [`OverlayEvent`] is what the session's event loop consumes. All
//! libp2p-specific events are mapped into this enum before they leave
//! the swarm driver.

use libp2p::{Multiaddr, PeerId};

/// Events emitted by the topicmesh overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverlayEvent {
    /// A gossip message arrived on a subscribed topic.
    Message {
        /// Topic string the message was published on.
        topic: String,
        /// Raw payload bytes, untouched.
        data: Vec<u8>,
        /// Peer that originated the message.
        source: PeerId,
    },

    /// A remote peer connected to this node.
    PeerConnected(PeerId),

    /// The last connection to a remote peer closed.
    PeerDisconnected(PeerId),

    /// A listener started accepting on this address.
    NewListenAddr(Multiaddr),
}
