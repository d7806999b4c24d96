//! Commands sent from [`OverlayHandle`](crate::swarm::OverlayHandle)
//! to the swarm driver task.
//!
//! Each command that produces a result carries a
//! `tokio::sync::oneshot::Sender` for the reply. All commands are
//! processed sequentially inside the driver loop, which is the only
//! code that touches the libp2p `Swarm`.

use libp2p::{Multiaddr, PeerId};
use tokio::sync::oneshot;

use topicmesh_types::Result;

/// Commands accepted by the swarm driver.
pub enum OverlayCommand {
    /// Report the current listen addresses.
    ListenAddrs {
        /// Reply channel.
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },

    /// Report the currently connected peers.
    ConnectedPeers {
        /// Reply channel.
        reply: oneshot::Sender<Vec<PeerId>>,
    },

    /// Dial a multiaddr; the reply fires once the connection is
    /// established or has failed.
    DialAddr {
        /// Target address, optionally ending in `/p2p/<peer_id>`.
        addr: Multiaddr,
        /// Reply channel carrying the remote `PeerId`.
        reply: oneshot::Sender<Result<PeerId>>,
    },

    /// Dial a peer by identifier.
    DialPeer {
        /// Target peer.
        peer_id: PeerId,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },

    /// Join a gossip topic.
    Subscribe {
        /// Topic name.
        topic: String,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },

    /// Leave a gossip topic.
    Unsubscribe {
        /// Topic name.
        topic: String,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },

    /// Publish on a gossip topic.
    Publish {
        /// Topic name.
        topic: String,
        /// Payload bytes.
        data: Vec<u8>,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },

    /// Look up addresses already known for a peer.
    KnownAddresses {
        /// Peer to look up.
        peer_id: PeerId,
        /// Reply channel.
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },

    /// Run a DHT lookup for a peer.
    FindPeer {
        /// Peer to look up.
        peer_id: PeerId,
        /// Reply channel, answered when the query finishes.
        reply: oneshot::Sender<Result<Vec<Multiaddr>>>,
    },

    /// Stop the driver, closing every connection and listener.
    Shutdown,
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for OverlayCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListenAddrs { .. } => f.write_str("ListenAddrs"),
            Self::ConnectedPeers { .. } => f.write_str("ConnectedPeers"),
            Self::DialAddr { addr, .. } => f
                .debug_struct("DialAddr")
                .field("addr", addr)
                .finish_non_exhaustive(),
            Self::DialPeer { peer_id, .. } => f
                .debug_struct("DialPeer")
                .field("peer_id", peer_id)
                .finish_non_exhaustive(),
            Self::Subscribe { topic, .. } => f
                .debug_struct("Subscribe")
                .field("topic", topic)
                .finish_non_exhaustive(),
            Self::Unsubscribe { topic, .. } => f
                .debug_struct("Unsubscribe")
                .field("topic", topic)
                .finish_non_exhaustive(),
            Self::Publish { topic, data, .. } => f
                .debug_struct("Publish")
                .field("topic", topic)
                .field("len", &data.len())
                .finish_non_exhaustive(),
            Self::KnownAddresses { peer_id, .. } => f
                .debug_struct("KnownAddresses")
                .field("peer_id", peer_id)
                .finish_non_exhaustive(),
            Self::FindPeer { peer_id, .. } => f
                .debug_struct("FindPeer")
                .field("peer_id", peer_id)
                .finish_non_exhaustive(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}
