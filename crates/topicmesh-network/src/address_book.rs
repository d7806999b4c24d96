//! Bounded per-peer address book kept beside the Kademlia routing table.
//!
//! Holds addresses learned from Identify, closest-peer queries and our
//! own dials so that a peer-by-id dial has something to try even when
//! the routing table never admitted the peer.
//!
//! Both dimensions are bounded: each peer keeps at most
//! [`MAX_ADDRS_PER_PEER`] addresses (oldest dropped first) and the book
//! tracks at most its configured number of peers (oldest peer evicted
//! first). The swarm driver additionally forgets a peer once it is
//! disconnected and no longer in the routing table.

use std::collections::{HashMap, VecDeque};

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Addresses retained per peer.
pub const MAX_ADDRS_PER_PEER: usize = 8;

/// Default number of peers tracked.
pub const DEFAULT_ADDRESS_BOOK_PEERS: usize = 1_024;

// ---------------------------------------------------------------------------
// AddressBook
// ---------------------------------------------------------------------------

/// FIFO-bounded map from `PeerId` to the addresses we learned for it.
///
/// Stored addresses never carry a `/p2p/` component.
#[derive(Debug)]
pub struct AddressBook {
    entries: HashMap<PeerId, Vec<Multiaddr>>,
    /// Peer insertion order for eviction.
    order: VecDeque<PeerId>,
    capacity: usize,
}

impl AddressBook {
    /// Creates an empty book tracking at most `capacity` peers.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            entries: HashMap::new(),
            order: VecDeque::with_capacity(cap),
            capacity: cap,
        }
    }

    /// Records `addr` for `peer_id`.
    ///
    /// Duplicates are ignored. When the peer already holds
    /// [`MAX_ADDRS_PER_PEER`] addresses the oldest one is dropped; when
    /// a new peer arrives at capacity the oldest peer is evicted.
    pub fn insert(&mut self, peer_id: PeerId, addr: Multiaddr) {
        let addr: Multiaddr = addr
            .iter()
            .filter(|p| !matches!(p, Protocol::P2p(_)))
            .collect();

        if !self.entries.contains_key(&peer_id) {
            if self.entries.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                    tracing::trace!(peer_id = %oldest, "address book full, evicted oldest peer");
                }
            }
            self.order.push_back(peer_id);
        }

        let known = self.entries.entry(peer_id).or_default();
        if known.contains(&addr) {
            return;
        }
        if known.len() >= MAX_ADDRS_PER_PEER {
            known.remove(0);
        }
        known.push(addr);
    }

    /// Addresses recorded for `peer_id`, oldest first.
    pub fn get(&self, peer_id: &PeerId) -> &[Multiaddr] {
        self.entries.get(peer_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Forgets `peer_id`. Returns `true` if it had an entry.
    pub fn remove(&mut self, peer_id: &PeerId) -> bool {
        if self.entries.remove(peer_id).is_none() {
            return false;
        }
        self.order.retain(|p| p != peer_id);
        true
    }

    /// Number of peers with at least one address.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_BOOK_PEERS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
