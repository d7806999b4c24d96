//! DHT-based peer discovery for the topicmesh overlay.
//!
//! Wraps Kademlia and Identify into a single [`NetworkBehaviour`] that
//! provides:
//!
//! - **Bootstrap**: Seed the Kademlia routing table with known peers.
//! - **Address book**: Answer "which address do we know for this
//!   peer?" from the routing table.
//! - **Peer lookup**: Run a closest-peers query for a `PeerId` whose
//!   address is not yet known.
//! - **Identify**: Exchange listen addresses on every new connection,
//!   which the swarm driver feeds back into Kademlia.
//!
//! The protocol names are derived from the configured discovery
//! namespace so that unrelated overlays on the same transport never
//! exchange routing data.

use std::num::NonZeroUsize;
use std::time::Duration;

use libp2p::identity;
use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, Multiaddr, PeerId, StreamProtocol};

use topicmesh_types::TopicmeshError;

use crate::config::OverlayConfig;

/// Local alias so we never shadow `std::result::Result` (which the
/// `#[derive(NetworkBehaviour)]` macro needs).
type BResult<T> = std::result::Result<T, TopicmeshError>;

// ---------------------------------------------------------------------------
// Combined NetworkBehaviour
// ---------------------------------------------------------------------------

/// Combined network behaviour providing Kademlia DHT and Identify.
///
/// The `NetworkBehaviour` derive macro auto-generates a
/// `DiscoveryBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct DiscoveryBehaviour {
    /// Kademlia DHT for peer routing.
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,

    /// Identify protocol: exchanges listen addresses and protocols
    /// on every new connection.
    pub identify: identify::Behaviour,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds a [`DiscoveryBehaviour`] from the given identity and config.
///
/// # Errors
///
/// Returns `TopicmeshError::Config` if the replication factor is zero
/// or the namespace does not form a valid protocol name.
pub fn build_discovery_behaviour(
    keypair: &identity::Keypair,
    config: &OverlayConfig,
) -> BResult<DiscoveryBehaviour> {
    // --- Kademlia -----------------------------------------------------------

    let local_peer_id = PeerId::from(keypair.public());

    let replication_factor = NonZeroUsize::new(config.kad_replication_factor).ok_or_else(
        || TopicmeshError::Config {
            reason: "kad_replication_factor must be greater than 0".into(),
        },
    )?;

    let kad_protocol = config.kad_protocol();
    let protocol = StreamProtocol::try_from_owned(kad_protocol.clone()).map_err(|e| {
        TopicmeshError::Config {
            reason: format!("invalid Kademlia protocol name '{kad_protocol}': {e}"),
        }
    })?;

    let mut kad_config = kad::Config::new(protocol);
    kad_config.set_query_timeout(Duration::from_secs(config.kad_query_timeout_secs));
    kad_config.set_replication_factor(replication_factor);

    let store = kad::store::MemoryStore::new(local_peer_id);
    let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
    if config.kad_server_mode {
        kademlia.set_mode(Some(kad::Mode::Server));
    }

    // --- Identify -----------------------------------------------------------

    let identify_config = identify::Config::new(config.identify_protocol(), keypair.public())
        .with_agent_version(format!("topicmesh/{}", env!("CARGO_PKG_VERSION")));

    let identify = identify::Behaviour::new(identify_config);

    Ok(DiscoveryBehaviour { kademlia, identify })
}

// ---------------------------------------------------------------------------
// DHT operations
// ---------------------------------------------------------------------------

impl DiscoveryBehaviour {
    /// Adds bootstrap nodes to the Kademlia routing table.
    ///
    /// Each multiaddr must contain a `/p2p/<peer_id>` component.
    /// Addresses without a peer ID are skipped with a warning.
    ///
    /// Returns the number of nodes added.
    pub fn add_bootstrap_nodes(&mut self, nodes: &[Multiaddr]) -> usize {
        let mut added = 0usize;

        for addr in nodes {
            match extract_peer_id(addr) {
                Some((peer_id, clean_addr)) => {
                    self.kademlia.add_address(&peer_id, clean_addr);
                    added += 1;
                    tracing::info!(%peer_id, %addr, "added bootstrap node to Kademlia routing table");
                }
                None => {
                    tracing::warn!(%addr, "skipping bootstrap node: missing /p2p/ component");
                }
            }
        }

        added
    }

    /// Initiates a Kademlia bootstrap operation.
    ///
    /// # Errors
    ///
    /// Returns `TopicmeshError::Network` if the routing table is empty.
    pub fn bootstrap(&mut self) -> BResult<kad::QueryId> {
        self.kademlia
            .bootstrap()
            .map_err(|e| TopicmeshError::Network {
                reason: format!("failed to start Kademlia bootstrap: {e}"),
            })
    }

    /// Records an address for a peer in the routing table.
    pub fn add_address(&mut self, peer_id: &PeerId, addr: Multiaddr) {
        self.kademlia.add_address(peer_id, addr);
    }

    /// Returns every address the routing table holds for `peer_id`.
    pub fn known_addresses(&mut self, peer_id: &PeerId) -> Vec<Multiaddr> {
        let mut found = Vec::new();
        for bucket in self.kademlia.kbuckets() {
            for entry in bucket.iter() {
                if entry.node.key.preimage() == peer_id {
                    found.extend(entry.node.value.iter().cloned());
                }
            }
        }
        found
    }

    /// Starts a closest-peers lookup for `peer_id`.
    ///
    /// The outcome arrives as a Kademlia `OutboundQueryProgressed`
    /// event in the swarm event loop and is bounded by the configured
    /// query timeout.
    pub fn find_peer(&mut self, peer_id: PeerId) -> kad::QueryId {
        self.kademlia.get_closest_peers(peer_id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extracts the `PeerId` and the address-without-p2p from a multiaddr.
///
/// Given `/ip4/1.2.3.4/tcp/4001/p2p/12D3KooW...`, returns
/// `Some((PeerId, /ip4/1.2.3.4/tcp/4001))`.
///
/// Returns `None` if the multiaddr does not contain a `/p2p/` component.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<(PeerId, Multiaddr)> {
    let mut clean_addr = Multiaddr::empty();
    let mut peer_id = None;

    for proto in addr.iter() {
        match proto {
            Protocol::P2p(id) => {
                peer_id = Some(id);
            }
            other => {
                clean_addr.push(other);
            }
        }
    }

    peer_id.map(|pid| (pid, clean_addr))
}

/// Returns `addr` terminated by `/p2p/<peer_id>`.
///
/// An address that already names a peer is returned with that
/// component replaced.
pub fn with_peer_suffix(addr: &Multiaddr, peer_id: PeerId) -> Multiaddr {
    let mut out: Multiaddr = addr
        .iter()
        .filter(|p| !matches!(p, Protocol::P2p(_)))
        .collect();
    out.push(Protocol::P2p(peer_id));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_peer_id_with_p2p_component() {
        let peer_id = PeerId::random();
        let addr: Multiaddr = format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer_id}")
            .parse()
            .unwrap();

        let (pid, clean) = extract_peer_id(&addr).unwrap();
        assert_eq!(pid, peer_id);
        assert_eq!(clean.to_string(), "/ip4/127.0.0.1/tcp/4001");
    }

    #[test]
    fn extract_peer_id_without_p2p_returns_none() {
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        assert!(extract_peer_id(&addr).is_none());
    }

    #[test]
    fn with_peer_suffix_appends() {
        let peer_id = PeerId::random();
        let addr: Multiaddr = "/ip4/10.1.2.3/tcp/4021".parse().unwrap();
        let full = with_peer_suffix(&addr, peer_id);
        assert_eq!(full.to_string(), format!("/ip4/10.1.2.3/tcp/4021/p2p/{peer_id}"));
    }

    #[test]
    fn with_peer_suffix_replaces_existing() {
        let old = PeerId::random();
        let new = PeerId::random();
        let addr: Multiaddr = format!("/ip4/10.1.2.3/tcp/4021/p2p/{old}").parse().unwrap();
        let full = with_peer_suffix(&addr, new);
        assert_eq!(extract_peer_id(&full).map(|(p, _)| p), Some(new));
    }

    #[test]
    fn build_discovery_behaviour_default_config() {
        let keypair = identity::Keypair::generate_ed25519();
        let config = OverlayConfig::default();
        assert!(build_discovery_behaviour(&keypair, &config).is_ok());
    }

    #[test]
    fn build_discovery_behaviour_zero_replication_fails() {
        let keypair = identity::Keypair::generate_ed25519();
        let config = OverlayConfig {
            kad_replication_factor: 0,
            ..OverlayConfig::default()
        };
        assert!(build_discovery_behaviour(&keypair, &config).is_err());
    }

    #[test]
    fn bootstrap_nodes_populate_address_book() {
        let keypair = identity::Keypair::generate_ed25519();
        let mut discovery =
            build_discovery_behaviour(&keypair, &OverlayConfig::default()).unwrap();

        let peer_id = PeerId::random();
        let with_p2p: Multiaddr = format!("/ip4/10.0.0.9/tcp/4021/p2p/{peer_id}").parse().unwrap();
        let without: Multiaddr = "/ip4/10.0.0.10/tcp/4021".parse().unwrap();

        assert_eq!(discovery.add_bootstrap_nodes(&[with_p2p, without]), 1);
        let known = discovery.known_addresses(&peer_id);
        assert_eq!(known, vec!["/ip4/10.0.0.9/tcp/4021".parse::<Multiaddr>().unwrap()]);
    }

    #[test]
    fn unknown_peer_has_no_addresses() {
        let keypair = identity::Keypair::generate_ed25519();
        let mut discovery =
            build_discovery_behaviour(&keypair, &OverlayConfig::default()).unwrap();
        assert!(discovery.known_addresses(&PeerId::random()).is_empty());
    }
}
