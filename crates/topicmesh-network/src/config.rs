//! Overlay configuration for the topicmesh libp2p layer.
//!
//! Every field has a documented default so a config file may name only
//! what it wants to change. [`OverlayConfig::validate`] runs before any
//! socket is opened; a config that fails validation never produces a
//! session.

use std::time::Duration;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};

use topicmesh_types::{Result, TopicmeshError, DEFAULT_TOPICS};

use crate::discovery::extract_peer_id;
use crate::psk;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Public entry point used when the configuration names no bootstrap
/// nodes.
///
/// This is the generic libp2p bootstrap node. It accepts the transport
/// handshake of a public overlay but serves neither the namespaced
/// Kademlia protocol (`<namespace>/kad/1.0.0`) nor a private admission
/// key, so it never contributes routing entries. Treat it as a
/// placeholder: every deployment should list its own entry points, and
/// a private overlay cannot reach it at all. See
/// [`OverlayConfig::uses_default_bootstrap`].
///
/// Format: `/dnsaddr/<domain>/p2p/<peer_id>` or
/// `/ip4/<ip>/tcp/<port>/p2p/<peer_id>`.
pub const DEFAULT_BOOTSTRAP_NODES: &[&str] =
    &["/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN"];

/// TCP port used by the default listen address.
pub const DEFAULT_LISTEN_PORT: u16 = 4021;

/// Namespace prefix for discovery traffic.
pub const DEFAULT_DISCOVERY_NAMESPACE: &str = "/topicmesh";

/// Seconds between two static-peer reconciliation ticks.
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// OverlayConfig
// ---------------------------------------------------------------------------

/// Snapshot of everything the overlay needs at session start.
///
/// Deserialised from JSON by the daemon. Missing fields take the
/// values of [`OverlayConfig::default`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    /// Multiaddrs to accept inbound connections on.
    ///
    /// Default: `/ip4/0.0.0.0/tcp/4021`.
    #[serde(with = "multiaddr_vec_serde")]
    pub listen_addrs: Vec<Multiaddr>,

    /// Entry-point peers used once at startup to seed the DHT.
    ///
    /// Each entry must carry a `/p2p/<peer_id>` component.
    #[serde(with = "multiaddr_vec_serde")]
    pub bootstrap_nodes: Vec<Multiaddr>,

    /// Peers the session keeps a persistent connection to, independent
    /// of discovery.
    ///
    /// Each entry must carry a `/p2p/<peer_id>` component; the peer id
    /// is what reconciliation compares against the live peer set.
    #[serde(with = "multiaddr_vec_serde")]
    pub static_peers: Vec<Multiaddr>,

    // -----------------------------------------------------------------------
    // Overlay isolation
    // -----------------------------------------------------------------------

    /// Prefix isolating this overlay's DHT traffic.
    ///
    /// The Kademlia protocol becomes `<namespace>/kad/1.0.0`.
    /// Default: `/topicmesh`.
    pub discovery_namespace: String,

    /// Hex-encoded 32-byte private-admission secret.
    ///
    /// When present every connection must complete the pre-shared-key
    /// handshake before Noise runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    /// Topics subscribed with the session's default sink at startup.
    pub topics: Vec<String>,

    // -----------------------------------------------------------------------
    // Timing
    // -----------------------------------------------------------------------

    /// Seconds between static-peer reconciliation ticks.
    pub reconnect_interval_secs: u64,

    /// Seconds before an idle connection is closed by the swarm.
    pub idle_timeout_secs: u64,

    /// Seconds before a transport upgrade (dial or accept) is aborted.
    pub dial_timeout_secs: u64,

    /// Seconds to wait for all listeners to come up at startup.
    pub startup_timeout_secs: u64,

    // -----------------------------------------------------------------------
    // Kademlia
    // -----------------------------------------------------------------------

    /// Number of closest peers records are replicated to.
    pub kad_replication_factor: usize,

    /// Seconds before a Kademlia query times out. Also bounds
    /// peer-by-id resolution.
    pub kad_query_timeout_secs: u64,

    /// Force Kademlia server mode instead of waiting for a confirmed
    /// external address.
    pub kad_server_mode: bool,

    // -----------------------------------------------------------------------
    // Gossip
    // -----------------------------------------------------------------------

    /// Largest gossip message accepted or published, in bytes.
    pub max_transmit_size: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        let mut listen_addr = Multiaddr::empty();
        listen_addr.push(Protocol::Ip4(std::net::Ipv4Addr::UNSPECIFIED));
        listen_addr.push(Protocol::Tcp(DEFAULT_LISTEN_PORT));

        Self {
            listen_addrs: vec![listen_addr],
            bootstrap_nodes: DEFAULT_BOOTSTRAP_NODES
                .iter()
                .filter_map(|s| s.parse::<Multiaddr>().ok())
                .collect(),
            static_peers: Vec::new(),
            discovery_namespace: DEFAULT_DISCOVERY_NAMESPACE.into(),
            private_key: None,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            idle_timeout_secs: 60,
            dial_timeout_secs: 20,
            startup_timeout_secs: 15,
            kad_replication_factor: 20,
            kad_query_timeout_secs: 30,
            kad_server_mode: true,
            max_transmit_size: 1024 * 1024,
        }
    }
}

impl OverlayConfig {
    /// Kademlia protocol name derived from the discovery namespace.
    pub fn kad_protocol(&self) -> String {
        format!("{}/kad/1.0.0", self.discovery_namespace.trim_end_matches('/'))
    }

    /// Identify protocol name derived from the discovery namespace.
    pub fn identify_protocol(&self) -> String {
        format!("{}/id/1.0.0", self.discovery_namespace.trim_end_matches('/'))
    }

    /// Interval between static-peer reconciliation ticks.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Returns `true` while `bootstrap_nodes` is still exactly
    /// [`DEFAULT_BOOTSTRAP_NODES`].
    pub fn uses_default_bootstrap(&self) -> bool {
        let defaults: Vec<Multiaddr> = DEFAULT_BOOTSTRAP_NODES
            .iter()
            .filter_map(|s| s.parse::<Multiaddr>().ok())
            .collect();
        !self.bootstrap_nodes.is_empty() && self.bootstrap_nodes == defaults
    }

    /// Parses the static peer list into [`StaticPeer`] targets.
    ///
    /// # Errors
    ///
    /// Returns `TopicmeshError::Config` if any address lacks a
    /// `/p2p/` component.
    pub fn static_peer_targets(&self) -> Result<Vec<StaticPeer>> {
        self.static_peers.iter().map(StaticPeer::from_addr).collect()
    }

    /// Validates all configuration values.
    ///
    /// Returns `Err(TopicmeshError::Config)` for the first value found
    /// outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addrs.is_empty() {
            return Err(config_error("at least one listen address is required"));
        }
        if self.discovery_namespace.is_empty() {
            return Err(config_error("discovery_namespace must not be empty"));
        }
        if !self.discovery_namespace.starts_with('/') {
            return Err(config_error("discovery_namespace must start with '/'"));
        }
        for (field, value) in [
            ("reconnect_interval_secs", self.reconnect_interval_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("dial_timeout_secs", self.dial_timeout_secs),
            ("startup_timeout_secs", self.startup_timeout_secs),
            ("kad_query_timeout_secs", self.kad_query_timeout_secs),
        ] {
            if value == 0 {
                return Err(config_error(&format!("{field} must be greater than 0")));
            }
        }
        if self.kad_replication_factor == 0 {
            return Err(config_error("kad_replication_factor must be greater than 0"));
        }
        if self.max_transmit_size == 0 {
            return Err(config_error("max_transmit_size must be greater than 0"));
        }
        if self.topics.iter().any(|t| t.is_empty()) {
            return Err(config_error("topic names must not be empty"));
        }
        for addr in &self.bootstrap_nodes {
            if extract_peer_id(addr).is_none() {
                return Err(config_error(&format!(
                    "bootstrap node {addr} is missing its /p2p/ component"
                )));
            }
        }
        self.static_peer_targets()?;
        if let Some(secret) = &self.private_key {
            psk::decode_secret(secret)?;
        }

        Ok(())
    }
}

fn config_error(reason: &str) -> TopicmeshError {
    TopicmeshError::Config {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// StaticPeer
// ---------------------------------------------------------------------------

/// An operator-configured peer the session keeps connected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticPeer {
    /// Full dial address, including the `/p2p/` suffix.
    pub addr: Multiaddr,
    /// Peer id taken from the address suffix.
    pub peer_id: PeerId,
}

impl StaticPeer {
    /// Builds a target from a fully-qualified multiaddr.
    ///
    /// # Errors
    ///
    /// Returns `TopicmeshError::Config` if `addr` has no `/p2p/`
    /// component.
    pub fn from_addr(addr: &Multiaddr) -> Result<Self> {
        let (peer_id, _) = extract_peer_id(addr).ok_or_else(|| TopicmeshError::Config {
            reason: format!("static peer {addr} is missing its /p2p/ component"),
        })?;
        Ok(Self {
            addr: addr.clone(),
            peer_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Serde helpers: Multiaddr does not implement Serialize/Deserialize
// ---------------------------------------------------------------------------

mod multiaddr_vec_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addrs: &[Multiaddr], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<Multiaddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
