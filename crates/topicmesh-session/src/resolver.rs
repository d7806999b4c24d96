//! Peer-by-ID resolution.
//!
//! Turns a bare `PeerId` into a dialable address using the discovery
//! layer: addresses already known are preferred, otherwise a DHT lookup
//! is run. Connecting dials `<addr>/p2p/<peer_id>` exactly once.

use std::sync::Arc;

use libp2p::{Multiaddr, PeerId};

use topicmesh_network::discovery::with_peer_suffix;
use topicmesh_network::Overlay;
use topicmesh_types::{Result, TopicmeshError};

/// Resolves and connects to peers by identifier.
#[derive(Clone)]
pub struct PeerResolver {
    overlay: Arc<dyn Overlay>,
    span: tracing::Span,
}

impl PeerResolver {
    pub fn new(overlay: Arc<dyn Overlay>) -> Self {
        Self {
            overlay,
            span: tracing::info_span!("topicmesh", scope = "resolver"),
        }
    }

    /// Returns the first address discovery knows for `peer_id`.
    ///
    /// # Errors
    ///
    /// `TopicmeshError::NotFound` if neither the address book nor a DHT
    /// lookup yields an address.
    pub async fn resolve_peer_address(&self, peer_id: PeerId) -> Result<Multiaddr> {
        if let Some(addr) = self.overlay.known_addresses(peer_id).await.into_iter().next() {
            tracing::debug!(parent: &self.span, %peer_id, %addr, "resolved from address book");
            return Ok(addr);
        }

        tracing::debug!(parent: &self.span, %peer_id, "address unknown; querying DHT");
        let found = match self.overlay.find_peer(peer_id).await {
            Ok(found) => found,
            Err(TopicmeshError::NotRunning) => return Err(TopicmeshError::NotRunning),
            Err(e) => {
                tracing::debug!(parent: &self.span, %peer_id, %e, "DHT lookup failed");
                Vec::new()
            }
        };

        match found.into_iter().next() {
            Some(addr) => {
                tracing::debug!(parent: &self.span, %peer_id, %addr, "resolved via DHT");
                Ok(addr)
            }
            None => Err(TopicmeshError::NotFound {
                reason: format!("no address known for peer {peer_id}"),
            }),
        }
    }

    /// Resolves `peer_id` and dials it. Returns the address that was
    /// dialed.
    ///
    /// # Errors
    ///
    /// - `TopicmeshError::NotFound` if resolution fails; nothing is dialed.
    /// - `TopicmeshError::Dial` if the dial fails. There is no retry.
    pub async fn connect_to_peer_by_id(&self, peer_id: PeerId) -> Result<Multiaddr> {
        let addr = self.resolve_peer_address(peer_id).await?;
        let target = with_peer_suffix(&addr, peer_id);

        match self.overlay.dial_addr(target.clone()).await {
            Ok(_) => {
                tracing::info!(parent: &self.span, %peer_id, addr = %target, "connected to peer by id");
                Ok(target)
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, %peer_id, addr = %target, %e, "dial by id failed");
                Err(match e {
                    TopicmeshError::Dial { .. } | TopicmeshError::NotRunning => e,
                    other => TopicmeshError::Dial {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}

impl std::fmt::Debug for PeerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerResolver").finish_non_exhaustive()
    }
}

/// Parses a textual peer identifier.
///
/// # Errors
///
/// `TopicmeshError::NotFound` if `s` is not a valid `PeerId`.
pub fn parse_peer_id(s: &str) -> Result<PeerId> {
    s.trim().parse().map_err(|e| TopicmeshError::NotFound {
        reason: format!("invalid peer id '{s}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_peer_id_accepts_valid_id() {
        let peer_id = PeerId::random();
        assert_eq!(parse_peer_id(&peer_id.to_string()).unwrap(), peer_id);
    }

    #[test]
    fn parse_peer_id_trims_whitespace() {
        let peer_id = PeerId::random();
        assert_eq!(parse_peer_id(&format!("  {peer_id}\n")).unwrap(), peer_id);
    }

    #[test]
    fn parse_peer_id_rejects_garbage() {
        assert!(matches!(
            parse_peer_id("not-a-peer"),
            Err(TopicmeshError::NotFound { .. })
        ));
    }
}
