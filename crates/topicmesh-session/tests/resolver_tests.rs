//! Peer-by-id resolution against the in-memory overlay.

mod common;

use std::sync::Arc;

use libp2p::{Multiaddr, PeerId};

use common::FakeOverlay;
use topicmesh_session::PeerResolver;
use topicmesh_types::TopicmeshError;

fn addr(s: &str) -> Multiaddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn known_address_skips_dht_lookup() {
    let (overlay, _events) = FakeOverlay::new();
    let peer_id = PeerId::random();
    overlay.add_known_address(peer_id, addr("/ip4/10.0.0.5/tcp/4021"));

    let resolver = PeerResolver::new(Arc::new(overlay.clone()));
    let resolved = resolver.resolve_peer_address(peer_id).await.unwrap();

    assert_eq!(resolved, addr("/ip4/10.0.0.5/tcp/4021"));
    assert_eq!(overlay.find_peer_calls(), 0);
}

#[tokio::test]
async fn unknown_address_falls_back_to_dht() {
    let (overlay, _events) = FakeOverlay::new();
    let peer_id = PeerId::random();
    overlay.add_dht_address(peer_id, addr("/ip4/10.0.0.6/tcp/4021"));

    let resolver = PeerResolver::new(Arc::new(overlay.clone()));
    let resolved = resolver.resolve_peer_address(peer_id).await.unwrap();

    assert_eq!(resolved, addr("/ip4/10.0.0.6/tcp/4021"));
    assert_eq!(overlay.find_peer_calls(), 1);
}

#[tokio::test]
async fn unresolvable_peer_is_not_found_and_not_dialed() {
    let (overlay, _events) = FakeOverlay::new();
    let resolver = PeerResolver::new(Arc::new(overlay.clone()));

    let result = resolver.connect_to_peer_by_id(PeerId::random()).await;

    assert!(matches!(result, Err(TopicmeshError::NotFound { .. })));
    assert_eq!(overlay.dial_count(), 0);
}

#[tokio::test]
async fn connect_dials_address_with_peer_suffix() {
    let (overlay, _events) = FakeOverlay::new();
    let peer_id = PeerId::random();
    overlay.add_known_address(peer_id, addr("/ip4/10.0.0.7/tcp/4021"));
    overlay.set_reachable(peer_id);

    let resolver = PeerResolver::new(Arc::new(overlay.clone()));
    let dialed = resolver.connect_to_peer_by_id(peer_id).await.unwrap();

    let expected = addr(&format!("/ip4/10.0.0.7/tcp/4021/p2p/{peer_id}"));
    assert_eq!(dialed, expected);
    assert_eq!(overlay.dial_log(), vec![expected]);
    assert!(overlay.connected_peers_snapshot().contains(&peer_id));
}

#[tokio::test]
async fn dial_failure_is_reported_without_retry() {
    let (overlay, _events) = FakeOverlay::new();
    let peer_id = PeerId::random();
    overlay.add_known_address(peer_id, addr("/ip4/10.0.0.8/tcp/4021"));

    let resolver = PeerResolver::new(Arc::new(overlay.clone()));
    let result = resolver.connect_to_peer_by_id(peer_id).await;

    assert!(matches!(result, Err(TopicmeshError::Dial { .. })));
    assert_eq!(overlay.dial_count(), 1);
}
