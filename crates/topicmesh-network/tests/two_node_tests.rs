//! Integration test: two local overlay nodes.
//!
//! Spawns two nodes on loopback, connects them and checks gossip
//! delivery and private-overlay admission.
//!
//! Requires: `tokio` multi-thread runtime.

use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc::UnboundedReceiver;

use topicmesh_network::{
    spawn_overlay, NodeIdentity, Overlay, OverlayConfig, OverlayEvent, OverlayHandle,
};
use topicmesh_types::TopicmeshError;

const SECRET_A: &str = "0101010101010101010101010101010101010101010101010101010101010101";
const SECRET_B: &str = "0202020202020202020202020202020202020202020202020202020202020202";

fn local_config(private_key: Option<&str>) -> OverlayConfig {
    OverlayConfig {
        listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".parse().unwrap()],
        bootstrap_nodes: Vec::new(),
        private_key: private_key.map(str::to_owned),
        topics: Vec::new(),
        dial_timeout_secs: 5,
        ..OverlayConfig::default()
    }
}

async fn spawn(private_key: Option<&str>) -> (OverlayHandle, UnboundedReceiver<OverlayEvent>) {
    spawn_overlay(&local_config(private_key), &NodeIdentity::generate())
        .await
        .expect("failed to spawn overlay")
}

async fn first_listen_addr(node: &OverlayHandle) -> Multiaddr {
    let addrs = node.listen_addrs().await;
    assert!(!addrs.is_empty(), "expected a listen address after startup");
    addrs[0].clone()
}

async fn dial_addr_of(node: &OverlayHandle) -> Multiaddr {
    let addr = first_listen_addr(node).await;
    format!("{addr}/p2p/{}", node.local_peer_id()).parse().unwrap()
}

/// Waits for the first `Message` event, skipping everything else.
async fn next_message(
    events: &mut UnboundedReceiver<OverlayEvent>,
) -> Option<(String, Vec<u8>, PeerId)> {
    while let Some(event) = events.recv().await {
        if let OverlayEvent::Message { topic, data, source } = event {
            return Some((topic, data, source));
        }
    }
    None
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_nodes_connect_by_address() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("topicmesh_network=debug")
        .try_init();

    let (node_a, _events_a) = spawn(None).await;
    let (node_b, _events_b) = spawn(None).await;

    let target = dial_addr_of(&node_a).await;
    let remote = node_b.dial_addr(target).await.expect("dial should succeed");
    assert_eq!(remote, node_a.local_peer_id());
    assert!(node_b.connected_peers().await.contains(&node_a.local_peer_id()));

    // Dialing an already-connected peer resolves immediately.
    node_b
        .dial_peer(node_a.local_peer_id())
        .await
        .expect("already connected");

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gossip_message_reaches_subscriber() {
    let (node_a, mut events_a) = spawn(None).await;
    let (node_b, _events_b) = spawn(None).await;

    node_a.subscribe("blocks").await.unwrap();
    node_b.subscribe("blocks").await.unwrap();

    node_b.dial_addr(dial_addr_of(&node_a).await).await.unwrap();

    // Give the gossipsub mesh a few heartbeats to form, then publish
    // until the first message is accepted.
    let mut published = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if node_b.publish("blocks", b"block-1".to_vec()).await.is_ok() {
            published = true;
            break;
        }
    }
    assert!(published, "publish never found a subscribed peer");

    let (topic, data, source) = tokio::time::timeout(Duration::from_secs(10), next_message(&mut events_a))
        .await
        .expect("timed out waiting for message")
        .expect("event stream closed");
    assert_eq!(topic, "blocks");
    assert_eq!(data, b"block-1");
    assert_eq!(source, node_b.local_peer_id());

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_private_key_admits_peer() {
    let (node_a, _events_a) = spawn(Some(SECRET_A)).await;
    let (node_b, _events_b) = spawn(Some(SECRET_A)).await;

    let remote = node_b.dial_addr(dial_addr_of(&node_a).await).await;
    assert_eq!(remote, Ok(node_a.local_peer_id()));

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn different_private_keys_cannot_connect() {
    let (node_a, _events_a) = spawn(Some(SECRET_A)).await;
    let (node_b, _events_b) = spawn(Some(SECRET_B)).await;

    let result = node_b.dial_addr(dial_addr_of(&node_a).await).await;
    assert!(matches!(result, Err(TopicmeshError::Dial { .. })));
    assert!(node_b.connected_peers().await.is_empty());

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_handle_reports_not_running() {
    let (node, _events) = spawn(None).await;
    node.shutdown().await;
    // Second shutdown is a no-op.
    node.shutdown().await;

    assert!(!node.is_running());
    assert!(node.listen_addrs().await.is_empty());
    assert!(node.connected_peers().await.is_empty());
    assert!(node.subscribe("blocks").await.is_ok());
    assert_eq!(
        node.publish("blocks", b"x".to_vec()).await,
        Err(TopicmeshError::NotRunning)
    );
    assert_eq!(
        node.dial_peer(PeerId::random()).await,
        Err(TopicmeshError::NotRunning)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_port_fails_startup() {
    let (node, _events) = spawn(None).await;
    let taken = first_listen_addr(&node).await;

    let config = OverlayConfig {
        listen_addrs: vec![taken],
        ..local_config(None)
    };
    let result = spawn_overlay(&config, &NodeIdentity::generate()).await;
    assert!(matches!(result, Err(TopicmeshError::Bootstrap { .. })));

    node.shutdown().await;
}
