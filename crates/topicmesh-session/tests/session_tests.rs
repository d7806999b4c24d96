//! Session lifecycle over the in-memory overlay.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libp2p::PeerId;

use common::{init_tracing, static_addr, test_config, FakeOverlay};
use topicmesh_network::psk::{pre_shared_key, swarm_key_envelope};
use topicmesh_network::OverlayConfig;
use topicmesh_session::{ReconcilerState, Session};
use topicmesh_types::{TopicmeshError, DEFAULT_TOPICS};

type Received = Arc<Mutex<Vec<(String, Vec<u8>, PeerId)>>>;

async fn session_with(
    config: OverlayConfig,
) -> (Session, FakeOverlay, Received) {
    init_tracing();
    let (overlay, events) = FakeOverlay::new();
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let session = Session::with_overlay(
        Arc::new(overlay.clone()),
        events,
        &config,
        move |data: &[u8], topic: &str, origin: &PeerId| {
            sink.lock().unwrap().push((topic.to_owned(), data.to_vec(), *origin));
            Ok(())
        },
    )
    .await
    .unwrap();
    (session, overlay, received)
}

/// Lets the event loop drain what has been delivered so far.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn configured_topics_are_subscribed_at_start() {
    let config = OverlayConfig {
        topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        ..test_config()
    };
    let (session, overlay, _received) = session_with(config).await;

    let mut expected: Vec<String> = DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect();
    expected.sort();
    assert_eq!(overlay.subscriptions(), expected);
    assert_eq!(session.dispatcher().topics(), expected);
    assert_eq!(session.reconciler_state(), ReconcilerState::Idle);

    session.stop().await;
}

#[tokio::test]
async fn each_message_reaches_sink_exactly_once_in_order() {
    let config = OverlayConfig {
        topics: vec!["blocks".into(), "receipts".into()],
        ..test_config()
    };
    let (session, overlay, received) = session_with(config).await;
    let origin = PeerId::random();

    for i in 0..20u8 {
        overlay.deliver("blocks", &[i], origin);
    }
    overlay.deliver("receipts", b"r-1", origin);
    overlay.deliver("unknown-topic", b"dropped", origin);
    settle().await;

    let received = received.lock().unwrap().clone();
    assert_eq!(received.len(), 21);

    let blocks: Vec<Vec<u8>> = received
        .iter()
        .filter(|(topic, _, _)| topic == "blocks")
        .map(|(_, data, _)| data.clone())
        .collect();
    let expected: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i]).collect();
    assert_eq!(blocks, expected);
    assert!(received.iter().all(|(_, _, from)| *from == origin));

    session.stop().await;
}

#[tokio::test]
async fn failing_callback_does_not_stop_event_loop() {
    init_tracing();
    let (overlay, events) = FakeOverlay::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = OverlayConfig {
        topics: vec!["blocks".into()],
        ..test_config()
    };
    let session = Session::with_overlay(
        Arc::new(overlay.clone()),
        events,
        &config,
        move |data: &[u8], _: &str, _: &PeerId| {
            counter.fetch_add(1, Ordering::SeqCst);
            match data {
                b"panic" => panic!("sink panicked"),
                b"error" => Err("sink rejected payload".into()),
                _ => Ok(()),
            }
        },
    )
    .await
    .unwrap();

    let origin = PeerId::random();
    overlay.deliver("blocks", b"panic", origin);
    overlay.deliver("blocks", b"error", origin);
    overlay.deliver("blocks", b"fine", origin);
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(session.is_running());
    session.stop().await;
}

#[tokio::test]
async fn runtime_topic_registration() {
    let (session, overlay, received) = session_with(test_config()).await;
    let origin = PeerId::random();

    let extra = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&extra);
    session
        .dispatcher()
        .add_topic_callback("custom/topic", move |_: &[u8], _: &str, _: &PeerId| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(overlay.subscriptions(), vec!["custom/topic".to_owned()]);

    overlay.deliver("custom/topic", b"1", origin);
    settle().await;
    assert_eq!(extra.load(Ordering::SeqCst), 1);

    session
        .dispatcher()
        .remove_topic_callback("custom/topic")
        .await
        .unwrap();
    overlay.deliver("custom/topic", b"2", origin);
    settle().await;
    assert_eq!(extra.load(Ordering::SeqCst), 1);
    assert!(received.lock().unwrap().is_empty());

    session.stop().await;
}

#[tokio::test]
async fn connected_peer_count_reflects_new_connections() {
    let (session, overlay, _received) = session_with(test_config()).await;

    assert_eq!(session.connected_peer_count().await, 0);
    let peer = PeerId::random();
    overlay.connect(peer);
    settle().await;
    assert_eq!(session.connected_peer_count().await, 1);
    assert_eq!(session.dispatcher().connected_peer_count().await, 1);

    overlay.disconnect(peer);
    settle().await;
    assert_eq!(session.connected_peer_count().await, 0);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reachable_static_peer_connects_and_unreachable_joins_later() {
    let peer_a = PeerId::random();
    let peer_b = PeerId::random();
    let config = OverlayConfig {
        static_peers: vec![static_addr(peer_a, 4001), static_addr(peer_b, 4002)],
        ..test_config()
    };

    init_tracing();
    let (overlay, events) = FakeOverlay::new();
    overlay.set_reachable(peer_a);
    let session = Session::with_overlay(
        Arc::new(overlay.clone()),
        events,
        &config,
        |_: &[u8], _: &str, _: &PeerId| Ok(()),
    )
    .await
    .unwrap();
    assert_eq!(session.reconciler_state(), ReconcilerState::Active);

    // First tick fires at start.
    tokio::time::sleep(Duration::from_millis(1)).await;
    let connected = session.connected_peers().await;
    assert!(connected.contains(&peer_a));
    assert!(!connected.contains(&peer_b));

    overlay.set_reachable(peer_b);
    tokio::time::sleep(config.reconnect_interval()).await;
    let connected = session.connected_peers().await;
    assert!(connected.contains(&peer_a));
    assert!(connected.contains(&peer_b));

    session.stop().await;
}

#[test]
fn configs_sharing_a_secret_derive_the_same_admission_key() {
    let secret_a = "aa".repeat(32);
    let secret_b = "bb".repeat(32);
    let config_one = OverlayConfig {
        private_key: Some(secret_a.clone()),
        ..test_config()
    };
    let config_two = OverlayConfig {
        private_key: Some(secret_a),
        ..test_config()
    };
    let config_three = OverlayConfig {
        private_key: Some(secret_b),
        ..test_config()
    };

    // Same derivation `spawn_overlay` applies to `private_key`.
    let fingerprint = |config: &OverlayConfig| {
        pre_shared_key(config.private_key.as_deref().unwrap())
            .unwrap()
            .fingerprint()
            .to_string()
    };
    let envelope = |config: &OverlayConfig| {
        swarm_key_envelope(config.private_key.as_deref().unwrap()).unwrap()
    };

    assert_eq!(fingerprint(&config_one), fingerprint(&config_two));
    assert_ne!(fingerprint(&config_one), fingerprint(&config_three));
    assert_eq!(envelope(&config_one), envelope(&config_two));
    assert_ne!(envelope(&config_one), envelope(&config_three));
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_everything() {
    let config = OverlayConfig {
        topics: vec!["blocks".into()],
        ..test_config()
    };
    let (session, overlay, _received) = session_with(config).await;
    overlay.connect(PeerId::random());

    session.stop().await;
    session.stop().await;

    assert!(!session.is_running());
    assert_eq!(overlay.shutdown_calls(), 1);
    assert!(overlay.subscriptions().is_empty());
    assert!(session.dispatcher().topics().is_empty());

    assert!(session.connected_peers().await.is_empty());
    assert!(session.listen_addrs().await.is_empty());
    assert_eq!(
        session.publish("blocks", b"x".to_vec()).await,
        Err(TopicmeshError::NotRunning)
    );
    assert_eq!(
        session.dial_peer(PeerId::random()).await,
        Err(TopicmeshError::NotRunning)
    );
    assert_eq!(
        session.dial_addr(static_addr(PeerId::random(), 4003)).await,
        Err(TopicmeshError::NotRunning)
    );
}

#[tokio::test]
async fn registration_after_stop_is_refused() {
    let config = OverlayConfig {
        topics: vec!["blocks".into()],
        ..test_config()
    };
    let (session, overlay, _received) = session_with(config).await;
    session.stop().await;

    let result = session
        .dispatcher()
        .add_topic_callback("late", |_: &[u8], _: &str, _: &PeerId| Ok(()))
        .await;

    assert_eq!(result, Err(TopicmeshError::NotRunning));
    assert!(session.dispatcher().is_closed());
    assert!(session.dispatcher().topics().is_empty());
    assert!(overlay.subscriptions().is_empty());
}

#[tokio::test]
async fn publish_goes_through_overlay() {
    let (session, overlay, _received) = session_with(test_config()).await;
    session.publish("blocks", b"block-9".to_vec()).await.unwrap();
    assert_eq!(overlay.published(), vec![("blocks".to_owned(), b"block-9".to_vec())]);
    session.stop().await;
}

#[tokio::test]
async fn failed_topic_subscription_aborts_start() {
    init_tracing();
    let (overlay, events) = FakeOverlay::new();
    overlay.fail_subscribe("blocks");
    let config = OverlayConfig {
        topics: vec!["blocks".into()],
        ..test_config()
    };

    let result = Session::with_overlay(
        Arc::new(overlay.clone()),
        events,
        &config,
        |_: &[u8], _: &str, _: &PeerId| Ok(()),
    )
    .await;

    assert!(matches!(result, Err(TopicmeshError::Bootstrap { .. })));
    assert!(!overlay.is_running());
}

#[tokio::test]
async fn invalid_config_fails_before_network_start() {
    let config = OverlayConfig {
        discovery_namespace: String::new(),
        ..test_config()
    };
    let result = Session::start(config, |_: &[u8], _: &str, _: &PeerId| Ok(())).await;
    assert!(matches!(result, Err(TopicmeshError::Config { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn real_sessions_exchange_messages() {
    init_tracing();
    let config = OverlayConfig {
        listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".parse().unwrap()],
        topics: vec!["chain-heads".into()],
        ..test_config()
    };

    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let session_a = Session::start(config.clone(), move |data: &[u8], topic: &str, origin: &PeerId| {
        sink.lock().unwrap().push((topic.to_owned(), data.to_vec(), *origin));
        Ok(())
    })
    .await
    .unwrap();
    let session_b = Session::start(config, |_: &[u8], _: &str, _: &PeerId| Ok(()))
        .await
        .unwrap();

    assert_eq!(session_a.connected_peer_count().await, 0);
    assert_eq!(session_b.connected_peer_count().await, 0);

    let addr = session_a.listen_addrs().await[0].clone();
    let target = format!("{addr}/p2p/{}", session_a.local_peer_id()).parse().unwrap();
    assert_eq!(session_b.dial_addr(target).await, Ok(session_a.local_peer_id()));

    assert_eq!(session_b.connected_peer_count().await, 1);
    assert_eq!(session_b.connected_peers().await, vec![session_a.local_peer_id()]);
    let mut seen_by_a = 0;
    for _ in 0..20 {
        seen_by_a = session_a.connected_peer_count().await;
        if seen_by_a == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(seen_by_a, 1);

    let mut published = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if session_b.publish("chain-heads", b"head-42".to_vec()).await.is_ok() {
            published = true;
            break;
        }
    }
    assert!(published, "publish never found a subscribed peer");

    let mut delivered = false;
    for _ in 0..40 {
        if !received.lock().unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    assert!(delivered, "message never reached the sink");

    let received = received.lock().unwrap().clone();
    assert_eq!(
        received[0],
        ("chain-heads".to_owned(), b"head-42".to_vec(), session_b.local_peer_id())
    );

    session_a.stop().await;
    session_b.stop().await;
}
