//! Gossipsub wrapper for topic broadcast.
//!
//! Topic names are opaque strings; the same string maps to the same
//! gossipsub topic on every node. Messages are signed with the node
//! identity so receivers learn the originating peer.

use std::time::Duration;

use libp2p::gossipsub;
use libp2p::identity;

use topicmesh_types::{Result, TopicmeshError};

/// Interval between gossipsub heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds a configured `gossipsub::Behaviour`.
///
/// # Parameters
///
/// - `keypair`: identity used to sign published messages
///   (`MessageAuthenticity::Signed`).
/// - `max_transmit_size`: largest message accepted or published.
///
/// # Errors
///
/// Returns `TopicmeshError::Config` if the gossipsub config is
/// rejected.
pub fn build_gossip_behaviour(
    keypair: &identity::Keypair,
    max_transmit_size: usize,
) -> Result<gossipsub::Behaviour> {
    let config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(max_transmit_size)
        .heartbeat_interval(HEARTBEAT_INTERVAL)
        .build()
        .map_err(|e| TopicmeshError::Config {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(keypair.clone()), config)
        .map_err(|e| TopicmeshError::Config {
            reason: format!("failed to create gossipsub behaviour: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

/// Creates a gossipsub [`IdentTopic`](gossipsub::IdentTopic) from a topic string.
pub fn topic(name: &str) -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new(name)
}

/// Subscribes to `name`. Subscribing twice is harmless.
///
/// Returns `true` if this call created a new subscription.
///
/// # Errors
///
/// Returns `TopicmeshError::Network` if gossipsub refuses the topic.
pub fn subscribe(behaviour: &mut gossipsub::Behaviour, name: &str) -> Result<bool> {
    behaviour
        .subscribe(&topic(name))
        .map_err(|e| TopicmeshError::Network {
            reason: format!("failed to subscribe to topic '{name}': {e}"),
        })
}

/// Unsubscribes from `name`.
///
/// Returns `true` if a subscription existed.
///
/// # Errors
///
/// Returns `TopicmeshError::Network` if the leave message cannot be
/// queued.
pub fn unsubscribe(behaviour: &mut gossipsub::Behaviour, name: &str) -> Result<bool> {
    behaviour
        .unsubscribe(&topic(name))
        .map_err(|e| TopicmeshError::Network {
            reason: format!("failed to unsubscribe from topic '{name}': {e}"),
        })
}

/// Publishes data to a topic.
///
/// # Errors
///
/// Returns `TopicmeshError::Network` if the payload exceeds
/// `max_transmit_size` or no peer is subscribed to the topic.
pub fn publish(
    behaviour: &mut gossipsub::Behaviour,
    topic_name: &str,
    data: Vec<u8>,
    max_transmit_size: usize,
) -> Result<()> {
    if data.len() > max_transmit_size {
        return Err(TopicmeshError::Network {
            reason: format!(
                "payload size {} exceeds maximum {}",
                data.len(),
                max_transmit_size,
            ),
        });
    }

    behaviour
        .publish(topic(topic_name), data)
        .map_err(|e| TopicmeshError::Network {
            reason: format!("failed to publish to topic '{topic_name}': {e}"),
        })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
