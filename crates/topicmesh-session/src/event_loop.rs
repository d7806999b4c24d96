//! Inbound event loop.
//!
//! [`run_event_loop`] is spawned by the session. It consumes
//! [`OverlayEvent`]s one at a time and hands every gossip message to
//! the dispatcher, so messages on a topic reach its callback in
//! arrival order. The loop exits on the shutdown signal or when the
//! overlay's event stream ends.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use topicmesh_network::OverlayEvent;

use crate::dispatch::TopicDispatcher;

pub(crate) async fn run_event_loop(
    dispatcher: Arc<TopicDispatcher>,
    mut events: mpsc::UnboundedReceiver<OverlayEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("session event loop started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            event = events.recv() => match event {
                Some(event) => handle_event(&dispatcher, event),
                None => {
                    tracing::debug!("overlay event stream closed");
                    break;
                }
            },
        }
    }

    tracing::debug!("session event loop stopped");
}

fn handle_event(dispatcher: &TopicDispatcher, event: OverlayEvent) {
    match event {
        OverlayEvent::Message { topic, data, source } => {
            dispatcher.dispatch(&topic, &data, &source);
        }
        OverlayEvent::PeerConnected(peer_id) => {
            tracing::debug!(%peer_id, "peer connected");
        }
        OverlayEvent::PeerDisconnected(peer_id) => {
            tracing::debug!(%peer_id, "peer disconnected");
        }
        OverlayEvent::NewListenAddr(addr) => {
            tracing::debug!(%addr, "listening");
        }
    }
}
