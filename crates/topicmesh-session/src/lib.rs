//! Session and topic-dispatch engine for the topicmesh overlay.
//!
//! - [`session`]: Session lifecycle and the public entry point
//! - [`dispatch`]: Topic → callback multiplexer
//! - [`reconcile`]: Static-peer reconnection loop
//! - [`resolver`]: Peer-by-id address resolution
//!
//! The overlay itself lives in `topicmesh-network` and is consumed
//! through its `Overlay` trait.

pub mod dispatch;
mod event_loop;
pub mod reconcile;
pub mod resolver;
pub mod session;

pub use dispatch::{CallbackResult, DispatchOutcome, TopicCallback, TopicDispatcher};
pub use reconcile::{ReconcileReport, ReconcilerState, StaticPeerReconciler};
pub use resolver::{parse_peer_id, PeerResolver};
pub use session::Session;
