//! Topic dispatch multiplexer.
//!
//! Maps each topic string to at most one application callback and
//! routes every inbound message to the callback registered for its
//! exact topic. Overlay subscriptions track the registry: a topic is
//! subscribed on the overlay exactly while a callback is registered
//! for it.
//!
//! Registration changes (`add`/`remove`/`clear`) are serialised by an
//! async membership lock so that "subscribe, then record" and
//! "unsubscribe, then delete" are atomic relative to each other.
//! Dispatch never takes that lock; it only reads the registry long
//! enough to clone the callback out.
//!
//! Once [`close`](TopicDispatcher::close) has run (on session stop) the
//! dispatcher refuses new registrations, so a stopped session can never
//! hold a callback without a matching overlay subscription.

use std::collections::HashMap;
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use libp2p::PeerId;
use tokio::sync::Mutex;

use topicmesh_network::Overlay;
use topicmesh_types::{Result, TopicmeshError};

/// What an application callback returns.
pub type CallbackResult = std::result::Result<(), Box<dyn Error + Send + Sync>>;

/// Per-topic message handler: `(payload, topic, origin)`.
pub type TopicCallback = Arc<dyn Fn(&[u8], &str, &PeerId) -> CallbackResult + Send + Sync>;

/// Result of routing one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered callback ran and returned `Ok`.
    Delivered,
    /// No callback is registered for the topic; the message was dropped.
    NoReceiver,
    /// The callback returned an error or panicked. The failure was logged.
    CallbackFailed,
}

/// Routes inbound topic messages to registered callbacks.
pub struct TopicDispatcher {
    overlay: Arc<dyn Overlay>,
    registry: RwLock<HashMap<String, TopicCallback>>,
    membership: Mutex<()>,
    /// Set by `close`; written only under `membership`.
    closed: AtomicBool,
    span: tracing::Span,
}

impl TopicDispatcher {
    /// Creates an empty dispatcher over `overlay`.
    pub fn new(overlay: Arc<dyn Overlay>) -> Self {
        Self {
            overlay,
            registry: RwLock::new(HashMap::new()),
            membership: Mutex::new(()),
            closed: AtomicBool::new(false),
            span: tracing::info_span!("topicmesh", scope = "dispatch"),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TopicCallback>> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TopicCallback>> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Registers `callback` for `topic`.
    ///
    /// If the topic already has a callback it is replaced in place and
    /// the overlay subscription is left untouched. Otherwise the topic
    /// is subscribed on the overlay first and recorded only once that
    /// succeeded.
    ///
    /// # Errors
    ///
    /// - `TopicmeshError::NotRunning` once the dispatcher is closed.
    /// - The overlay error if the subscription fails; the registry is
    ///   unchanged in that case.
    pub async fn add_topic_callback<F>(&self, topic: &str, callback: F) -> Result<()>
    where
        F: Fn(&[u8], &str, &PeerId) -> CallbackResult + Send + Sync + 'static,
    {
        self.add_shared_callback(topic, Arc::new(callback)).await
    }

    /// Same as [`add_topic_callback`](Self::add_topic_callback) for an
    /// already shared callback.
    pub async fn add_shared_callback(&self, topic: &str, callback: TopicCallback) -> Result<()> {
        let _membership = self.membership.lock().await;

        if self.is_closed() {
            tracing::debug!(parent: &self.span, %topic, "registration refused: dispatcher closed");
            return Err(TopicmeshError::NotRunning);
        }

        if let Some(slot) = self.write().get_mut(topic) {
            *slot = callback;
            tracing::debug!(parent: &self.span, %topic, "replaced topic callback");
            return Ok(());
        }

        self.overlay.subscribe(topic).await?;
        self.write().insert(topic.to_owned(), callback);
        tracing::info!(parent: &self.span, %topic, "registered topic callback");
        Ok(())
    }

    /// Unregisters the callback for `topic` and leaves the overlay topic.
    ///
    /// Returns `Ok(false)` without touching the overlay when no
    /// callback is registered.
    ///
    /// # Errors
    ///
    /// Returns the overlay error if the unsubscribe fails; the callback
    /// stays registered in that case.
    pub async fn remove_topic_callback(&self, topic: &str) -> Result<bool> {
        let _membership = self.membership.lock().await;

        if !self.read().contains_key(topic) {
            return Ok(false);
        }

        self.overlay.unsubscribe(topic).await?;
        self.write().remove(topic);
        tracing::info!(parent: &self.span, %topic, "removed topic callback");
        Ok(true)
    }

    /// Unregisters every topic.
    ///
    /// Unsubscribe failures are logged and the entry is removed
    /// regardless. Returns the number of topics removed.
    pub async fn clear(&self) -> usize {
        let _membership = self.membership.lock().await;
        self.clear_locked().await
    }

    /// Clears every topic and refuses all later registrations.
    ///
    /// Idempotent. Returns the number of topics removed.
    pub async fn close(&self) -> usize {
        let _membership = self.membership.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        self.clear_locked().await
    }

    async fn clear_locked(&self) -> usize {
        let topics: Vec<String> = self.read().keys().cloned().collect();
        for topic in &topics {
            if let Err(e) = self.overlay.unsubscribe(topic).await {
                tracing::warn!(parent: &self.span, %topic, %e, "unsubscribe failed during clear");
            }
            self.write().remove(topic);
        }
        if !topics.is_empty() {
            tracing::info!(parent: &self.span, count = topics.len(), "cleared topic callbacks");
        }
        topics.len()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registered topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns `true` if a callback is registered for `topic`.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.read().contains_key(topic)
    }

    /// Number of currently connected peers, queried live.
    pub async fn connected_peer_count(&self) -> usize {
        self.overlay.connected_peers().await.len()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Routes one inbound message to the callback for its exact topic.
    ///
    /// Never panics: callback errors and panics are caught and logged as
    /// [`TopicmeshError::Callback`].
    pub fn dispatch(&self, topic: &str, payload: &[u8], origin: &PeerId) -> DispatchOutcome {
        let callback = match self.read().get(topic) {
            Some(callback) => Arc::clone(callback),
            None => {
                tracing::trace!(parent: &self.span, %topic, %origin, "no receiver for topic");
                return DispatchOutcome::NoReceiver;
            }
        };

        let reason = match catch_unwind(AssertUnwindSafe(|| callback(payload, topic, origin))) {
            Ok(Ok(())) => return DispatchOutcome::Delivered,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        let error = TopicmeshError::Callback {
            topic: topic.to_owned(),
            reason,
        };
        tracing::error!(parent: &self.span, %origin, %error, "dispatch callback failed");
        DispatchOutcome::CallbackFailed
    }
}

impl std::fmt::Debug for TopicDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicDispatcher")
            .field("topics", &self.topics())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_owned()
    }
}
