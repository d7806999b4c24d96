//! Core shared types for the topicmesh overlay participant.
//!
//! Every crate in the workspace reports failures through
//! [`TopicmeshError`] and uses the [`Result`] alias defined here.

pub mod topics;

use thiserror::Error;

pub use topics::DEFAULT_TOPICS;

// ---------------------------------------------------------------------------
// TopicmeshError
// ---------------------------------------------------------------------------

/// Unified error type for the topicmesh workspace.
///
/// The variants follow the lifetime of a session:
///
/// - [`Bootstrap`](Self::Bootstrap) and [`Config`](Self::Config) are
///   fatal and only surface while a session is being created.
/// - [`Dial`](Self::Dial), [`NotFound`](Self::NotFound) and
///   [`Network`](Self::Network) are transient conditions of a running
///   session.
/// - [`Callback`](Self::Callback) never leaves the dispatch boundary;
///   it exists so the failure can be logged with a stable shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicmeshError {
    /// The node could not start (transport, listener or identity failure).
    #[error("bootstrap error: {reason}")]
    Bootstrap {
        /// Human-readable description of the startup failure.
        reason: String,
    },

    /// An outbound connection attempt failed.
    #[error("dial error: {reason}")]
    Dial {
        /// Human-readable description of the dial failure.
        reason: String,
    },

    /// A peer identifier could not be resolved to any known address.
    #[error("not found: {reason}")]
    NotFound {
        /// Human-readable description of what was looked up.
        reason: String,
    },

    /// An application callback returned an error or panicked.
    #[error("callback error on topic '{topic}': {reason}")]
    Callback {
        /// Topic the failing callback was registered for.
        topic: String,
        /// Human-readable description of the callback failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// A pub/sub or discovery operation on the overlay failed.
    #[error("network error: {reason}")]
    Network {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// The overlay node has been stopped or was never started.
    #[error("overlay is not running")]
    NotRunning,
}

/// Convenience result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TopicmeshError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
