//! Default topic catalogue.
//!
//! These names are what a freshly configured node subscribes to. The
//! dispatcher accepts any topic string at runtime; the catalogue is a
//! convenience, not a whitelist.

/// Newly produced blocks.
pub const TOPIC_BLOCKS: &str = "blocks";

/// Individual transactions entering the mempool.
pub const TOPIC_TRANSACTIONS: &str = "transactions";

/// Batches of transaction references.
pub const TOPIC_TRANSACTION_BATCHES: &str = "transaction-batches";

/// Validator attestations.
pub const TOPIC_ATTESTATIONS: &str = "attestations";

/// Execution receipts.
pub const TOPIC_RECEIPTS: &str = "receipts";

/// Chain-head updates.
pub const TOPIC_CHAIN_HEADS: &str = "chain-heads";

/// Topics subscribed at startup when the configuration names none.
pub const DEFAULT_TOPICS: &[&str] = &[
    TOPIC_BLOCKS,
    TOPIC_TRANSACTIONS,
    TOPIC_TRANSACTION_BATCHES,
    TOPIC_ATTESTATIONS,
    TOPIC_RECEIPTS,
    TOPIC_CHAIN_HEADS,
];

/// Returns `true` if `name` is one of the [`DEFAULT_TOPICS`].
pub fn is_catalogue_topic(name: &str) -> bool {
    DEFAULT_TOPICS.contains(&name)
}
