//! Node identity: an Ed25519 keypair and the derived `PeerId`.
//!
//! Identities are generated fresh at startup unless the caller injects
//! one. Injection from a 32-byte seed is deterministic: the same seed
//! always yields the same `PeerId`.

use std::fmt;

use libp2p::identity;
use libp2p::PeerId;

use topicmesh_types::{Result, TopicmeshError};

/// Cryptographic identity of this node for the lifetime of a session.
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: identity::Keypair,
    peer_id: PeerId,
}

impl NodeIdentity {
    /// Generates a fresh random Ed25519 identity.
    pub fn generate() -> Self {
        Self::from_keypair(identity::Keypair::generate_ed25519())
    }

    /// Wraps an existing libp2p keypair.
    pub fn from_keypair(keypair: identity::Keypair) -> Self {
        let peer_id = PeerId::from(keypair.public());
        Self { keypair, peer_id }
    }

    /// Derives an identity from a 32-byte Ed25519 secret seed.
    ///
    /// # Errors
    ///
    /// Returns `TopicmeshError::Config` if the seed is rejected by
    /// libp2p.
    pub fn from_seed(seed: [u8; 32]) -> Result<Self> {
        let keypair = identity::Keypair::ed25519_from_bytes(seed).map_err(|e| {
            TopicmeshError::Config {
                reason: format!("invalid ed25519 seed: {e}"),
            }
        })?;
        Ok(Self::from_keypair(keypair))
    }

    /// Derives an identity from a hex-encoded 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns `TopicmeshError::Config` if the input is not 64 hex
    /// characters.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|e| TopicmeshError::Config {
            reason: format!("identity seed is not valid hex: {e}"),
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| TopicmeshError::Config {
            reason: format!("identity seed must be 32 bytes, got {}", v.len()),
        })?;
        Self::from_seed(seed)
    }

    /// Decodes a protobuf-encoded libp2p keypair.
    ///
    /// # Errors
    ///
    /// Returns `TopicmeshError::Config` if the bytes are not a valid
    /// keypair encoding.
    pub fn from_protobuf_encoding(bytes: &[u8]) -> Result<Self> {
        let keypair = identity::Keypair::from_protobuf_encoding(bytes).map_err(|e| {
            TopicmeshError::Config {
                reason: format!("invalid protobuf keypair: {e}"),
            }
        })?;
        Ok(Self::from_keypair(keypair))
    }

    /// Stable identifier derived from the public key.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The underlying libp2p keypair.
    pub fn keypair(&self) -> &identity::Keypair {
        &self.keypair
    }
}

// Never print key material.
impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
