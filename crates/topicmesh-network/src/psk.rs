//! Private-overlay admission via a pre-shared key.
//!
//! The operator supplies a hex-encoded 32-byte secret. It is wrapped in
//! the versioned swarm-key envelope
//!
//! ```text
//! /key/swarm/psk/1.0.0/
//! /base16/
//! <hex secret>
//! ```
//!
//! and the envelope bytes are parsed into a libp2p [`PreSharedKey`].
//! Any other implementation joining the same overlay derives the same
//! bytes from the same secret, so the envelope shape must not change.
//! Nodes holding different secrets fail the pnet handshake before Noise
//! runs.

use libp2p::pnet::PreSharedKey;

use topicmesh_types::{Result, TopicmeshError};

/// Schema tag, first line of the envelope.
pub const SWARM_KEY_SCHEMA: &str = "/key/swarm/psk/1.0.0/";

/// Encoding tag, second line of the envelope.
pub const SWARM_KEY_ENCODING: &str = "/base16/";

/// Length of the decoded secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Decodes and length-checks a hex secret.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns `TopicmeshError::Config` if the input is not hex or does
/// not decode to exactly [`SECRET_LEN`] bytes.
pub fn decode_secret(secret_hex: &str) -> Result<[u8; SECRET_LEN]> {
    let bytes = hex::decode(secret_hex.trim()).map_err(|e| TopicmeshError::Config {
        reason: format!("private key is not valid hex: {e}"),
    })?;
    if bytes.len() != SECRET_LEN {
        return Err(TopicmeshError::Config {
            reason: format!(
                "private key must be {SECRET_LEN} bytes, got {}",
                bytes.len()
            ),
        });
    }
    let mut out = [0u8; SECRET_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Builds the byte-encoded swarm-key envelope for `secret_hex`.
///
/// # Errors
///
/// Returns `TopicmeshError::Config` if the secret is malformed.
pub fn swarm_key_envelope(secret_hex: &str) -> Result<Vec<u8>> {
    let secret_hex = secret_hex.trim();
    decode_secret(secret_hex)?;
    Ok(format!("{SWARM_KEY_SCHEMA}\n{SWARM_KEY_ENCODING}\n{secret_hex}").into_bytes())
}

/// Derives the libp2p pre-shared key used by the pnet handshake.
///
/// # Errors
///
/// Returns `TopicmeshError::Config` if the secret is malformed or the
/// envelope is rejected by libp2p.
pub fn pre_shared_key(secret_hex: &str) -> Result<PreSharedKey> {
    let envelope = swarm_key_envelope(secret_hex)?;
    let text = String::from_utf8(envelope).map_err(|e| TopicmeshError::Config {
        reason: format!("swarm key envelope is not UTF-8: {e}"),
    })?;
    text.parse::<PreSharedKey>().map_err(|e| TopicmeshError::Config {
        reason: format!("failed to parse swarm key: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
