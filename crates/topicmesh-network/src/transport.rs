//! Transport construction for the topicmesh overlay.
//!
//! # Transport stack
//!
//! ```text
//! TCP ─▶ [pnet handshake] ─▶ Noise ─▶ Yamux ─▶ timeout
//! ```
//!
//! The pnet layer is only present when a private-admission key is
//! configured. It runs directly on the raw socket, so a peer with a
//! different key never reaches the Noise handshake.
//!
//! The stack is handed to `SwarmBuilder::with_other_transport`; DNS
//! resolution is layered on top by the builder.

use std::time::Duration;

use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::Boxed;
use libp2p::core::upgrade;
use libp2p::pnet::{PnetConfig, PreSharedKey};
use libp2p::{identity, noise, tcp, yamux, PeerId, Transport};

/// Returns the TCP configuration used by the overlay.
///
/// Nagle's algorithm is disabled (`nodelay`) for lower latency.
pub fn tcp_config() -> tcp::Config {
    tcp::Config::default().nodelay(true)
}

/// Builds the authenticated, multiplexed transport.
///
/// # Parameters
///
/// - `keypair`: node identity used for the Noise handshake.
/// - `psk`: private-admission key; `None` for a public overlay.
/// - `timeout`: upper bound for the whole upgrade of one connection.
///
/// # Errors
///
/// Returns the Noise error if the keypair cannot be used for the
/// handshake.
pub fn build_transport(
    keypair: &identity::Keypair,
    psk: Option<PreSharedKey>,
    timeout: Duration,
) -> Result<Boxed<(PeerId, StreamMuxerBox)>, noise::Error> {
    let noise_config = noise::Config::new(keypair)?;
    let yamux_config = yamux::Config::default();
    let base = tcp::tokio::Transport::new(tcp_config());

    let transport = match psk {
        Some(psk) => base
            .and_then(move |socket, _| PnetConfig::new(psk).handshake(socket))
            .upgrade(upgrade::Version::V1Lazy)
            .authenticate(noise_config)
            .multiplex(yamux_config)
            .timeout(timeout)
            .boxed(),
        None => base
            .upgrade(upgrade::Version::V1Lazy)
            .authenticate(noise_config)
            .multiplex(yamux_config)
            .timeout(timeout)
            .boxed(),
    };

    Ok(transport)
}
