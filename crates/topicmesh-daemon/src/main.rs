//! topicmesh daemon -- headless overlay participant.
//!
//! Usage:
//!
//!   topicmesh-daemon [OPTIONS]
//!
//! Joins the overlay, subscribes to the configured topics and logs
//! every inbound message. See `--help` for the options.
//!
//! The daemon runs until interrupted with Ctrl+C (SIGINT).

use libp2p::PeerId;

use topicmesh_network::{NodeIdentity, OverlayConfig};
use topicmesh_session::{CallbackResult, Session};

mod config;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    print_banner();

    let cli = config::CliArgs::parse_from_env();

    let overlay_config = match config::resolve(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_daemon(overlay_config, cli.identity_seed.as_deref()).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: OverlayConfig, identity_seed: Option<&str>) -> Result<(), String> {
    let identity = match identity_seed {
        Some(seed) => NodeIdentity::from_seed_hex(seed)
            .map_err(|e| format!("invalid identity seed: {e}"))?,
        None => NodeIdentity::generate(),
    };

    tracing::info!(
        listen = ?cfg.listen_addrs,
        bootstrap_count = cfg.bootstrap_nodes.len(),
        static_peers = cfg.static_peers.len(),
        topics = ?cfg.topics,
        namespace = %cfg.discovery_namespace,
        private = cfg.private_key.is_some(),
        "overlay config"
    );

    let session = Session::start_with_identity(cfg.clone(), identity, log_message)
        .await
        .map_err(|e| format!("session start failed: {e}"))?;

    // -----------------------------------------------------------------------
    // Status summary
    // -----------------------------------------------------------------------

    let listen_addrs = session.listen_addrs().await;

    println!();
    println!("============================================================");
    println!("  topicmesh daemon running");
    println!("============================================================");
    println!("  Peer ID:      {}", session.local_peer_id());
    for addr in &listen_addrs {
        println!("  Listening:    {addr}/p2p/{}", session.local_peer_id());
    }
    println!("  Topics:       {}", cfg.topics.join(", "));
    println!("  Static peers: {}", cfg.static_peers.len());
    println!(
        "  Overlay:      {}",
        if cfg.private_key.is_some() { "private" } else { "public" }
    );
    println!("============================================================");
    println!("  Press Ctrl+C to stop");
    println!("============================================================");
    println!();

    // -----------------------------------------------------------------------
    // Wait for shutdown signal
    // -----------------------------------------------------------------------

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "failed to listen for Ctrl+C");
    }
    tracing::info!("received Ctrl+C, shutting down...");

    session.stop().await;

    tracing::info!("daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn log_message(data: &[u8], topic: &str, origin: &PeerId) -> CallbackResult {
    tracing::info!(%topic, %origin, len = data.len(), "message received");
    Ok(())
}

fn print_banner() {
    println!(
        r#"
  _              _
 | |_ ___  _ __ (_) ___ _ __ ___   ___  ___| |__
 | __/ _ \| '_ \| |/ __| '_ ` _ \ / _ \/ __| '_ \
 | || (_) | |_) | | (__| | | | | |  __/\__ \ | | |
  \__\___/| .__/|_|\___|_| |_| |_|\___||___/_| |_|
          |_|                        daemon v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
