//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file). The file
//! format is the serialized [`OverlayConfig`]; every field is
//! optional.

use std::path::{Path, PathBuf};

use libp2p::Multiaddr;

use topicmesh_network::OverlayConfig;

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub listen_addrs: Vec<Multiaddr>,
    pub bootstrap_nodes: Vec<Multiaddr>,
    pub no_bootstrap: bool,
    pub static_peers: Vec<Multiaddr>,
    pub topics: Vec<String>,
    pub private_key: Option<String>,
    pub namespace: Option<String>,
    pub identity_seed: Option<String>,
    pub reconnect_interval_secs: Option<u64>,
    pub help: bool,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`, exiting on error or
    /// after printing `--help`.
    pub fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        match Self::parse(&args) {
            Ok(cli) if cli.help => {
                print_help();
                std::process::exit(0);
            }
            Ok(cli) => cli,
            Err(e) => {
                eprintln!("{e}");
                eprintln!("use --help for usage information");
                std::process::exit(1);
            }
        }
    }

    /// Parses the arguments that follow the program name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut cli = Self::default();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("missing value for {flag}"))
            };
            match arg.as_str() {
                "--config" => {
                    cli.config_path = Some(PathBuf::from(value(arg)?));
                }
                "--listen" => {
                    cli.listen_addrs.push(parse_multiaddr(arg, &value(arg)?)?);
                }
                "--bootstrap" => {
                    cli.bootstrap_nodes.push(parse_multiaddr(arg, &value(arg)?)?);
                }
                "--no-bootstrap" => {
                    cli.no_bootstrap = true;
                }
                "--static-peer" => {
                    cli.static_peers.push(parse_multiaddr(arg, &value(arg)?)?);
                }
                "--topic" => {
                    cli.topics.push(value(arg)?);
                }
                "--private-key" => {
                    cli.private_key = Some(value(arg)?);
                }
                "--namespace" => {
                    cli.namespace = Some(value(arg)?);
                }
                "--identity-seed" => {
                    cli.identity_seed = Some(value(arg)?);
                }
                "--reconnect-interval" => {
                    let raw = value(arg)?;
                    let secs = raw
                        .parse()
                        .map_err(|e| format!("invalid value '{raw}' for {arg}: {e}"))?;
                    cli.reconnect_interval_secs = Some(secs);
                }
                "--help" | "-h" => {
                    cli.help = true;
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        Ok(cli)
    }
}

fn parse_multiaddr(flag: &str, raw: &str) -> Result<Multiaddr, String> {
    raw.parse()
        .map_err(|e| format!("invalid multiaddr '{raw}' for {flag}: {e}"))
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// Loads an [`OverlayConfig`] from a JSON file.
///
/// Example `topicmesh.json`:
/// ```json
/// {
///   "listen_addrs": ["/ip4/0.0.0.0/tcp/4021"],
///   "static_peers": ["/ip4/203.0.113.1/tcp/4021/p2p/12D3KooW..."],
///   "topics": ["blocks", "chain-heads"],
///   "private_key": "<64 hex characters>"
/// }
/// ```
pub fn load(path: &Path) -> Result<OverlayConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file: {e}"))?;

    serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))
}

/// Merges CLI overrides onto a config base.
///
/// List flags replace the base list, except bootstrap nodes and static
/// peers, which are appended. Explicit `--bootstrap` nodes replace the
/// placeholder default entry instead of joining it.
pub fn merge_cli(mut config: OverlayConfig, cli: &CliArgs) -> OverlayConfig {
    if !cli.listen_addrs.is_empty() {
        config.listen_addrs = cli.listen_addrs.clone();
    }
    if cli.no_bootstrap || (!cli.bootstrap_nodes.is_empty() && config.uses_default_bootstrap()) {
        config.bootstrap_nodes.clear();
    }
    config.bootstrap_nodes.extend(cli.bootstrap_nodes.iter().cloned());
    config.static_peers.extend(cli.static_peers.iter().cloned());
    if !cli.topics.is_empty() {
        config.topics = cli.topics.clone();
    }
    if cli.private_key.is_some() {
        config.private_key = cli.private_key.clone();
    }
    if let Some(ref namespace) = cli.namespace {
        config.discovery_namespace = namespace.clone();
    }
    if let Some(secs) = cli.reconnect_interval_secs {
        config.reconnect_interval_secs = secs;
    }
    config
}

/// Resolves the effective configuration: file (or defaults), then CLI.
pub fn resolve(cli: &CliArgs) -> Result<OverlayConfig, String> {
    let base = match &cli.config_path {
        Some(path) => load(path)?,
        None => OverlayConfig::default(),
    };
    Ok(merge_cli(base, cli))
}

fn print_help() {
    println!(
        r#"topicmesh daemon - headless overlay participant

USAGE:
    topicmesh-daemon [OPTIONS]

OPTIONS:
    --config <PATH>              Load settings from JSON config file
    --listen <MULTIADDR>         Listen address (repeatable, default: /ip4/0.0.0.0/tcp/4021)
    --bootstrap <MULTIADDR>      Add a bootstrap node (repeatable, replaces the default)
    --no-bootstrap               Drop the default bootstrap node
    --static-peer <MULTIADDR>    Keep this peer connected (repeatable, needs /p2p/)
    --topic <NAME>               Subscribe to a topic (repeatable, default: catalogue)
    --private-key <HEX>          32-byte hex secret for a private overlay
    --namespace <NAME>           Discovery namespace (default: /topicmesh)
    --identity-seed <HEX>        Derive the node identity from a 32-byte hex seed
    --reconnect-interval <SECS>  Static-peer reconnect interval (default: 10)
    -h, --help                   Show this help

EXAMPLES:
    # Private overlay with one static peer
    topicmesh-daemon --private-key <HEX> \
        --static-peer /ip4/10.0.0.2/tcp/4021/p2p/12D3KooW...

    # Use config file
    topicmesh-daemon --config /etc/topicmesh/topicmesh.json

ENVIRONMENT:
    RUST_LOG                     Log level filter (default: info)
"#
    );
}
