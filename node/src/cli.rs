//! # CLI Interface
//!
//! Command-line argument structure for `sigil-node` using `clap` derive.
//! Server-side subcommands (`run`, `init`) and the client-side commands a
//! key holder uses to manage their name (`keygen`, `register`, `revoke`).

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

use sigil_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_BINDING_TTL, DEFAULT_DNS_PORT, DEFAULT_METRICS_PORT,
    DEFAULT_ZONE_TIMEOUT,
};

/// Sigil self-certifying dynamic DNS node.
///
/// Serves the registration API, answers DNS queries for claimed names, and
/// ships the client commands needed to claim one.
#[derive(Parser, Debug)]
#[command(
    name = "sigil-node",
    about = "Sigil self-certifying dynamic DNS node",
    version,
    propagate_version = true
)]
pub struct SigilNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node: HTTP API, DNS resolver, and metrics endpoint.
    Run(RunArgs),
    /// Initialize the data directory and generate the server seal keypair.
    Init(InitArgs),
    /// Generate a client keypair and print the name it derives to.
    Keygen(KeygenArgs),
    /// Claim or refresh your name against a running server.
    Register(ClientArgs),
    /// Permanently revoke your name. There is no undo.
    Revoke(ClientArgs),
    /// Print version information and exit.
    Version,
}

/// Which binding backend the node runs against.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Per-identity files with mtime freshness; served by the built-in
    /// DNS resolver.
    File,
    /// An external authoritative zone as the system of record; no built-in
    /// resolver.
    Zone,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Node data directory (server keys, file-backed bindings).
    #[arg(long, short = 'd', env = "SIGIL_DATA_DIR", default_value = "~/.sigil")]
    pub data_dir: PathBuf,

    /// The domain claimed names live under.
    #[arg(long, env = "SIGIL_DOMAIN", default_value = "sigil.test")]
    pub domain: String,

    /// Port for the HTTP registration API.
    #[arg(long, env = "SIGIL_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the DNS resolver (UDP and TCP). Only bound with the file
    /// backend.
    #[arg(long, env = "SIGIL_DNS_PORT", default_value_t = DEFAULT_DNS_PORT)]
    pub dns_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SIGIL_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Binding store backend.
    #[arg(long, env = "SIGIL_BACKEND", value_enum, default_value = "file")]
    pub backend: Backend,

    /// Freshness window for file-backed bindings, in seconds.
    #[arg(long, env = "SIGIL_BINDING_TTL", default_value_t = DEFAULT_BINDING_TTL.as_secs())]
    pub binding_ttl: u64,

    /// Zone primary accepting queries and RFC 2136 updates.
    /// Required with the zone backend.
    #[arg(long, env = "SIGIL_ZONE_ENDPOINT")]
    pub zone_endpoint: Option<SocketAddr>,

    /// Timeout for zone-management calls, in seconds.
    #[arg(long, env = "SIGIL_ZONE_TIMEOUT", default_value_t = DEFAULT_ZONE_TIMEOUT.as_secs())]
    pub zone_timeout: u64,

    /// Emit logs as JSON instead of human-readable lines.
    #[arg(long, env = "SIGIL_LOG_JSON")]
    pub log_json: bool,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "SIGIL_DATA_DIR", default_value = "~/.sigil")]
    pub data_dir: PathBuf,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Directory the client keypair is written to.
    #[arg(long, short = 'd', env = "SIGIL_KEY_DIR", default_value = "~/.sigil")]
    pub key_dir: PathBuf,

    /// Overwrite an existing keypair. Off by default because a replaced key
    /// means a different name.
    #[arg(long)]
    pub force: bool,
}

/// Arguments shared by the `register` and `revoke` client commands.
#[derive(Parser, Debug)]
pub struct ClientArgs {
    /// Base URL of the registration API.
    #[arg(long, short = 's', default_value = "http://127.0.0.1:8053")]
    pub server: String,

    /// Path to the client's PKCS#8 PEM signing key.
    #[arg(long, short = 'k', env = "SIGIL_CLIENT_KEY", default_value = "~/.sigil/client.key")]
    pub key: PathBuf,
}
