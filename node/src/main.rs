// Copyright (c) 2026 Sigil Project. MIT License.
// See LICENSE for details.

//! # Sigil Node
//!
//! Entry point for the `sigil-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the registration API plus
//! the DNS resolver. The same binary carries the client commands
//! (`keygen`, `register`, `revoke`), so one install covers both ends of
//! the protocol.

mod api;
mod cli;
mod dns;
mod http;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use sigil_protocol::auth::{ChallengeIssuer, ResponseValidator};
use sigil_protocol::config::PROTOCOL_VERSION;
use sigil_protocol::crypto::keys::SigilKeypair;
use sigil_protocol::crypto::sealed::SealKeypair;
use sigil_protocol::identity::Identity;
use sigil_protocol::resolver::NameResolver;
use sigil_protocol::store::{BindingStore, FileStore, ZoneConfig, ZoneStore};

use cli::{Backend, Commands, SigilNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SigilNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(&args),
        Commands::Keygen(args) => keygen(&args),
        Commands::Register(args) => client_register(&args).await,
        Commands::Revoke(args) => client_revoke(&args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full node: registration API, metrics endpoint, and (with the
/// file backend) the DNS resolver.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging("sigil_node=info,sigil_protocol=info,tower_http=info", format);

    tracing::info!(
        domain = %args.domain,
        api_port = args.api_port,
        dns_port = args.dns_port,
        metrics_port = args.metrics_port,
        backend = ?args.backend,
        data_dir = %args.data_dir.display(),
        "starting sigil-node"
    );

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create data directory: {}", args.data_dir.display()))?;

    // --- Server seal keypair ---
    let seal_keypair = load_or_generate_seal_keypair(&args.data_dir)?;

    // --- Binding store (and resolver, file backend only) ---
    let (store, resolver): (Arc<dyn BindingStore>, Option<NameResolver>) = match args.backend {
        Backend::File => {
            let store: Arc<dyn BindingStore> = Arc::new(
                FileStore::open(&args.data_dir, Duration::from_secs(args.binding_ttl))
                    .context("failed to open file-backed binding store")?,
            );
            let resolver = NameResolver::new(Arc::clone(&store));
            (store, Some(resolver))
        }
        Backend::Zone => {
            let endpoint = args
                .zone_endpoint
                .context("--zone-endpoint is required with the zone backend")?;
            let mut config = ZoneConfig::new(endpoint, args.domain.clone());
            config.timeout = Duration::from_secs(args.zone_timeout);
            let store = ZoneStore::new(config).context("failed to configure zone store")?;
            // The zone itself answers DNS queries; no resolver here.
            (Arc::new(store), None)
        }
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Application state ---
    let app_state = api::AppState {
        domain: args.domain.clone(),
        issuer: Arc::new(ChallengeIssuer::new(seal_keypair.public())),
        validator: Arc::new(ResponseValidator::new(seal_keypair)),
        store,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {api_addr}");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("Metrics server listening on {metrics_addr}");

    // --- DNS server (file backend only) ---
    let dns_addr: SocketAddr = format!("0.0.0.0:{}", args.dns_port)
        .parse()
        .expect("static listen address");
    let dns_future = async move {
        match resolver {
            Some(resolver) => dns::run(dns_addr, resolver).await,
            None => std::future::pending::<Result<()>>().await,
        }
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            if let Err(e) = res {
                tracing::error!("API server error: {e}");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {e}");
            }
        }
        res = dns_future => {
            if let Err(e) = res {
                tracing::error!("DNS server error: {e}");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("sigil-node stopped");
    Ok(())
}

/// Initializes the data directory and the server seal keypair.
fn init_node(args: &cli::InitArgs) -> Result<()> {
    logging::init_logging("sigil_node=info", LogFormat::Pretty);

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create data directory: {}", args.data_dir.display()))?;
    let keypair = load_or_generate_seal_keypair(&args.data_dir)?;

    println!("Node initialized.");
    println!("  Data directory : {}", args.data_dir.display());
    println!("  Seal public key: {}", hex::encode(keypair.public().as_bytes()));
    Ok(())
}

/// Loads the seal keypair from the data directory, generating and
/// persisting a fresh one on first run.
fn load_or_generate_seal_keypair(data_dir: &Path) -> Result<SealKeypair> {
    let key_path = data_dir.join("server.key");
    let pub_path = data_dir.join("server.pub");

    if key_path.is_file() {
        let hex_key = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read {}", key_path.display()))?;
        let keypair = SealKeypair::from_hex(&hex_key)
            .with_context(|| format!("corrupt seal key in {}", key_path.display()))?;
        tracing::info!(path = %key_path.display(), "seal keypair loaded");
        return Ok(keypair);
    }

    let keypair = SealKeypair::generate();
    std::fs::write(&key_path, keypair.to_hex())
        .with_context(|| format!("failed to write {}", key_path.display()))?;
    std::fs::write(&pub_path, hex::encode(keypair.public().as_bytes()))
        .with_context(|| format!("failed to write {}", pub_path.display()))?;
    restrict_permissions(&key_path)?;
    tracing::info!(path = %key_path.display(), "seal keypair generated");
    Ok(keypair)
}

/// Generates a client keypair and prints the name it derives to.
fn keygen(args: &cli::KeygenArgs) -> Result<()> {
    let key_path = args.key_dir.join("client.key");
    let pub_path = args.key_dir.join("client.pub");

    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite (this changes your name)",
            key_path.display()
        );
    }

    std::fs::create_dir_all(&args.key_dir)
        .with_context(|| format!("failed to create {}", args.key_dir.display()))?;

    let keypair = SigilKeypair::generate();
    std::fs::write(&key_path, keypair.to_pkcs8_pem().context("key encoding")?)
        .with_context(|| format!("failed to write {}", key_path.display()))?;
    std::fs::write(
        &pub_path,
        keypair.public_key().to_pem().context("key encoding")?,
    )
    .with_context(|| format!("failed to write {}", pub_path.display()))?;
    restrict_permissions(&key_path)?;

    let identity = Identity::derive(&keypair.public_key()).context("identity derivation")?;
    println!("Client keypair written.");
    println!("  Signing key : {}", key_path.display());
    println!("  Public key  : {}", pub_path.display());
    println!("  Your name   : {identity}.<server domain>");
    Ok(())
}

/// Claims (or refreshes) the caller's name against a running server.
async fn client_register(args: &cli::ClientArgs) -> Result<()> {
    let (status, body) = submit_signed_request("POST", args).await?;
    println!("{body}");
    if status != 200 {
        bail!("registration failed with HTTP {status}");
    }
    Ok(())
}

/// Permanently revokes the caller's name.
async fn client_revoke(args: &cli::ClientArgs) -> Result<()> {
    let (status, body) = submit_signed_request("DELETE", args).await?;
    println!("{body}");
    if status != 200 {
        bail!("revocation failed with HTTP {status}");
    }
    Ok(())
}

/// The shared client flow: fetch a challenge, sign its ciphertext bytes,
/// submit signature + public key with the given method.
async fn submit_signed_request(method: &str, args: &cli::ClientArgs) -> Result<(u16, String)> {
    let pem = std::fs::read_to_string(&args.key)
        .with_context(|| format!("failed to read client key {}", args.key.display()))?;
    let keypair = SigilKeypair::from_pkcs8_pem(&pem)
        .with_context(|| format!("corrupt client key in {}", args.key.display()))?;

    let api_url = format!("{}/api", args.server.trim_end_matches('/'));

    let (status, body) = http::request_json("GET", &api_url, None).await?;
    if status != 200 {
        bail!("challenge request failed with HTTP {status}: {body}");
    }
    let challenge: serde_json::Value =
        serde_json::from_str(&body).context("server returned undecodable challenge body")?;
    let challenge = challenge["challenge"]
        .as_str()
        .context("server response is missing the challenge field")?
        .to_owned();

    let challenge_bytes = BASE64
        .decode(&challenge)
        .context("server returned undecodable challenge")?;
    let response = BASE64.encode(keypair.sign(&challenge_bytes).as_bytes());

    let request_body = serde_json::json!({
        "pub": keypair.public_key().to_pem().context("key encoding")?,
        "challenge": challenge,
        "response": response,
    });
    http::request_json(method, &api_url, Some(&request_body)).await
}

/// Tightens key files to owner-only on Unix; no-op elsewhere.
fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("sigil-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {PROTOCOL_VERSION}");
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
