//! # DNS Server Runner
//!
//! Binds UDP and TCP on the resolver port and hands every request to the
//! protocol crate's [`NameResolver`]. Only started with the file-backed
//! store; the zone backend is served by the zone's own infrastructure.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;

use hickory_server::server::ServerFuture;
use sigil_protocol::resolver::NameResolver;

/// TCP connection timeout for DNS queries.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bind the sockets and serve until shutdown or fatal error.
pub async fn run(listen: SocketAddr, resolver: NameResolver) -> Result<()> {
    let mut server = ServerFuture::new(resolver);

    let udp = UdpSocket::bind(listen)
        .await
        .with_context(|| format!("UDP bind {listen}"))?;
    info!(addr = %listen, "DNS UDP socket bound");
    server.register_socket(udp);

    let tcp = TcpListener::bind(listen)
        .await
        .with_context(|| format!("TCP bind {listen}"))?;
    info!(addr = %listen, "DNS TCP listener bound");
    server.register_listener(tcp, TCP_TIMEOUT);

    server
        .block_until_done()
        .await
        .context("DNS server terminated")?;
    Ok(())
}
