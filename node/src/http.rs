//! # Minimal HTTP Client
//!
//! Just enough HTTP/1.1 to drive the registration API from the CLI
//! commands, without pulling a full HTTP client into the dependency tree
//! for three requests. Plain `http://` only; put a reverse proxy in front
//! of the node if you need TLS on the wire.

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Perform a request with an optional JSON body against `url`, returning
/// `(status_code, body)`.
pub async fn request_json(
    method: &str,
    url: &str,
    body: Option<&serde_json::Value>,
) -> Result<(u16, String)> {
    let parsed: Url = url.parse().map_err(|e| anyhow!("invalid URL: {e}"))?;

    let addr = format!("{}:{}", parsed.host, parsed.port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;

    let payload = body.map(serde_json::to_string).transpose()?;
    let mut request = format!(
        "{method} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        parsed.path, parsed.host,
    );
    if let Some(payload) = &payload {
        request.push_str("Content-Type: application/json\r\n");
        request.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    }
    request.push_str("\r\n");
    if let Some(payload) = &payload {
        request.push_str(payload);
    }

    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let response = String::from_utf8_lossy(&raw);

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow!("malformed HTTP response from {addr}"))?;

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_owned())
        .unwrap_or_default();

    Ok((status, body))
}

/// The handful of URL fields we need. Scheme `https://` is accepted in the
/// input but still spoken as plain HTTP; the node itself never serves TLS.
struct Url {
    host: String,
    port: u16,
    path: String,
}

impl std::str::FromStr for Url {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("http://")
            .or_else(|| s.strip_prefix("https://"))
            .unwrap_or(s);

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err("missing host".into());
        }

        let (host, port) = match authority.rfind(':') {
            Some(i) => {
                let port = authority[i + 1..]
                    .parse::<u16>()
                    .map_err(|e| format!("bad port: {e}"))?;
                (authority[..i].to_owned(), port)
            }
            None => (authority.to_owned(), 80),
        };

        Ok(Url {
            host,
            port,
            path: path.to_owned(),
        })
    }
}
