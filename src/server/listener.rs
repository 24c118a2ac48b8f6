// ────────────────────────────────
// src/server/listener.rs
// Encapsulates low-level TCP bind/accept.
// ────────────────────────────────
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    Ok(listener)
}
