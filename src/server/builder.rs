// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::listener::bind_tcp;
use anyhow::{anyhow, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tower::Service;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Builder so `main.rs` can inject how a connection's service is made.
pub struct ServerBuilder<F> {
    addr: SocketAddr,
    make_handler: Option<F>,
}

impl<F> ServerBuilder<F> {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            make_handler: None,
        }
    }

    /// Called once per accepted connection with the peer address.
    pub fn with_handler(mut self, make_handler: F) -> Self {
        self.make_handler = Some(make_handler);
        self
    }

    /// Accept connections until `shutdown` resolves, one task per connection.
    pub async fn serve_with_shutdown<H, S>(self, shutdown: S) -> Result<()>
    where
        F: Fn(SocketAddr) -> H,
        H: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
        H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        H::Future: Send + 'static,
        S: Future<Output = ()>,
    {
        let make_handler = self
            .make_handler
            .ok_or_else(|| anyhow!("handler must be set via with_handler()"))?;

        let listener = bind_tcp(self.addr).await?;
        tracing::info!("HTTP server listening on {}", self.addr);

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        if let Some(delay) = accept_backoff(&err) {
                            tokio::time::sleep(delay).await;
                        }
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    tracing::info!("HTTP server stopped accepting connections");
                    return Ok(());
                }
            };
            let svc = make_handler(peer);

            tokio::spawn(async move {
                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }
    }
}

/// Errors tied to a single connection are retried at once. Anything else
/// (e.g. out of file descriptors) would fail again immediately.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_ERROR_BACKOFF),
    }
}
