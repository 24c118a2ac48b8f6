// ────────────────────────────────
// src/proxy/proxy.rs
// Per-request flow: resolve tenant, pick a backend, forward, log.
// ────────────────────────────────

use super::forwarder::{parse_backend_url, Forwarded, Forwarder};
use super::pool::BackendRegistry;
use crate::metrics::MetricsCollector;
use crate::store::{Project, ProjectStore, StoreError};
use crate::telemetry::{RequestLogRecord, RequestLogger};
use chrono::Utc;
use hyper::header::{self, HeaderValue};
use hyper::{Body, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct Proxy {
    store: Arc<dyn ProjectStore>,
    registry: Arc<BackendRegistry>,
    forwarder: Forwarder,
    logger: RequestLogger,
    metrics: Arc<MetricsCollector>,
    store_timeout: Duration,
}

impl Proxy {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        registry: Arc<BackendRegistry>,
        logger: RequestLogger,
        metrics: Arc<MetricsCollector>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            forwarder: Forwarder::new(),
            logger,
            metrics,
            store_timeout,
        }
    }

    /// Handle one inbound request. Rejections become short JSON error
    /// responses; everything else is the backend's own response.
    pub async fn handle(&self, req: Request<Body>, client_addr: SocketAddr) -> Response<Body> {
        match self.proxy_request(req, client_addr).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_rejection(e.code());
                if e.status().is_server_error() {
                    warn!(%client_addr, "request rejected: {}", e);
                } else {
                    debug!(%client_addr, "request rejected: {}", e);
                }
                e.into()
            }
        }
    }

    async fn proxy_request(
        &self,
        req: Request<Body>,
        client_addr: SocketAddr,
    ) -> Result<Response<Body>, ProxyError> {
        let api_key = match req.headers().get(API_KEY_HEADER) {
            None => return Err(ProxyError::MissingApiKey),
            Some(value) => value
                .to_str()
                .map_err(|_| ProxyError::InvalidApiKey)?
                .to_string(),
        };
        if api_key.is_empty() {
            return Err(ProxyError::MissingApiKey);
        }

        let project = self.resolve(&api_key).await?;

        let backends = self.registry.tenant(&project.project_id);
        backends.refresh(&project.backend_urls).await;

        let selected = backends
            .select_next()
            .await
            .ok_or(ProxyError::NoHealthyBackends)?;
        let target = parse_backend_url(&selected)?;

        info!(
            "Proxying request {} {} -> {}",
            req.method(),
            req.uri().path(),
            target
        );

        let meta = RequestMeta::from_request(&req, client_addr);
        let start = Instant::now();
        let forwarded = self.forwarder.forward(req, &target, client_addr).await?;
        Ok(self.finish(project, meta, start, forwarded))
    }

    async fn resolve(&self, api_key: &str) -> Result<Project, ProxyError> {
        match tokio::time::timeout(self.store_timeout, self.store.find_by_api_key(api_key)).await {
            Ok(Ok(project)) => Ok(project),
            Ok(Err(StoreError::NotFound)) => Err(ProxyError::InvalidApiKey),
            Ok(Err(e)) => Err(ProxyError::Store(e)),
            Err(_) => Err(ProxyError::Store(StoreError::Timeout)),
        }
    }

    /// Hand the response back and record the request once its body is done.
    fn finish(
        &self,
        project: Project,
        meta: RequestMeta,
        start: Instant,
        forwarded: Forwarded,
    ) -> Response<Body> {
        let Forwarded {
            response,
            capture,
            completion,
        } = forwarded;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let logger = self.logger.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            // the sender only goes away once the body is finished or dropped
            let _ = completion.await;
            let duration = start.elapsed();
            let status = capture.status();
            let bytes = capture.bytes_written();

            metrics.record_request(&meta.method, status.as_u16(), bytes, duration);
            info!(
                "host={} method={} path={} status={} bytes={} duration_ms={}ms",
                meta.host,
                meta.method,
                meta.path,
                status.as_u16(),
                bytes,
                duration.as_millis()
            );

            let record = meta.into_record(&project, status, bytes, content_type, duration);
            logger.emit(record, &capture).await;
        });

        response
    }
}

/// Request attributes captured before the request is handed to the backend.
struct RequestMeta {
    method: String,
    host: String,
    path: String,
    query: String,
    client_ip: String,
    user_agent: String,
    referer: String,
    protocol: String,
}

impl RequestMeta {
    fn from_request(req: &Request<Body>, client_addr: SocketAddr) -> Self {
        let header_str = |name: header::HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v: &HeaderValue| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let host = req
            .uri()
            .host()
            .map(str::to_string)
            .unwrap_or_else(|| header_str(header::HOST));

        Self {
            method: req.method().to_string(),
            host,
            path: req.uri().path().to_string(),
            query: req.uri().query().unwrap_or_default().to_string(),
            client_ip: client_addr.ip().to_string(),
            user_agent: header_str(header::USER_AGENT),
            referer: header_str(header::REFERER),
            protocol: format!("{:?}", req.version()),
        }
    }

    fn into_record(
        self,
        project: &Project,
        status: StatusCode,
        bytes_written: u64,
        content_type: String,
        duration: Duration,
    ) -> RequestLogRecord {
        RequestLogRecord {
            response_log_id: Uuid::new_v4().to_string(),
            project_id: project.project_id.clone(),
            user_id: project.user_id.clone(),
            method: self.method,
            host: self.host,
            url_path: self.path,
            query_params: self.query,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            referer: self.referer,
            protocol: self.protocol,
            status_code: status.as_u16(),
            bytes_written,
            content_type,
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Missing X-API-KEY header")]
    MissingApiKey,

    #[error("Invalid API-KEY")]
    InvalidApiKey,

    #[error("Error getting project: {0}")]
    Store(StoreError),

    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Bad backend URL: {0}")]
    BackendUrlInvalid(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingApiKey | ProxyError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Store(_) | ProxyError::BackendUrlInvalid(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable reason string exposed to callers and used as a metric label.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::MissingApiKey => "missing_api_key",
            ProxyError::InvalidApiKey => "invalid_api_key",
            ProxyError::Store(_) => "store_error",
            ProxyError::NoHealthyBackends => "no_healthy_backends",
            ProxyError::BackendUrlInvalid(_) => "bad_backend_url",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::MissingApiKey => "Missing X-API-KEY header",
            ProxyError::InvalidApiKey => "Invalid API-KEY",
            ProxyError::Store(_) => "Error getting project",
            ProxyError::NoHealthyBackends => "No healthy backends available",
            ProxyError::BackendUrlInvalid(_) => "Bad backend URL",
        }
    }
}

// Details stay in the server log; callers only see code and short message.
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        error_response(err.status(), err.code(), err.public_message())
    }
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Body> {
    json_response(
        status,
        &serde_json::json!({ "error": code, "message": message }),
    )
}

pub(crate) fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
