// src/proxy/forwarder.rs
use super::capture::{CapturedBody, ResponseCapture};
use super::proxy::ProxyError;
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Body, Client, Request, Response, StatusCode, Uri, Version};
use hyper_tls::HttpsConnector;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;
use url::Url;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_REAL_IP: &str = "x-real-ip";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response on its way back to the caller, plus what is observed about it.
pub struct Forwarded {
    pub response: Response<Body>,
    pub capture: Arc<ResponseCapture>,
    /// Fires once the response body has been fully handed to the caller,
    /// or abandoned.
    pub completion: oneshot::Receiver<()>,
}

/// Relays requests to a chosen backend. No retries, no buffering.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    pub fn new() -> Self {
        let client = Client::builder().build(HttpsConnector::new());
        Self { client }
    }

    pub async fn forward(
        &self,
        req: Request<Body>,
        target: &Url,
        client_addr: SocketAddr,
    ) -> Result<Forwarded, ProxyError> {
        let (mut parts, body) = req.into_parts();

        let original_scheme = parts.uri.scheme_str().unwrap_or("http").to_string();
        let original_host = parts
            .headers
            .get(header::HOST)
            .cloned()
            .or_else(|| {
                parts
                    .uri
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            });

        parts.uri = outbound_uri(target, &parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        set_forwarding_headers(
            &mut parts.headers,
            &authority(target),
            &original_scheme,
            original_host,
            client_addr,
        )?;

        let outbound = Request::from_parts(parts, body);
        let (mut parts, body) = match self.client.request(outbound).await {
            Ok(response) => response.into_parts(),
            Err(e) => {
                warn!(backend = %target, "backend request failed: {}", e);
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response.into_parts()
            }
        };
        strip_hop_by_hop(&mut parts.headers);

        let capture = Arc::new(ResponseCapture::new());
        capture.write_header(parts.status);

        let (done_tx, done_rx) = oneshot::channel();
        let body = Body::wrap_stream(CapturedBody::new(body, capture.clone(), done_tx));

        Ok(Forwarded {
            response: Response::from_parts(parts, body),
            capture,
            completion: done_rx,
        })
    }
}

/// Accepts only absolute http(s) URLs with a host.
pub fn parse_backend_url(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw).map_err(|e| ProxyError::BackendUrlInvalid(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ProxyError::BackendUrlInvalid(raw.to_string())),
    }
}

fn authority(target: &Url) -> String {
    let host = target.host_str().unwrap_or_default();
    match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Backend scheme and authority, backend path joined with the inbound path,
/// both queries kept.
pub(crate) fn outbound_uri(target: &Url, inbound: &Uri) -> Result<Uri, ProxyError> {
    let path = join_paths(target.path(), inbound.path());
    let query = match (target.query(), inbound.query()) {
        (Some(t), Some(i)) if !t.is_empty() && !i.is_empty() => Some(format!("{t}&{i}")),
        (Some(t), _) if !t.is_empty() => Some(t.to_string()),
        (_, Some(i)) if !i.is_empty() => Some(i.to_string()),
        _ => None,
    };

    let mut uri = format!("{}://{}{}", target.scheme(), authority(target), path);
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(&query);
    }

    uri.parse()
        .map_err(|e| ProxyError::BackendUrlInvalid(format!("{uri}: {e}")))
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

pub(crate) fn set_forwarding_headers(
    headers: &mut HeaderMap,
    backend_authority: &str,
    original_scheme: &str,
    original_host: Option<HeaderValue>,
    client_addr: SocketAddr,
) -> Result<(), ProxyError> {
    let client_ip = client_addr.ip().to_string();

    let host = HeaderValue::from_str(backend_authority)
        .map_err(|_| ProxyError::BackendUrlInvalid(backend_authority.to_string()))?;
    headers.insert(header::HOST, host);

    let mut hops: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    hops.push(client_ip.as_str());
    let forwarded_for = hops.join(", ");
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    if let Ok(value) = HeaderValue::from_str(original_scheme) {
        headers.insert(X_FORWARDED_PROTO, value);
    }
    if let Some(value) = original_host {
        headers.insert(X_FORWARDED_HOST, value);
    }
    if let Ok(value) = HeaderValue::from_str(&client_ip) {
        headers.insert(X_REAL_IP, value);
    }

    Ok(())
}
