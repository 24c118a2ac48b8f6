// src/proxy/directory.rs
use super::forwarder::parse_backend_url;
use super::proxy::{error_response, json_response};
use dashmap::DashMap;
use hyper::{Body, Response, StatusCode, Uri};
use url::Url;

/// Named backend URLs registered through `/register`.
///
/// Kept apart from tenant routing: nothing in the proxy path reads it.
#[derive(Debug, Default)]
pub struct BackendDirectory {
    entries: DashMap<String, Url>,
}

impl BackendDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the URL previously registered under `name`, if any.
    pub fn register(&self, name: impl Into<String>, url: Url) -> Option<Url> {
        self.entries.insert(name.into(), url)
    }

    pub fn get(&self, name: &str) -> Option<Url> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `GET /register?name=<id>&url=<url>`
    pub fn handle_register(&self, uri: &Uri) -> Response<Body> {
        let mut name = None;
        let mut raw_url = None;
        for (key, value) in url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "name" => {
                    name.get_or_insert_with(|| value.into_owned());
                }
                "url" => {
                    raw_url.get_or_insert_with(|| value.into_owned());
                }
                _ => {}
            }
        }

        let (name, raw_url) = match (name, raw_url) {
            (Some(name), Some(raw_url)) if !name.is_empty() && !raw_url.is_empty() => {
                (name, raw_url)
            }
            _ => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "missing_parameters",
                    "No name or url found",
                )
            }
        };

        let url = match parse_backend_url(&raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(%name, "rejecting registration: {}", e);
                return e.into();
            }
        };

        tracing::info!(%name, %url, "registered backend");
        let body = serde_json::json!({ "name": name, "url": url.as_str() });
        self.register(name, url);
        json_response(StatusCode::OK, &body)
    }
}
