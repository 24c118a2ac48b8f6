// src/store/mod.rs
mod memory;

pub use memory::InMemoryProjectStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tenant: one api key owning an ordered list of backend URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    pub user_id: String,
    pub api_key: String,
    #[serde(default)]
    pub backend_urls: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no project for the given api key")]
    NotFound,

    #[error("project store unavailable: {0}")]
    Unavailable(String),

    #[error("project store timed out")]
    Timeout,
}

/// Read side of the tenant store, as seen by the proxy.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Project, StoreError>;
}
