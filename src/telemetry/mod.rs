// src/telemetry/mod.rs
mod logger;
mod sink;

pub use logger::RequestLogger;
pub use sink::{build_sink, FileLogSink, MemoryLogSink, StdoutLogSink};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed proxied request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogRecord {
    pub response_log_id: String,
    pub project_id: String,
    pub user_id: String,
    pub method: String,
    pub host: String,
    pub url_path: String,
    pub query_params: String,
    pub client_ip: String,
    pub user_agent: String,
    pub referer: String,
    pub protocol: String,
    pub status_code: u16,
    pub bytes_written: u64,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log sink write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("log record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("log sink rejected record: {0}")]
    Rejected(String),

    #[error("log sink timed out")]
    Timeout,
}

/// Destination for request log records.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, record: &RequestLogRecord) -> Result<(), SinkError>;
}
