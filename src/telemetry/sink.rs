// src/telemetry/sink.rs
use super::{LogSink, RequestLogRecord, SinkError};
use crate::config::SinkConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub async fn build_sink(config: &SinkConfig) -> Result<Arc<dyn LogSink>> {
    let sink: Arc<dyn LogSink> = match config {
        SinkConfig::Stdout => Arc::new(StdoutLogSink),
        SinkConfig::File { path } => Arc::new(
            FileLogSink::open(path)
                .await
                .with_context(|| format!("Failed to open request log {}", path.display()))?,
        ),
    };
    Ok(sink)
}

/// Writes one JSON document per line to stdout.
pub struct StdoutLogSink;

#[async_trait]
impl LogSink for StdoutLogSink {
    async fn append(&self, record: &RequestLogRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Appends JSON lines to a file.
pub struct FileLogSink {
    file: tokio::sync::Mutex<File>,
}

impl FileLogSink {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: tokio::sync::Mutex::new(file),
        })
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append(&self, record: &RequestLogRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps records in memory. Can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<RequestLogRecord>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<RequestLogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&self, record: &RequestLogRecord) -> Result<(), SinkError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SinkError::Rejected("sink is failing".to_string()));
        }
        self.records
            .lock()
            .map_err(|_| SinkError::Rejected("sink lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> RequestLogRecord {
        RequestLogRecord {
            response_log_id: "id-1".to_string(),
            project_id: "p1".to_string(),
            user_id: "u1".to_string(),
            method: "GET".to_string(),
            host: "proxy.local".to_string(),
            url_path: "/items".to_string(),
            query_params: "page=2".to_string(),
            client_ip: "10.1.1.1".to_string(),
            user_agent: "curl/8".to_string(),
            referer: String::new(),
            protocol: "HTTP/1.1".to_string(),
            status_code: 200,
            bytes_written: 12,
            content_type: "text/plain".to_string(),
            timestamp: Utc::now(),
            duration_ms: 3,
        }
    }

    #[tokio::test]
    async fn file_sink_appends_json_lines() {
        let path = std::env::temp_dir().join(format!("tenant-proxy-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = FileLogSink::open(&path).await.unwrap();
        sink.append(&record()).await.unwrap();
        sink.append(&record()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: RequestLogRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.url_path, "/items");

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn memory_sink_failing_mode() {
        let sink = MemoryLogSink::failing();
        assert!(sink.append(&record()).await.is_err());
        sink.set_failing(false);
        sink.append(&record()).await.unwrap();
        assert_eq!(sink.len(), 1);
    }
}
