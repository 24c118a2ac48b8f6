// src/config/models.rs
use crate::store::Project;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub request_log: RequestLogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.health_check.interval_secs == 0 {
            bail!("health_check.interval_secs must be greater than zero");
        }
        if self.health_check.timeout_secs == 0 {
            bail!("health_check.timeout_secs must be greater than zero");
        }
        if self.store.timeout_secs == 0 {
            bail!("store.timeout_secs must be greater than zero");
        }
        if self.request_log.timeout_secs == 0 {
            bail!("request_log.timeout_secs must be greater than zero");
        }
        if self.request_log.queue_capacity == 0 {
            bail!("request_log.queue_capacity must be greater than zero");
        }

        let mut keys = HashSet::new();
        for project in &self.projects {
            if project.project_id.is_empty() {
                bail!("project_id must not be empty");
            }
            if project.api_key.is_empty() {
                bail!("project {} has an empty api_key", project.project_id);
            }
            if !keys.insert(project.api_key.as_str()) {
                bail!("project {} reuses an api_key", project.project_id);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            timeout_secs: default_health_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_dependency_timeout")]
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dependency_timeout(),
        }
    }
}

/// Where completed request records are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    #[default]
    Stdout,
    File { path: PathBuf },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogDelivery {
    /// Append once the response body completes; failures are reported
    /// through the response capture.
    #[default]
    Direct,
    /// Hand off to a bounded queue drained by a writer task.
    Queued,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestLogConfig {
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub delivery: LogDelivery,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_dependency_timeout")]
    pub timeout_secs: u64,
}

impl RequestLogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            delivery: LogDelivery::default(),
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_dependency_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_dependency_timeout() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
