// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::BackendRegistry;
use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct HealthChecker {
    config: HealthCheckConfig,
    registry: Arc<BackendRegistry>,
    client: Client,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        registry: Arc<BackendRegistry>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create health check HTTP client")?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            config,
            registry,
            client,
            metrics,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Runs until `shutdown` is called. The first pass happens one full
    /// interval after start.
    pub async fn start(self: Arc<Self>) {
        let period = self.config.interval();
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!("Starting health checker with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One full pass: probe every configured backend of every tenant, then
    /// replace each tenant's healthy set with the result.
    pub async fn check_all(&self) {
        let mut snapshots = Vec::new();
        for set in self.registry.all() {
            let configured = set.configured().await;
            if configured.is_empty() {
                debug!(tenant = set.tenant(), "no configured backends, skipping");
                continue;
            }
            snapshots.push((set, configured));
        }

        if snapshots.is_empty() {
            return;
        }

        // a backend shared by several tenants is probed once per pass
        let targets: HashSet<&String> = snapshots
            .iter()
            .flat_map(|(_, configured)| configured.iter())
            .collect();

        let results =
            futures::future::join_all(targets.into_iter().map(|url| self.check_backend(url)))
                .await;

        let mut healthy_count = 0;
        let mut unhealthy_count = 0;
        let mut status = HashMap::with_capacity(results.len());
        for result in results {
            if result.healthy {
                healthy_count += 1;
                debug!("Backend {} is healthy ({}ms)", result.backend, result.response_time_ms);
            } else {
                unhealthy_count += 1;
                warn!(
                    "Backend {} is unhealthy: {}",
                    result.backend,
                    result.error.as_deref().unwrap_or("unknown")
                );
            }
            status.insert(result.backend, result.healthy);
        }

        for (set, configured) in snapshots {
            let total = configured.len();
            let fresh: Vec<String> = configured
                .into_iter()
                .filter(|url| status.get(url).copied().unwrap_or(false))
                .collect();

            debug!(tenant = set.tenant(), "Healthy backends: {:?}", fresh);
            let published = set.publish_healthy(fresh).await;

            if let Some(metrics) = &self.metrics {
                metrics.update_backend_counts(set.tenant(), published, total);
            }
        }

        info!(
            "Health check complete: {} healthy, {} unhealthy",
            healthy_count, unhealthy_count
        );
    }

    /// Healthy means the GET completed in time with a status below 500.
    pub async fn check_backend(&self, url: &str) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = timeout(self.config.timeout(), self.client.get(url).send()).await;

        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, error) = match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.as_u16() < 500 {
                    (true, None)
                } else {
                    (false, Some(format!("HTTP {}", status)))
                }
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("Request timeout".to_string())),
        };

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(url, healthy);
        }

        HealthCheckResult {
            backend: url.to_string(),
            healthy,
            response_time_ms,
            error,
        }
    }
}
