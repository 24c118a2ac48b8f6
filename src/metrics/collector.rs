// src/metrics/collector.rs
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub response_size_bytes: HistogramVec,
    pub rejections_total: IntCounterVec,

    // Backend metrics
    pub backend_health_status: IntGaugeVec,
    pub healthy_backends: IntGaugeVec,
    pub configured_backends: IntGaugeVec,

    // Request log delivery
    pub log_records_dropped_total: IntCounter,
    pub log_sink_failures_total: IntCounter,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Total number of proxied requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "proxy_request_duration_seconds",
                "Proxied request duration in seconds",
            ),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let response_size_bytes = HistogramVec::new(
            HistogramOpts::new(
                "proxy_response_size_bytes",
                "Response size in bytes",
            )
            .buckets(prometheus::exponential_buckets(64.0, 4.0, 10)?),
            &["method"],
        )?;
        registry.register(Box::new(response_size_bytes.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "proxy_rejections_total",
                "Requests rejected before reaching a backend",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "proxy_backend_health_status",
                "Backend health status (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let healthy_backends = IntGaugeVec::new(
            Opts::new("proxy_healthy_backends", "Healthy backends per tenant"),
            &["tenant"],
        )?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let configured_backends = IntGaugeVec::new(
            Opts::new("proxy_configured_backends", "Configured backends per tenant"),
            &["tenant"],
        )?;
        registry.register(Box::new(configured_backends.clone()))?;

        let log_records_dropped_total = IntCounter::new(
            "proxy_log_records_dropped_total",
            "Request log records that were never written",
        )?;
        registry.register(Box::new(log_records_dropped_total.clone()))?;

        let log_sink_failures_total = IntCounter::new(
            "proxy_log_sink_failures_total",
            "Failed request log sink appends",
        )?;
        registry.register(Box::new(log_sink_failures_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            response_size_bytes,
            rejections_total,
            backend_health_status,
            healthy_backends,
            configured_backends,
            log_records_dropped_total,
            log_sink_failures_total,
        })
    }

    pub fn record_request(
        &self,
        method: &str,
        status_code: u16,
        bytes: u64,
        duration: Duration,
    ) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, &status])
            .observe(duration.as_secs_f64());

        self.response_size_bytes
            .with_label_values(&[method])
            .observe(bytes as f64);
    }

    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        let value = if healthy { 1 } else { 0 };
        self.backend_health_status
            .with_label_values(&[backend])
            .set(value);
    }

    pub fn update_backend_counts(&self, tenant: &str, healthy: usize, configured: usize) {
        self.healthy_backends
            .with_label_values(&[tenant])
            .set(healthy as i64);
        self.configured_backends
            .with_label_values(&[tenant])
            .set(configured as i64);
    }
}
