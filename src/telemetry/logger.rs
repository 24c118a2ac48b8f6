// src/telemetry/logger.rs
use super::{LogSink, RequestLogRecord, SinkError};
use crate::config::{LogDelivery, RequestLogConfig};
use crate::metrics::MetricsCollector;
use crate::proxy::ResponseCapture;
use hyper::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Clone)]
enum Delivery {
    Direct,
    Queued(mpsc::Sender<RequestLogRecord>),
}

/// Hands completed request records to the log sink.
#[derive(Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
    delivery: Delivery,
    timeout: Duration,
    metrics: Arc<MetricsCollector>,
    dropped: Arc<AtomicU64>,
}

impl RequestLogger {
    pub fn direct(sink: Arc<dyn LogSink>, timeout: Duration, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            sink,
            delivery: Delivery::Direct,
            timeout,
            metrics,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns the writer task; must be called inside a tokio runtime.
    pub fn queued(
        sink: Arc<dyn LogSink>,
        capacity: usize,
        timeout: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        tokio::spawn(drain(
            rx,
            sink.clone(),
            timeout,
            metrics.clone(),
            dropped.clone(),
        ));
        Self {
            sink,
            delivery: Delivery::Queued(tx),
            timeout,
            metrics,
            dropped,
        }
    }

    pub fn from_config(
        config: &RequestLogConfig,
        sink: Arc<dyn LogSink>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        match config.delivery {
            LogDelivery::Direct => Self::direct(sink, config.timeout(), metrics),
            LogDelivery::Queued => {
                Self::queued(sink, config.queue_capacity, config.timeout(), metrics)
            }
        }
    }

    /// Records dropped by the queue, either because it was full or because
    /// the sink refused them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn emit(&self, record: RequestLogRecord, capture: &ResponseCapture) {
        match &self.delivery {
            Delivery::Direct => {
                if let Err(e) = append(self.sink.as_ref(), &record, self.timeout).await {
                    self.metrics.log_sink_failures_total.inc();
                    // The backend status is already committed, so this only
                    // takes effect if nothing was written yet.
                    if capture.write_header(StatusCode::INTERNAL_SERVER_ERROR) {
                        error!(id = %record.response_log_id, "log sink failed before response: {}", e);
                    } else {
                        error!(
                            id = %record.response_log_id,
                            status = capture.status().as_u16(),
                            "log sink failed after response was sent: {}",
                            e
                        );
                    }
                }
            }
            Delivery::Queued(tx) => {
                if let Err(e) = tx.try_send(record) {
                    self.record_drop();
                    warn!("request log queue rejected record: {}", e);
                }
            }
        }
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.log_records_dropped_total.inc();
    }
}

/// Writer task for queued delivery. Stops once every logger handle is gone.
async fn drain(
    mut rx: mpsc::Receiver<RequestLogRecord>,
    sink: Arc<dyn LogSink>,
    timeout: Duration,
    metrics: Arc<MetricsCollector>,
    dropped: Arc<AtomicU64>,
) {
    debug!("request log writer started");
    while let Some(record) = rx.recv().await {
        if let Err(e) = append(sink.as_ref(), &record, timeout).await {
            metrics.log_sink_failures_total.inc();
            metrics.log_records_dropped_total.inc();
            dropped.fetch_add(1, Ordering::Relaxed);
            warn!(id = %record.response_log_id, "dropping request log record: {}", e);
        }
    }
    debug!("request log writer stopped");
}

async fn append(
    sink: &dyn LogSink,
    record: &RequestLogRecord,
    timeout: Duration,
) -> Result<(), SinkError> {
    match tokio::time::timeout(timeout, sink.append(record)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout),
    }
}
