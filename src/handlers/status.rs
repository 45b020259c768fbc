//! Status and health check handlers.
//!
//! - `/health` - liveness check
//! - `/ready` - readiness check
//! - `/status` - runtime counters, memory and latency percentiles
//!
//! # Architecture
//!
//! ```text
//! HTTP Request ──> track_latency ──> Router ──> handler
//!                       │                          │
//!                       ▼                          ▼
//!               LatencyHistogram          ServiceMetrics counters
//!                       └──────────┬───────────────┘
//!                                  ▼
//!                         GET /status (JSON)
//! ```
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "name": "saaskit-web",
//!   "uptime_seconds": 3600,
//!   "requests": { "total": 5000, "server_errors": 2, "throttled": 17 },
//!   "webhooks": { "processed": 40, "ignored": 12, "rejected": 1, "failed": 0 },
//!   "memory": { "rss_bytes": 52428800, "virtual_bytes": 268435456 },
//!   "latency": { "p50_ms": 1.2, "p95_ms": 4.5, "p99_ms": 9.8, "total_requests": 5000, "mean_ms": 1.6, "max_ms": 25.0 },
//!   "status": "running",
//!   "timestamp": "2026-01-01T12:00:00Z"
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use crate::app::AppState;
use crate::stripe::{ReconcileOutcome, StripeWebhookError};

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for liveness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Detailed server status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub name: String,
    pub uptime_seconds: u64,
    pub requests: RequestCounters,
    pub webhooks: WebhookCounters,
    pub memory: MemoryMetrics,
    pub latency: LatencyMetrics,
    /// Always "running" if responding
    pub status: String,
    /// RFC 3339 time the status was generated
    pub timestamp: String,
}

/// HTTP request counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounters {
    pub total: u64,
    /// Responses with a 5xx status
    pub server_errors: u64,
    /// Requests refused by the rate limiter
    pub throttled: u64,
}

/// Webhook delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCounters {
    /// Acknowledged deliveries that wrote a subscription record
    pub processed: u64,
    /// Acknowledged deliveries that changed nothing
    pub ignored: u64,
    /// Signature or payload failures (400)
    pub rejected: u64,
    /// Storage failures the provider will retry (503)
    pub failed: u64,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size (bytes)
    pub rss_bytes: u64,
    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,
}

/// Request latency percentile metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub total_requests: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram.
///
/// Tracks latencies from 1 microsecond to 60 seconds with 3 significant
/// figures of precision.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("static histogram bounds are valid");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency in microseconds; values outside the bounds are dropped
    pub fn record(&self, latency_us: u64) {
        let _ = self.inner.write().record(latency_us);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX));
    }

    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Percentiles converted to milliseconds
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Service Metrics
// ============================================================================

/// Process-wide counters behind `/status`.
///
/// Each recording also emits a `metrics` counter, which is a no-op unless the
/// binary installs a recorder.
#[derive(Debug)]
pub struct ServiceMetrics {
    start_time: Instant,
    latency: LatencyHistogram,
    total_requests: AtomicU64,
    server_errors: AtomicU64,
    throttled: AtomicU64,
    webhooks_processed: AtomicU64,
    webhooks_ignored: AtomicU64,
    webhooks_rejected: AtomicU64,
    webhooks_failed: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latency: LatencyHistogram::new(),
            total_requests: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            webhooks_processed: AtomicU64::new(0),
            webhooks_ignored: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            webhooks_failed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record one completed request
    pub fn record_request(&self, duration: Duration, status: StatusCode) {
        self.latency.record_duration(duration);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request refused by the rate limiter
    pub fn record_throttled(&self, route: &'static str) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("saaskit_requests_throttled_total", "route" => route).increment(1);
    }

    /// Record an acknowledged webhook delivery
    pub fn record_webhook_ack(&self, outcome: &ReconcileOutcome) {
        let counter = if outcome.mutated() {
            &self.webhooks_processed
        } else {
            &self.webhooks_ignored
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("saaskit_webhook_events_total", "outcome" => outcome.as_str())
            .increment(1);
    }

    /// Record a refused webhook delivery
    pub fn record_webhook_error(&self, err: &StripeWebhookError) {
        let (counter, outcome) = if matches!(err, StripeWebhookError::Storage(_)) {
            (&self.webhooks_failed, "failed")
        } else {
            (&self.webhooks_rejected, "rejected")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("saaskit_webhook_events_total", "outcome" => outcome).increment(1);
    }

    pub fn requests(&self) -> RequestCounters {
        RequestCounters {
            total: self.total_requests.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }

    pub fn webhooks(&self) -> WebhookCounters {
        WebhookCounters {
            processed: self.webhooks_processed.load(Ordering::Relaxed),
            ignored: self.webhooks_ignored.load(Ordering::Relaxed),
            rejected: self.webhooks_rejected.load(Ordering::Relaxed),
            failed: self.webhooks_failed.load(Ordering::Relaxed),
        }
    }

    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency.metrics()
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect memory metrics for the current process.
///
/// Returns zeros if the process cannot be found.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Times every request into [`ServiceMetrics`]
pub async fn track_latency(
    State(metrics): State<Arc<ServiceMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    metrics.record_request(started.elapsed(), response.status());
    response
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /ready`
///
/// The stores are in-process, so a responding server is ready.
#[instrument(skip_all)]
pub async fn readiness_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = &state.metrics;

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: metrics.uptime_seconds(),
        requests: metrics.requests(),
        webhooks: metrics.webhooks(),
        memory: collect_memory_metrics(),
        latency: metrics.latency_metrics(),
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_latency_histogram() {
        let histogram = LatencyHistogram::new();
        for us in [1000, 2000, 5000, 10000, 50000] {
            histogram.record(us);
        }

        assert_eq!(histogram.count(), 5);
        let metrics = histogram.metrics();
        assert!(metrics.p50_ms > 0.0);
        assert!(metrics.p95_ms >= metrics.p50_ms);
        assert!(metrics.p99_ms >= metrics.p95_ms);
        // HDR bucketing may round the max up slightly
        assert!((50.0..=51.0).contains(&metrics.max_ms));
    }

    #[test]
    fn test_request_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_request(Duration::from_millis(3), StatusCode::OK);
        metrics.record_request(Duration::from_millis(4), StatusCode::INTERNAL_SERVER_ERROR);
        metrics.record_throttled("projects");

        assert_eq!(
            metrics.requests(),
            RequestCounters {
                total: 2,
                server_errors: 1,
                throttled: 1,
            }
        );
        assert_eq!(metrics.latency_metrics().total_requests, 2);
    }

    #[test]
    fn test_webhook_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_webhook_ack(&ReconcileOutcome::Upserted { user_id: "u1".into() });
        metrics.record_webhook_ack(&ReconcileOutcome::Unhandled {
            event_type: "invoice.paid".into(),
        });
        metrics.record_webhook_error(&StripeWebhookError::SignatureMismatch);
        metrics.record_webhook_error(&StripeWebhookError::Storage(StoreError::Unavailable(
            "down".into(),
        )));

        assert_eq!(
            metrics.webhooks(),
            WebhookCounters {
                processed: 1,
                ignored: 1,
                rejected: 1,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_collect_memory_metrics() {
        let metrics = collect_memory_metrics();
        assert!(metrics.rss_bytes > 0);
    }

    #[test]
    fn test_server_constants() {
        assert_eq!(SERVER_NAME, "saaskit-web");
        assert!(!SERVER_VERSION.is_empty());
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_metrics_thread_safety() {
        use std::thread;

        let metrics = Arc::new(ServiceMetrics::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_request(Duration::from_micros(500), StatusCode::OK);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(metrics.requests().total, 10_000);
    }
}
