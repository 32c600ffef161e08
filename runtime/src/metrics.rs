//! Prometheus metrics for the driver queue.
//!
//! This module provides metric collection for the queue service:
//! - Ticket issuance and rejections
//! - Batch calls
//! - Queue clears
//! - Partial failures of multi-step operations
//!
//! # Example
//!
//! ```rust,no_run
//! use driver_queue_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Scrape output for an HTTP handler
//! let _body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and renders the scrape body.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is served on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the scrape endpoint is meant to be served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "driver_queue_tickets_issued_total",
        "Total number of tickets issued"
    );
    describe_counter!(
        "driver_queue_issue_rejections_total",
        "Ticket requests rejected, by reason"
    );
    describe_counter!(
        "driver_queue_batch_calls_total",
        "Total number of successful batch calls"
    );
    describe_counter!(
        "driver_queue_tickets_called_total",
        "Total number of tickets moved to called"
    );
    describe_counter!(
        "driver_queue_queue_clears_total",
        "Total number of completed queue clears"
    );
    describe_counter!(
        "driver_queue_partial_failures_total",
        "Multi-step operations that stopped partway, by operation"
    );
    describe_histogram!(
        "driver_queue_operation_duration_seconds",
        "Time taken by queue service operations"
    );
}

/// Queue service metrics recorder.
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record an issued ticket.
    pub fn record_issued(duration: Duration) {
        counter!("driver_queue_tickets_issued_total").increment(1);
        Self::record_duration("issue_ticket", duration);
    }

    /// Record a rejected ticket request.
    pub fn record_rejection(reason: &'static str) {
        counter!("driver_queue_issue_rejections_total", "reason" => reason).increment(1);
    }

    /// Record a batch call that moved `called` tickets.
    pub fn record_batch_call(called: usize, duration: Duration) {
        counter!("driver_queue_batch_calls_total").increment(1);
        counter!("driver_queue_tickets_called_total").increment(called as u64);
        Self::record_duration("call_batch", duration);
    }

    /// Record a completed queue clear.
    pub fn record_clear(duration: Duration) {
        counter!("driver_queue_queue_clears_total").increment(1);
        Self::record_duration("clear_queue", duration);
    }

    /// Record a multi-step operation that stopped partway.
    pub fn record_partial_failure(operation: &'static str) {
        counter!("driver_queue_partial_failures_total", "operation" => operation).increment(1);
    }

    /// Record how long `operation` took.
    pub fn record_duration(operation: &'static str, duration: Duration) {
        histogram!("driver_queue_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}
