//! Metrics for observability and monitoring.
//!
//! The store and the HTTP client record through the `metrics` facade:
//!
//! - `store.actions.total`: actions dispatched
//! - `store.api.phases{phase}`: phase actions emitted
//! - `store.reducer.duration_seconds`: reducer execution time
//! - `http.requests.total{method}` / `http.responses.total{outcome}`
//! - `store.shutdown.*`: shutdown lifecycle
//!
//! Nothing is recorded anywhere until a recorder is installed.
//! [`PrometheusMetrics`] installs one and renders the text exposition format.
//!
//! # Example
//!
//! ```rust,no_run
//! use phasewire_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::install()?;
//! // ... run the store ...
//! if let Some(text) = metrics.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build the exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Register descriptions for every metric the crate records.
pub fn describe() {
    describe_counter!("store.actions.total", "Total number of actions dispatched to the store");
    describe_counter!(
        "store.api.phases",
        "Phase actions emitted for API calls, labelled by phase"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent reducing one action"
    );
    describe_counter!("http.requests.total", "HTTP requests sent, labelled by method");
    describe_counter!(
        "http.responses.total",
        "HTTP responses received, labelled by outcome"
    );
    describe_counter!("store.shutdown.initiated", "Graceful shutdowns started");
    describe_counter!("store.shutdown.completed", "Graceful shutdowns that finished in time");
    describe_counter!("store.shutdown.timeout", "Graceful shutdowns that timed out");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );
}

/// Prometheus recorder.
pub struct PrometheusMetrics {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl PrometheusMetrics {
    /// Register descriptions and install a global Prometheus recorder.
    ///
    /// If a recorder is already installed (e.g. by another test), metrics
    /// keep flowing to that one and [`render`](Self::render) returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        describe();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.000_01, 0.000_1, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            },
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(message))
                }
            },
        }
    }

    /// Handle of the installed recorder.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let _first = PrometheusMetrics::install().unwrap();
        let second = PrometheusMetrics::install().unwrap();

        assert!(second.handle().is_none());
    }

    #[test]
    fn rendered_output_contains_recorded_counters() {
        let recorder = PrometheusMetrics::install().unwrap();

        metrics::counter!("store.actions.total").increment(1);

        // Another test may own the recorder
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("store_actions_total"));
        }
    }
}
