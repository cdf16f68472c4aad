//! Prometheus metrics for the release ingestion pipeline
//!
//! This module provides metrics tracking for:
//! - Fetching: per-source fetch duration, project outcomes, new releases
//! - Notifications: delivery outcomes per channel
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct PipelineMetrics {
    fetch_duration: HistogramVec,
    projects_checked: CounterVec,
    new_releases: CounterVec,
    deliveries: CounterVec,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Outcome label for a checked project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Upstream answered; zero or more releases stored
    Success,
    /// Upstream does not know the project
    NotFound,
    /// The project was aborted
    Failed,
}

impl FetchOutcome {
    /// Get label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = relmon::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        fetch_duration: register_histogram_vec!(
            "relmon_fetch_duration_seconds",
            "Time spent fetching and storing one project's releases",
            &["source"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
        projects_checked: register_counter_vec!(
            "relmon_projects_checked_total",
            "Projects checked by source and outcome",
            &["source", "outcome"]
        )?,
        new_releases: register_counter_vec!(
            "relmon_new_releases_total",
            "Newly stored releases by source",
            &["source"]
        )?,
        deliveries: register_counter_vec!(
            "relmon_deliveries_total",
            "Notification deliveries by channel and outcome",
            &["channel", "outcome"]
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a fetch timer for one project (records on drop)
pub fn start_fetch_timer(source: &str) -> MetricsTimer {
    match PIPELINE_METRICS.get() {
        Some(m) => MetricsTimer::new(m.fetch_duration.with_label_values(&[source]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

/// Record the outcome of checking one project
pub fn record_project_checked(source: &str, outcome: FetchOutcome) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.projects_checked
            .with_label_values(&[source, outcome.as_str()])
            .inc();
    }
}

/// Record newly stored releases
pub fn record_new_releases(source: &str, count: usize) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    if count > 0 {
        m.new_releases
            .with_label_values(&[source])
            .inc_by(count as f64);
    }
}

/// Record a notification delivery
pub fn record_delivery(channel: &str, success: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        let outcome = if success { "success" } else { "failure" };
        m.deliveries.with_label_values(&[channel, outcome]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
