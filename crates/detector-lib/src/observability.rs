//! Observability infrastructure for the fault detector
//!
//! Provides:
//! - Prometheus metrics (inference latency, verdict counts, alert and log failures)
//! - Structured JSON logging with tracing

use crate::models::{Provider, ResultRecord, Verdict};
use anyhow::Context;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    inference_latency_seconds: Histogram,
    inferences: IntCounterVec,
    schema_mismatches: IntCounter,
    alerts_sent: IntCounter,
    alert_failures: IntCounter,
    log_write_failures: IntCounter,
    model_info: GaugeVec,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram!(
                "fault_detector_inference_latency_seconds",
                "Time spent scoring one feature vector",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            inferences: register_int_counter_vec!(
                "fault_detector_inferences_total",
                "Completed inferences by verdict",
                &["verdict"]
            )
            .expect("Failed to register inferences_total"),

            schema_mismatches: register_int_counter!(
                "fault_detector_schema_mismatches_total",
                "Feature vectors rejected for a width mismatch"
            )
            .expect("Failed to register schema_mismatches_total"),

            alerts_sent: register_int_counter!(
                "fault_detector_alerts_sent_total",
                "Fault alerts accepted by the transport"
            )
            .expect("Failed to register alerts_sent_total"),

            alert_failures: register_int_counter!(
                "fault_detector_alert_failures_total",
                "Fault alerts the transport failed to publish"
            )
            .expect("Failed to register alert_failures_total"),

            log_write_failures: register_int_counter!(
                "fault_detector_log_write_failures_total",
                "Result records lost to a failed log append"
            )
            .expect("Failed to register log_write_failures_total"),

            model_info: register_gauge_vec!(
                "fault_detector_model_info",
                "Information about the loaded anomaly model",
                &["kind", "input_dim"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Handle to the process-wide detector metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new)
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn inc_inference(&self, verdict: Verdict) {
        self.inner()
            .inferences
            .with_label_values(&[verdict.label()])
            .inc();
    }

    pub fn inc_schema_mismatch(&self) {
        self.inner().schema_mismatches.inc();
    }

    pub fn inc_alert_sent(&self) {
        self.inner().alerts_sent.inc();
    }

    pub fn inc_alert_failure(&self) {
        self.inner().alert_failures.inc();
    }

    pub fn inc_log_write_failure(&self) {
        self.inner().log_write_failures.inc();
    }

    /// Replace the loaded-model info series
    pub fn set_model_info(&self, kind: &str, input_dim: usize) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[kind, &input_dim.to_string()])
            .set(1.0);
    }

    pub fn inferences(&self, verdict: Verdict) -> u64 {
        self.inner()
            .inferences
            .with_label_values(&[verdict.label()])
            .get()
    }

    pub fn schema_mismatches(&self) -> u64 {
        self.inner().schema_mismatches.get()
    }

    pub fn alerts_sent(&self) -> u64 {
        self.inner().alerts_sent.get()
    }

    pub fn alert_failures(&self) -> u64 {
        self.inner().alert_failures.get()
    }

    pub fn log_write_failures(&self) -> u64 {
        self.inner().log_write_failures.get()
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render_text(&self) -> anyhow::Result<String> {
        let families = prometheus::gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .context("Failed to encode metrics")?;
        String::from_utf8(buf).context("Metrics text is not UTF-8")
    }

    /// Write a snapshot for a node-exporter textfile collector.
    ///
    /// The snapshot goes to a sibling temp file first and is renamed into
    /// place, so a scraper never sees a partial file.
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        let text = self.render_text()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, text)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
        Ok(())
    }
}

/// Structured logger for detector events
///
/// Emits the canonical JSON events for startup, inferences, faults,
/// failed alerts and shutdown.
#[derive(Clone)]
pub struct StructuredLogger {
    provider: Provider,
}

impl StructuredLogger {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }

    pub fn log_startup(&self, version: &str, model_kind: &str, model_path: &Path) {
        info!(
            event = "startup",
            provider = %self.provider,
            detector_version = %version,
            model_kind = %model_kind,
            model_path = %model_path.display(),
            "Fault detector started"
        );
    }

    pub fn log_inference(&self, record: &ResultRecord, latency_secs: f64) {
        info!(
            event = "inference_completed",
            provider = %self.provider,
            verdict = %record.verdict,
            timestamp = %record.timestamp.to_rfc3339(),
            latency_secs = latency_secs,
            "Inference completed"
        );
    }

    pub fn log_fault(&self, record: &ResultRecord) {
        warn!(
            event = "fault_detected",
            provider = %self.provider,
            timestamp = %record.timestamp.to_rfc3339(),
            metrics = ?record.features.as_array(),
            auxiliary = record.auxiliary,
            "Serverless function fault detected"
        );
    }

    pub fn log_alert_failed(&self, destination: &str) {
        warn!(
            event = "alert_failed",
            provider = %self.provider,
            destination = %destination,
            "Fault alert was not delivered; the result was still logged"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "shutdown",
            provider = %self.provider,
            reason = %reason,
            "Fault detector shutting down"
        );
    }
}
