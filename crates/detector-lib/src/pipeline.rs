//! One-sample detection pipeline
//!
//! normalize -> score -> decide -> append -> alert. The pipeline owns the
//! loaded model, the result log and the alert dispatcher; callers build it
//! once and run it per sample.

use std::time::Instant;

use crate::anomaly::{decide, should_alert, AlertDispatcher, DispatchOutcome, FaultAlert};
use crate::collector::MetricsSource;
use crate::error::Result;
use crate::models::{MetricsSample, Provider, RawVerdict, ResultRecord, Verdict};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::predictor::{auxiliary_value, normalize, AnomalyScorer};
use crate::sink::ResultLog;

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub raw: RawVerdict,
    pub verdict: Verdict,
    /// The record as it was appended to the log
    pub record: ResultRecord,
    /// Set when the verdict triggered an alert
    pub alert: Option<DispatchOutcome>,
}

pub struct Pipeline {
    provider: Provider,
    scorer: AnomalyScorer,
    log: ResultLog,
    dispatcher: AlertDispatcher,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
}

impl Pipeline {
    pub fn new(
        provider: Provider,
        scorer: AnomalyScorer,
        log: ResultLog,
        dispatcher: AlertDispatcher,
    ) -> Self {
        let metrics = DetectorMetrics::new();
        metrics.set_model_info(scorer.model_kind(), scorer.input_dim());
        Self {
            provider,
            scorer,
            log,
            dispatcher,
            metrics,
            logger: StructuredLogger::new(provider),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &DetectorMetrics {
        &self.metrics
    }

    /// Collect one sample from `source` and run it
    pub fn run_source(&mut self, source: &mut dyn MetricsSource) -> Result<Inference> {
        let sample = source.collect()?;
        self.run(&sample)
    }

    /// Run one sample through the pipeline.
    ///
    /// A schema mismatch returns before anything is logged. A failed append
    /// returns the I/O error and sends no alert. Alert failures are counted
    /// and reported in [`Inference::alert`] but never fail the run.
    pub fn run(&mut self, sample: &MetricsSample) -> Result<Inference> {
        let features = normalize(sample);

        let start = Instant::now();
        let raw = self.scorer.score(&features).inspect_err(|e| {
            if e.is_schema_mismatch() {
                self.metrics.inc_schema_mismatch();
            }
        })?;
        let latency_secs = start.elapsed().as_secs_f64();
        self.metrics.observe_inference_latency(latency_secs);

        let verdict = decide(raw);
        let record = ResultRecord {
            timestamp: self.log.next_timestamp(),
            verdict,
            features,
            auxiliary: auxiliary_value(sample, self.provider),
            provider: self.provider,
        };

        self.log
            .append(&record)
            .inspect_err(|_| self.metrics.inc_log_write_failure())?;
        self.metrics.inc_inference(verdict);
        self.logger.log_inference(&record, latency_secs);

        let alert = if should_alert(verdict) {
            self.logger.log_fault(&record);
            Some(self.send_alert(&record))
        } else {
            None
        };

        Ok(Inference {
            raw,
            verdict,
            record,
            alert,
        })
    }

    fn send_alert(&mut self, record: &ResultRecord) -> DispatchOutcome {
        let alert = FaultAlert::new(self.provider, &record.features, record.timestamp);
        let outcome = self.dispatcher.dispatch(&alert);
        match outcome {
            DispatchOutcome::Delivered => self.metrics.inc_alert_sent(),
            DispatchOutcome::Failed => {
                self.metrics.inc_alert_failure();
                self.logger.log_alert_failed(self.dispatcher.destination());
            }
        }
        outcome
    }
}
