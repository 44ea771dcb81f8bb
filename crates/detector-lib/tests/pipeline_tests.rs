//! End-to-end tests for the detection pipeline
//!
//! These drive a full normalize/score/decide/append/alert cycle against a
//! scratch result log, with a small in-test model and transport.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use detector_lib::anomaly::{AlertDispatcher, AlertTransport, DispatchOutcome, FaultAlert};
use detector_lib::collector::JsonSource;
use detector_lib::predictor::{AnomalyModel, AnomalyScorer, IsolationForest};
use detector_lib::sink::{read_log, ResultLog};
use detector_lib::{DetectorError, MetricsSample, Pipeline, Provider, RawVerdict, Verdict};
use tempfile::TempDir;

/// Flags samples whose error count exceeds their invocation count
struct ErrorRatioModel {
    input_dim: usize,
}

impl AnomalyModel for ErrorRatioModel {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn predict(&self, features: &[f64]) -> detector_lib::Result<RawVerdict> {
        let invocations = features[2];
        let errors = features[3];
        if errors > invocations.max(1.0) {
            Ok(RawVerdict::Outlier)
        } else {
            Ok(RawVerdict::Inlier)
        }
    }

    fn kind(&self) -> &str {
        "error_ratio"
    }
}

#[derive(Default)]
struct Calls {
    subscribe: AtomicUsize,
    publish: AtomicUsize,
}

struct CountingTransport {
    calls: Arc<Calls>,
    fail: bool,
}

impl AlertTransport for CountingTransport {
    fn subscribers(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn subscribe(&self, _destination: &str) -> anyhow::Result<()> {
        self.calls.subscribe.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn publish(&self, _alert: &FaultAlert) -> anyhow::Result<()> {
        self.calls.publish.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("alert endpoint unreachable");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct Harness {
    _dir: TempDir,
    log_path: std::path::PathBuf,
    calls: Arc<Calls>,
    pipeline: Pipeline,
}

fn harness(provider: Provider, input_dim: usize, fail_alerts: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("results_log.txt");
    let calls = Arc::new(Calls::default());
    let transport = CountingTransport {
        calls: calls.clone(),
        fail: fail_alerts,
    };
    let pipeline = Pipeline::new(
        provider,
        AnomalyScorer::new(Box::new(ErrorRatioModel { input_dim })),
        ResultLog::new(&log_path),
        AlertDispatcher::new(Box::new(transport), "arn:aws:sns:fault-alerts"),
    );
    Harness {
        _dir: dir,
        log_path,
        calls,
        pipeline,
    }
}

#[test]
fn test_empty_sample_logs_no_fault() {
    let mut h = harness(Provider::Aws, 9, false);

    let inference = h.pipeline.run(&MetricsSample::new()).unwrap();
    assert_eq!(inference.raw, RawVerdict::Inlier);
    assert_eq!(inference.verdict, Verdict::NoFault);
    assert!(inference.alert.is_none());

    let text = fs::read_to_string(&h.log_path).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.trim_end().ends_with(",NoFault,0,0,0,0,0,0,0,0,0,0,AWS"));
    assert_eq!(h.calls.publish.load(Ordering::SeqCst), 0);
    assert_eq!(h.calls.subscribe.load(Ordering::SeqCst), 0);
}

#[test]
fn test_high_error_ratio_alerts_once() {
    let mut h = harness(Provider::Aws, 9, false);
    let sample = MetricsSample::new()
        .with("Errors", 50.0)
        .with("Invocations", 10.0);

    let inference = h.pipeline.run(&sample).unwrap();
    assert_eq!(inference.verdict, Verdict::FaultDetected);
    assert_eq!(inference.alert, Some(DispatchOutcome::Delivered));
    assert_eq!(h.calls.publish.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.subscribe.load(Ordering::SeqCst), 1);
    assert_eq!(h.pipeline.dispatcher().attempts(), 1);

    let report = read_log(&h.log_path).unwrap();
    assert_eq!(report.entries.len(), 1);
    let entry = &report.entries[0];
    assert!(entry.is_fault());
    assert_eq!(entry.metrics[2], 10.0);
    assert_eq!(entry.metrics[3], 50.0);
    assert_eq!(entry.timestamp, inference.record.timestamp);
}

#[test]
fn test_repeated_faults_are_not_deduplicated() {
    let mut h = harness(Provider::Gcp, 9, false);
    let sample = MetricsSample::new().with("Errors", 5.0);

    for _ in 0..3 {
        h.pipeline.run(&sample).unwrap();
    }
    assert_eq!(h.calls.publish.load(Ordering::SeqCst), 3);
    assert_eq!(h.calls.subscribe.load(Ordering::SeqCst), 1);
}

#[test]
fn test_alert_failure_still_logs_result() {
    let mut h = harness(Provider::Azure, 9, true);
    let sample = MetricsSample::new()
        .with("Errors", 50.0)
        .with("Invocations", 10.0)
        .with("Requests", 60.0);

    let inference = h.pipeline.run(&sample).unwrap();
    assert_eq!(inference.verdict, Verdict::FaultDetected);
    assert_eq!(inference.alert, Some(DispatchOutcome::Failed));
    assert_eq!(h.calls.publish.load(Ordering::SeqCst), 1);

    let report = read_log(&h.log_path).unwrap();
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].metrics[9], 60.0);
    assert_eq!(report.entries[0].provider.as_deref(), Some("Azure"));
}

#[test]
fn test_schema_mismatch_writes_nothing() {
    let mut h = harness(Provider::Aws, 7, false);
    let sample = MetricsSample::new().with("Errors", 50.0);

    let err = h.pipeline.run(&sample).unwrap_err();
    assert!(matches!(
        err,
        DetectorError::SchemaMismatch {
            expected: 7,
            got: 9
        }
    ));
    assert!(!h.log_path.exists());
    assert_eq!(h.calls.publish.load(Ordering::SeqCst), 0);
}

#[test]
fn test_log_failure_sends_no_alert() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());
    let transport = CountingTransport {
        calls: calls.clone(),
        fail: false,
    };
    let mut pipeline = Pipeline::new(
        Provider::Aws,
        AnomalyScorer::new(Box::new(ErrorRatioModel { input_dim: 9 })),
        ResultLog::new(dir.path().join("no-such-dir").join("results_log.txt")),
        AlertDispatcher::new(Box::new(transport), "ops"),
    );

    let sample = MetricsSample::new().with("Errors", 50.0);
    let err = pipeline.run(&sample).unwrap_err();
    assert!(matches!(err, DetectorError::Io { .. }));
    assert_eq!(calls.publish.load(Ordering::SeqCst), 0);
}

#[test]
fn test_forest_model_from_json_source() {
    let dir = TempDir::new().unwrap();

    // One tree: Errors > 20 isolates immediately, everything else sits in a
    // deep leaf.
    let forest = r#"{
        "n_features": 9,
        "max_samples": 256,
        "trees": [
            {"nodes": [
                {"kind": "split", "feature": 3, "threshold": 20.0, "left": 1, "right": 2},
                {"kind": "leaf", "n_samples": 255},
                {"kind": "leaf", "n_samples": 1}
            ]}
        ]
    }"#;
    let model = IsolationForest::from_json(forest.as_bytes()).unwrap();

    let sample_path = dir.path().join("sample.json");
    fs::write(&sample_path, r#"{"Errors": 50, "Invocations": 10}"#).unwrap();

    let log_path = dir.path().join("results_log.txt");
    let calls = Arc::new(Calls::default());
    let mut pipeline = Pipeline::new(
        Provider::Aws,
        AnomalyScorer::new(Box::new(model)),
        ResultLog::new(&log_path).with_header(true),
        AlertDispatcher::new(
            Box::new(CountingTransport {
                calls: calls.clone(),
                fail: false,
            }),
            "ops",
        ),
    );

    let inference = pipeline
        .run_source(&mut JsonSource::from_path(&sample_path))
        .unwrap();
    assert_eq!(inference.verdict, Verdict::FaultDetected);
    assert_eq!(calls.publish.load(Ordering::SeqCst), 1);

    let inference = pipeline.run(&MetricsSample::new()).unwrap();
    assert_eq!(inference.verdict, Verdict::NoFault);

    let report = read_log(&log_path).unwrap();
    assert!(report.had_header);
    assert_eq!(report.entries.len(), 2);
    assert!(report.entries[0].timestamp <= report.entries[1].timestamp);
}
