//! Fault Detector - serverless function fault detection
//!
//! One run scores one metrics sample: load the model, read the sample,
//! append the verdict to the result log and alert on faults.

use anyhow::{Context, Result};
use detector_lib::anomaly::{AlertDispatcher, AlertTransport, LogTransport, WebhookTransport};
use detector_lib::collector::JsonSource;
use detector_lib::predictor::AnomalyScorer;
use detector_lib::sink::ResultLog;
use detector_lib::{DetectorMetrics, Pipeline, StructuredLogger};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const DETECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Destination name registered with the log transport
const LOG_ALERT_DESTINATION: &str = "fault-alerts";

fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::DetectorConfig::load()?;
    let provider = config.provider()?;
    info!(provider = %provider, log_path = %config.log_path.display(), "Detector configured");

    let logger = StructuredLogger::new(provider);
    let metrics = DetectorMetrics::new();

    let artifact = config.artifact()?;
    let scorer = AnomalyScorer::from_artifact(&artifact)
        .inspect_err(|e| error!(error = %e, "Model could not be loaded"))
        .context("Failed to load anomaly model")?;
    logger.log_startup(DETECTOR_VERSION, scorer.model_kind(), &artifact.path);

    let (transport, destination): (Box<dyn AlertTransport>, String) =
        match &config.alert_webhook_url {
            Some(url) => (Box::new(WebhookTransport::new()?), url.clone()),
            None => (
                Box::new(LogTransport::new()),
                LOG_ALERT_DESTINATION.to_string(),
            ),
        };

    let log = ResultLog::new(&config.log_path).with_header(config.log_header);
    let mut pipeline = Pipeline::new(
        provider,
        scorer,
        log,
        AlertDispatcher::new(transport, destination),
    );

    let mut source = JsonSource::from_arg(&config.input);
    let outcome = pipeline.run_source(&mut source);

    if let Some(path) = &config.metrics_textfile {
        if let Err(e) = metrics.write_textfile(path) {
            error!(error = %e, path = %path.display(), "Failed to write metrics textfile");
        }
    }

    match outcome {
        Ok(inference) => {
            println!("{}", inference.verdict);
            logger.log_shutdown("run complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Inference failed");
            logger.log_shutdown("run failed");
            Err(e).context("Fault detection run failed")
        }
    }
}
