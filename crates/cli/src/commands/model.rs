//! Model and feature inspection commands
//!
//! These run the detector's normalizer and scorer on a sample without
//! touching the result log or sending alerts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use detector_lib::anomaly::decide;
use detector_lib::collector::{JsonSource, MetricsSource};
use detector_lib::predictor::{
    auxiliary_value, load_model, normalize, sha256_hex, AnomalyScorer, ModelArtifact,
    ModelFormat, FEATURE_SOURCES,
};
use detector_lib::{FeatureVector, MetricsSample, Provider, RawVerdict, Verdict};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_verdict, print_json, print_success, OutputFormat};

/// Model artifact selection shared by model commands
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model artifact (.onnx or JSON isolation forest)
    #[arg(long, short)]
    pub model: PathBuf,

    /// Artifact format (auto, onnx, forest)
    #[arg(long, default_value = "auto")]
    pub model_format: ModelFormat,

    /// Input width of an ONNX graph
    #[arg(long, default_value_t = detector_lib::FEATURE_COUNT)]
    pub input_dim: usize,

    /// Expected SHA-256 of the artifact
    #[arg(long)]
    pub sha256: Option<String>,
}

impl ModelArgs {
    fn artifact(&self) -> ModelArtifact {
        let artifact = ModelArtifact::new(&self.model)
            .with_format(self.model_format)
            .with_input_dim(self.input_dim);
        match &self.sha256 {
            Some(digest) => artifact.with_sha256(digest.as_str()),
            None => artifact,
        }
    }
}

/// Row for the feature table
#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Observed")]
    observed: String,
}

#[derive(Debug, Serialize)]
struct NormalizeOutput {
    provider: Provider,
    features: FeatureVector,
    auxiliary_metric: Option<&'static str>,
    auxiliary: f64,
}

#[derive(Debug, Serialize)]
struct ScoreOutput {
    provider: Provider,
    model_kind: String,
    raw_label: i64,
    verdict: Verdict,
    features: FeatureVector,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    path: PathBuf,
    format: String,
    kind: String,
    input_dim: usize,
    sha256: String,
    size_bytes: usize,
}

fn read_sample(path: &str) -> Result<MetricsSample> {
    let sample = JsonSource::from_arg(path)
        .collect()
        .context("Failed to read metrics sample")?;
    Ok(sample)
}

fn feature_rows(sample: &MetricsSample, features: &FeatureVector) -> Vec<FeatureRow> {
    FEATURE_SOURCES
        .iter()
        .map(|(slot, key)| FeatureRow {
            slot: slot.name().to_string(),
            source: key.to_string(),
            value: features.get(*slot).to_string(),
            observed: if sample.get(key).is_some() {
                "yes".green().to_string()
            } else {
                "no".dimmed().to_string()
            },
        })
        .collect()
}

fn print_features(sample: &MetricsSample, features: &FeatureVector) {
    let table = tabled::Table::new(feature_rows(sample, features))
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
}

/// Show the feature vector a sample normalizes to
pub fn show_features(metrics: &str, provider: Provider, format: OutputFormat) -> Result<()> {
    let sample = read_sample(metrics)?;
    let features = normalize(&sample);
    let output = NormalizeOutput {
        provider,
        features,
        auxiliary_metric: provider.auxiliary_metric(),
        auxiliary: auxiliary_value(&sample, provider),
    };

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => {
            println!("{} ({})", "Feature Vector".bold(), provider.to_string().cyan());
            print_features(&sample, &features);
            match output.auxiliary_metric {
                Some(name) => println!("Auxiliary ({}): {}", name, output.auxiliary),
                None => println!("Auxiliary: none for {}", provider),
            }
        }
    }
    Ok(())
}

/// Score one sample without logging or alerting
pub fn score_sample(
    model: &ModelArgs,
    metrics: &str,
    provider: Provider,
    format: OutputFormat,
) -> Result<()> {
    let scorer = AnomalyScorer::from_artifact(&model.artifact())
        .with_context(|| format!("Failed to load model {}", model.model.display()))?;
    let sample = read_sample(metrics)?;
    let features = normalize(&sample);
    let raw: RawVerdict = scorer.score(&features)?;
    let verdict = decide(raw);

    match format {
        OutputFormat::Json => print_json(&ScoreOutput {
            provider,
            model_kind: scorer.model_kind().to_string(),
            raw_label: raw.label(),
            verdict,
            features,
        })?,
        OutputFormat::Table => {
            print_features(&sample, &features);
            println!("Model:    {}", scorer.model_kind());
            println!("Label:    {}", raw.label());
            println!("Verdict:  {}", color_verdict(verdict.label()));
        }
    }
    Ok(())
}

/// Verify and describe a model artifact
pub fn show_model_info(model: &ModelArgs, format: OutputFormat) -> Result<()> {
    let artifact = model.artifact();
    let bytes = std::fs::read(&artifact.path)
        .with_context(|| format!("Failed to read {}", artifact.path.display()))?;
    let loaded = load_model(&artifact)?;

    let info = ModelInfo {
        path: artifact.path.clone(),
        format: artifact.format.resolve(&artifact.path).to_string(),
        kind: loaded.kind().to_string(),
        input_dim: loaded.input_dim(),
        sha256: sha256_hex(&bytes),
        size_bytes: bytes.len(),
    };

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            print_success(&format!("Model {} loaded", display_name(&info.path)));
            println!("Format:     {}", info.format);
            println!("Kind:       {}", info.kind);
            println!("Input dim:  {}", info.input_dim);
            println!("Size:       {} bytes", info.size_bytes);
            println!("SHA-256:    {}", info.sha256);
        }
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
