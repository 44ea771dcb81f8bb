//! Detector configuration

use anyhow::{Context, Result};
use detector_lib::predictor::{ModelArtifact, ModelFormat};
use detector_lib::Provider;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when `DETECTOR_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "detector.toml";

/// Detector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Serverless platform the samples come from
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// `auto`, `onnx` or `forest`
    #[serde(default = "default_model_format")]
    pub model_format: String,

    /// Input width the model was trained with
    #[serde(default = "default_model_input_dim")]
    pub model_input_dim: usize,

    /// Expected SHA-256 of the model artifact, hex encoded
    #[serde(default)]
    pub model_sha256: Option<String>,

    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Write a header row when the result log is created
    #[serde(default)]
    pub log_header: bool,

    /// Metrics sample file, `-` for stdin
    #[serde(default = "default_input")]
    pub input: String,

    /// Alertmanager-compatible webhook; alerts go to the log when unset
    #[serde(default)]
    pub alert_webhook_url: Option<String>,

    /// Prometheus textfile written at the end of a run
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

fn default_provider() -> String {
    "AWS".to_string()
}

fn default_model_path() -> PathBuf {
    PathBuf::from("ai_fault_detector.json")
}

fn default_model_format() -> String {
    "auto".to_string()
}

fn default_model_input_dim() -> usize {
    9
}

fn default_log_path() -> PathBuf {
    PathBuf::from("results_log.txt")
}

fn default_input() -> String {
    "-".to_string()
}

impl DetectorConfig {
    /// Load configuration from the config file and `DETECTOR_*` environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("DETECTOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_sources(&file, true)
    }

    /// Environment variables override the file; a missing file is not an error
    fn from_sources(file: &Path, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::File::from(file.to_path_buf())
                .format(config::FileFormat::Toml)
                .required(false),
        );
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix("DETECTOR"));
        }

        let config: DetectorConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.provider()?;
        self.model_format()?;
        if self.model_input_dim == 0 {
            anyhow::bail!("model_input_dim must be positive");
        }
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider> {
        self.provider
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("Invalid provider")
    }

    pub fn model_format(&self) -> Result<ModelFormat> {
        Ok(self.model_format.parse()?)
    }

    /// Model artifact described by this configuration
    pub fn artifact(&self) -> Result<ModelArtifact> {
        let mut artifact = ModelArtifact::new(&self.model_path)
            .with_format(self.model_format()?)
            .with_input_dim(self.model_input_dim);
        if let Some(digest) = &self.model_sha256 {
            artifact = artifact.with_sha256(digest.as_str());
        }
        Ok(artifact)
    }
}
