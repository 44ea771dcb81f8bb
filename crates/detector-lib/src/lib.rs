//! Serverless function fault detection
//!
//! This crate provides the core functionality for:
//! - Normalizing provider metrics into a fixed feature vector
//! - Scoring vectors with a trained outlier model (ONNX or isolation forest)
//! - Mapping model labels to fault verdicts and alerting on faults
//! - Appending every verdict to a durable result log, and reading it back
//! - Prometheus metrics and structured logging

pub mod anomaly;
pub mod collector;
pub mod error;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod sink;

pub use error::{DetectorError, Result};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
pub use pipeline::{Inference, Pipeline};
