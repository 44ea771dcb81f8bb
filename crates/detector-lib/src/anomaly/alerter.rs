//! Alert emission for detected faults
//!
//! Handles:
//! - Registering the alert destination with a transport, at most once
//! - One publish attempt per fault event (no deduplication)
//! - Formatting alerts for Alertmanager-compatible webhooks
//!
//! Transport failures are logged and dropped. They never change the
//! verdict or the result log.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{FeatureVector, Provider};

/// Default HTTP timeout for webhook deliveries
const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A fault notification, ready for any transport
#[derive(Debug, Clone, PartialEq)]
pub struct FaultAlert {
    pub subject: String,
    pub message: String,
    pub provider: Provider,
    pub severity: AlertSeverity,
    pub features: FeatureVector,
    pub detected_at: DateTime<Utc>,
}

impl FaultAlert {
    pub fn new(provider: Provider, features: &FeatureVector, detected_at: DateTime<Utc>) -> Self {
        Self {
            subject: format!("Serverless fault alert ({})", provider),
            message: format!(
                "{} function fault detected! Metrics: {:?}",
                provider,
                features.as_array()
            ),
            provider,
            severity: AlertSeverity::Critical,
            features: *features,
            detected_at,
        }
    }

    /// Convert to the Alertmanager webhook format
    pub fn to_alertmanager(&self) -> AlertmanagerAlert {
        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), "ServerlessFunctionFault".to_string());
        labels.insert("severity".to_string(), self.severity.to_string());
        labels.insert("provider".to_string(), self.provider.to_string());

        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), self.subject.clone());
        annotations.insert("description".to_string(), self.message.clone());

        AlertmanagerAlert {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at: self.detected_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ends_at: None,
            generator_url: None,
        }
    }
}

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (firing or resolved)
    pub status: String,
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    /// End time (empty for firing alerts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    /// Generator URL for linking back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

/// Alertmanager webhook payload (array of alerts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

/// Notification channel for fault alerts
pub trait AlertTransport: Send + Sync {
    /// Destinations currently registered for notifications
    fn subscribers(&self) -> Result<Vec<String>>;

    /// Register a destination
    fn subscribe(&self, destination: &str) -> Result<()>;

    /// Deliver one alert to every registered destination
    fn publish(&self, alert: &FaultAlert) -> Result<()>;

    /// Transport name for logs
    fn name(&self) -> &str;
}

/// Transport that writes alerts to the structured log
#[derive(Default)]
pub struct LogTransport {
    subscribers: Mutex<Vec<String>>,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertTransport for LogTransport {
    fn subscribers(&self) -> Result<Vec<String>> {
        let subscribers = self
            .subscribers
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        Ok(subscribers.clone())
    }

    fn subscribe(&self, destination: &str) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        subscribers.push(destination.to_string());
        Ok(())
    }

    fn publish(&self, alert: &FaultAlert) -> Result<()> {
        let subscribers = self.subscribers()?;
        warn!(
            event = "fault_alert",
            provider = %alert.provider,
            severity = %alert.severity,
            subject = %alert.subject,
            recipients = ?subscribers,
            "{}",
            alert.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Transport that POSTs Alertmanager payloads to subscribed URLs
pub struct WebhookTransport {
    client: reqwest::blocking::Client,
    subscribers: Mutex<Vec<String>>,
}

impl WebhookTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            subscribers: Mutex::new(Vec::new()),
        })
    }
}

impl AlertTransport for WebhookTransport {
    fn subscribers(&self) -> Result<Vec<String>> {
        let subscribers = self
            .subscribers
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        Ok(subscribers.clone())
    }

    fn subscribe(&self, destination: &str) -> Result<()> {
        if !destination.starts_with("http://") && !destination.starts_with("https://") {
            anyhow::bail!("Webhook destination must be an http(s) URL: {}", destination);
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        subscribers.push(destination.to_string());
        Ok(())
    }

    fn publish(&self, alert: &FaultAlert) -> Result<()> {
        let payload = AlertmanagerPayload {
            alerts: vec![alert.to_alertmanager()],
        };
        let subscribers = self.subscribers()?;
        if subscribers.is_empty() {
            anyhow::bail!("No webhook destinations registered");
        }

        let mut failures = Vec::new();
        for url in &subscribers {
            let result = self
                .client
                .post(url)
                .json(&payload)
                .send()
                .and_then(|response| response.error_for_status());
            match result {
                Ok(response) => debug!(url = %url, status = %response.status(), "Webhook delivered"),
                Err(e) => failures.push(format!("{}: {}", url, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Webhook delivery failed: {}", failures.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Result of one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed,
}

/// Sends fault alerts through a transport to one configured destination
pub struct AlertDispatcher {
    transport: Box<dyn AlertTransport>,
    destination: String,
    /// Set once the destination is known to be registered
    subscribed: bool,
    attempts: u64,
}

impl AlertDispatcher {
    pub fn new(transport: Box<dyn AlertTransport>, destination: impl Into<String>) -> Self {
        Self {
            transport,
            destination: destination.into(),
            subscribed: false,
            attempts: 0,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Number of publish attempts made so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Register the destination unless the transport already knows it
    fn ensure_subscribed(&mut self) -> Result<()> {
        if self.subscribed {
            return Ok(());
        }
        let existing = self.transport.subscribers()?;
        if !existing.iter().any(|d| d == &self.destination) {
            self.transport.subscribe(&self.destination)?;
            info!(
                transport = self.transport.name(),
                destination = %self.destination,
                "Alert destination subscribed"
            );
        }
        self.subscribed = true;
        Ok(())
    }

    /// Make exactly one publish attempt. Errors are logged, never returned.
    pub fn dispatch(&mut self, alert: &FaultAlert) -> DispatchOutcome {
        if let Err(e) = self.ensure_subscribed() {
            warn!(
                transport = self.transport.name(),
                destination = %self.destination,
                error = %e,
                "Failed to register alert destination"
            );
        }

        self.attempts += 1;
        match self.transport.publish(alert) {
            Ok(()) => {
                info!(
                    transport = self.transport.name(),
                    provider = %alert.provider,
                    "Fault alert published"
                );
                DispatchOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    transport = self.transport.name(),
                    provider = %alert.provider,
                    error = %e,
                    "Failed to publish fault alert"
                );
                DispatchOutcome::Failed
            }
        }
    }
}
