//! Fault decision and alerting
//!
//! This module provides:
//! - The decision policy mapping model labels to verdicts
//! - Alert emission through pluggable transports (log, webhook)

mod alerter;
mod policy;

pub use alerter::{
    AlertDispatcher, AlertSeverity, AlertTransport, AlertmanagerAlert, AlertmanagerPayload,
    DispatchOutcome, FaultAlert, LogTransport, WebhookTransport,
};
pub use policy::{decide, should_alert};
