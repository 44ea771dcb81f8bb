//! Fault decision policy
//!
//! Each sample is judged on its own: no thresholds, hysteresis or smoothing
//! across samples.

use crate::models::{RawVerdict, Verdict};

/// Map a model label to a verdict
pub fn decide(raw: RawVerdict) -> Verdict {
    match raw {
        RawVerdict::Outlier => Verdict::FaultDetected,
        RawVerdict::Inlier => Verdict::NoFault,
    }
}

/// Alert iff a fault was detected
pub fn should_alert(verdict: Verdict) -> bool {
    verdict.is_fault()
}
