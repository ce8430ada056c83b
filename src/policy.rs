//! Immutable collection policy and its validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policy governing when a collection runs and what it may evict.
///
/// Thresholds are plain signed integers, not a pre-validated percent type:
/// `validate` must be able to reject an out-of-range value with the exact
/// message strings below, which requires holding the raw, possibly-invalid
/// input rather than refusing to construct it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGcPolicy {
    pub high_threshold_percent: i64,
    pub low_threshold_percent: i64,
    #[serde(with = "humantime_serde")]
    pub min_age: Duration,
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid HighThresholdPercent {0}, must be in range [0-100]")]
    HighThresholdOutOfRange(i64),
    #[error("invalid LowThresholdPercent {0}, must be in range [0-100]")]
    LowThresholdOutOfRange(i64),
    #[error("LowThresholdPercent {low} can not be higher than HighThresholdPercent {high}")]
    LowAboveHigh { low: i64, high: i64 },
}

/// Validate a policy. The first failing rule wins.
pub fn validate(policy: &ImageGcPolicy) -> Result<(), ValidationError> {
    if !(0..=100).contains(&policy.high_threshold_percent) {
        return Err(ValidationError::HighThresholdOutOfRange(
            policy.high_threshold_percent,
        ));
    }
    if !(0..=100).contains(&policy.low_threshold_percent) {
        return Err(ValidationError::LowThresholdOutOfRange(
            policy.low_threshold_percent,
        ));
    }
    if policy.low_threshold_percent > policy.high_threshold_percent {
        return Err(ValidationError::LowAboveHigh {
            low: policy.low_threshold_percent,
            high: policy.high_threshold_percent,
        });
    }
    Ok(())
}

impl ImageGcPolicy {
    /// `maxAge == 0` disables age-driven eviction entirely.
    pub fn age_sweep_enabled(&self) -> bool {
        self.max_age > Duration::ZERO
    }
}
