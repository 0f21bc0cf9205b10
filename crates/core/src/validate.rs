//! Validation rules shared by every subscription entry point.
//!
//! The one-shot `/subscribe` command and the button-driven wizard both run
//! user input through these functions, so the two paths accept exactly the
//! same criteria.

use crate::{Category, Operator};
use thiserror::Error;

/// Smallest threshold (Gwei) a criterion may carry.
pub const MIN_THRESHOLD: f64 = 1.0;

/// Rejected subscription input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown category `{0}`, expected one of fastest, fast, average, safeLow")]
    UnknownCategory(String),

    #[error("unknown operator `{0}`, expected one of <, >, <=, >=, ==")]
    UnknownOperator(String),

    #[error("threshold {0} is below the minimum of {MIN_THRESHOLD} Gwei")]
    ThresholdTooLow(f64),

    #[error("threshold must be a finite number")]
    ThresholdNotFinite,
}

pub fn validate_category(raw: &str) -> Result<Category, ValidationError> {
    raw.parse()
}

pub fn validate_operator(raw: &str) -> Result<Operator, ValidationError> {
    raw.parse()
}

/// Accepts finite thresholds of at least [`MIN_THRESHOLD`].
pub fn validate_threshold(threshold: f64) -> Result<f64, ValidationError> {
    if !threshold.is_finite() {
        return Err(ValidationError::ThresholdNotFinite);
    }
    if threshold < MIN_THRESHOLD {
        return Err(ValidationError::ThresholdTooLow(threshold));
    }
    Ok(threshold)
}
