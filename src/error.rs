//! Error types for forecasting, training and parameter exchange.

use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors raised by the forecaster.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    /// A parameter array or vector does not match the expected shape.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A standard deviation computed to zero (or a non-finite value).
    #[error("numeric guard: standard deviation of dimension {dimension} is not positive")]
    NumericGuard { dimension: usize },

    /// The optimizer hit its iteration cap without early stopping.
    ///
    /// Reported as a warning; the trained parameters remain usable.
    #[error(
        "training did not converge after {iterations} iterations (validation score {validation_score:.5})"
    )]
    TrainingNonConvergence {
        iterations: usize,
        validation_score: f32,
    },

    /// `apply_update` was called without a pending forward pass.
    #[error("adapter misuse: apply_update requires exactly one preceding forward pass")]
    AdapterMisuse,

    /// Not enough rows to build a training set.
    #[error("insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Decoding an exported artifact failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ForecastError {
    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Check a vector or array length against its expected value.
    pub(crate) fn check_len(what: &str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::configuration(format!(
                "{what}: expected {expected} values, got {actual}"
            )))
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
