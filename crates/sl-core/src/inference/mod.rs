//! Inference subsystem adapters.
//!
//! The risk scorer consumes an optional [`InferenceBackend`]: a normalised
//! feature vector goes in, a single score in [0, 1] comes out. Any error makes
//! the scorer fall back to its heuristic.
//!
//! Three adapters are provided:
//! - [`LinearModel`]: weights and bias loaded from JSON, thread-safe, no locking
//! - [`LazyBackend`]: loads any backend at most once on first use
//! - [`InferenceWorker`]: owns a non-thread-safe [`Model`] on a dedicated
//!   thread and serialises requests through a channel

pub mod lazy;
pub mod linear;
pub mod worker;

pub use lazy::LazyBackend;
pub use linear::{Activation, LinearModel};
pub use worker::InferenceWorker;

use std::time::Duration;
use thiserror::Error;

use crate::risk::FeatureVector;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("inference timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("inference failed: {0}")]
    Failed(String),

    #[error("model returned non-finite score {0}")]
    InvalidOutput(f64),
}

impl From<InferenceError> for sl_common::Error {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Unavailable(msg) => sl_common::Error::ModelUnavailable(msg),
            InferenceError::Timeout { millis } => sl_common::Error::InferenceTimeout { millis },
            other => sl_common::Error::Inference(other.to_string()),
        }
    }
}

/// A scoring backend safe to call from many threads at once.
pub trait InferenceBackend: Send + Sync {
    /// Score one normalised feature vector. Implementations must return
    /// within roughly `timeout`.
    fn score(&self, features: &FeatureVector, timeout: Duration) -> Result<f64, InferenceError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "model"
    }
}

/// A model that needs exclusive access to predict.
pub trait Model: Send {
    fn predict(&mut self, features: &FeatureVector) -> Result<f64, InferenceError>;
}

/// Reject non-finite model output.
pub(crate) fn check_output(score: f64) -> Result<f64, InferenceError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(InferenceError::InvalidOutput(score))
    }
}

pub(crate) fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_common_codes() {
        let e: sl_common::Error = InferenceError::Timeout { millis: 250 }.into();
        assert_eq!(e.code(), 32);
        let e: sl_common::Error = InferenceError::Unavailable("missing".into()).into();
        assert_eq!(e.code(), 31);
        let e: sl_common::Error = InferenceError::InvalidOutput(f64::NAN).into();
        assert_eq!(e.code(), 30);
    }

    #[test]
    fn non_finite_output_is_rejected() {
        assert_eq!(check_output(0.4), Ok(0.4));
        assert!(check_output(f64::INFINITY).is_err());
    }
}
