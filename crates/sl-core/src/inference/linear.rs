//! Linear and logistic scoring models loaded from JSON.
//!
//! ```json
//! {
//!   "weights": [0.1, 0.9, 0.6, 0.4, 0.8, 0.0, -0.2, 0.0],
//!   "bias": -0.5,
//!   "activation": "logistic"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{check_output, InferenceBackend, InferenceError, Model};
use crate::risk::{FeatureVector, FEATURE_COUNT};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Raw dot product plus bias.
    #[default]
    Identity,
    /// 1 / (1 + e^-x).
    Logistic,
}

/// Weighted sum over the feature vector. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: [f64; FEATURE_COUNT],
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub activation: Activation,
}

impl LinearModel {
    pub fn new(weights: [f64; FEATURE_COUNT], bias: f64, activation: Activation) -> Self {
        LinearModel {
            weights,
            bias,
            activation,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::Unavailable(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, InferenceError> {
        let model: LinearModel = serde_json::from_str(content)
            .map_err(|e| InferenceError::Unavailable(format!("invalid model file: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), InferenceError> {
        if let Some(idx) = self.weights.iter().position(|w| !w.is_finite()) {
            return Err(InferenceError::Unavailable(format!(
                "weight {} is not finite",
                idx
            )));
        }
        if !self.bias.is_finite() {
            return Err(InferenceError::Unavailable("bias is not finite".into()));
        }
        Ok(())
    }

    pub fn evaluate(&self, features: &FeatureVector) -> f64 {
        let z = self
            .weights
            .iter()
            .zip(features.values())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        match self.activation {
            Activation::Identity => z,
            Activation::Logistic => 1.0 / (1.0 + (-z).exp()),
        }
    }
}

impl InferenceBackend for LinearModel {
    fn score(&self, features: &FeatureVector, _timeout: Duration) -> Result<f64, InferenceError> {
        check_output(self.evaluate(features))
    }

    fn name(&self) -> &str {
        "linear"
    }
}

impl Model for LinearModel {
    fn predict(&mut self, features: &FeatureVector) -> Result<f64, InferenceError> {
        check_output(self.evaluate(features))
    }
}
