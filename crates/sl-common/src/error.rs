//! Error types for Sightline.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 21,
//!   "category": "store",
//!   "message": "store query timed out after 2000ms",
//!   "recoverable": true,
//!   "context": { "timeout_ms": 2000 }
//! }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Sightline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors (thresholds, markers, schema).
    Config,
    /// Persistent store errors (queries, timeouts, missing data).
    Store,
    /// Inference subsystem errors (model load, scoring, timeouts).
    Inference,
    /// Analytics computation errors (bad samples, non-finite values).
    Analysis,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Inference => write!(f, "inference"),
            ErrorCategory::Analysis => write!(f, "analysis"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Sightline.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid analytics config: {0}")]
    InvalidConfig(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    // Store errors (20-29)
    #[error("store query failed: {0}")]
    Store(String),

    #[error("store query timed out after {millis}ms")]
    StoreTimeout { millis: u64 },

    #[error("identifier {identifier} not found")]
    IdentifierNotFound { identifier: String },

    // Inference errors (30-39)
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference timed out after {millis}ms")]
    InferenceTimeout { millis: u64 },

    // Analysis errors (40-49)
    #[error("invalid movement sample: {0}")]
    InvalidSample(String),

    #[error("non-finite value in {field}")]
    NonFinite { field: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Store errors
    /// - 30-39: Inference errors
    /// - 40-49: Analysis errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::SchemaValidation(_) => 12,
            Error::Store(_) => 20,
            Error::StoreTimeout { .. } => 21,
            Error::IdentifierNotFound { .. } => 22,
            Error::Inference(_) => 30,
            Error::ModelUnavailable(_) => 31,
            Error::InferenceTimeout { .. } => 32,
            Error::InvalidSample(_) => 41,
            Error::NonFinite { .. } => 42,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) | Error::SchemaValidation(_) => {
                ErrorCategory::Config
            }

            Error::Store(_) | Error::StoreTimeout { .. } | Error::IdentifierNotFound { .. } => {
                ErrorCategory::Store
            }

            Error::Inference(_) | Error::ModelUnavailable(_) | Error::InferenceTimeout { .. } => {
                ErrorCategory::Inference
            }

            Error::InvalidSample(_) | Error::NonFinite { .. } => ErrorCategory::Analysis,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Config errors: recoverable by fixing/resetting config
            Error::Config(_) => true,
            Error::InvalidConfig(_) => true,
            Error::SchemaValidation(_) => true,

            // Store: transient unless the data is simply absent
            Error::Store(_) => true,
            Error::StoreTimeout { .. } => true,
            Error::IdentifierNotFound { .. } => false,

            // Inference: heuristic fallback always exists
            Error::Inference(_) => true,
            Error::ModelUnavailable(_) => true,
            Error::InferenceTimeout { .. } => true,

            // Analysis: the input itself is bad
            Error::InvalidSample(_) => false,
            Error::NonFinite { .. } => false,

            // I/O: often transient
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => {
                "Run 'sightline config validate' and fix the reported field, or remove the file to use defaults."
            }
            Error::SchemaValidation(_) => {
                "Ensure analytics.toml declares the supported schema_version."
            }
            Error::Store(_) | Error::StoreTimeout { .. } => {
                "Retry the query. If persistent, check the store is reachable and raise store.query_timeout_ms."
            }
            Error::IdentifierNotFound { .. } => {
                "No sightings exist for this identifier in the dataset."
            }
            Error::Inference(_) | Error::ModelUnavailable(_) | Error::InferenceTimeout { .. } => {
                "Scores fall back to the built-in heuristic. Check the model file or raise risk.inference_timeout_ms."
            }
            Error::InvalidSample(_) | Error::NonFinite { .. } => {
                "Inspect the identifier's movement samples for out-of-range or non-finite coordinates."
            }
            Error::Io(_) => "Check file paths and permissions, then retry.",
            Error::Json(_) => "Invalid JSON input. Check syntax with 'jq . <file>'.",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., identifier, timeout).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::StoreTimeout { millis } | Error::InferenceTimeout { millis } => {
                context.insert("timeout_ms".to_string(), serde_json::json!(millis));
            }
            Error::IdentifierNotFound { identifier } => {
                context.insert("identifier".to_string(), serde_json::json!(identifier));
            }
            Error::NonFinite { field } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [category] message
///   Fix: remediation
/// ```
pub fn format_error_human(err: &Error) -> String {
    format!(
        "✗ [{}] {}\n  Fix: {}",
        err.category(),
        err,
        err.remediation()
    )
}
