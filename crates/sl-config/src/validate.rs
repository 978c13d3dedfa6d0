//! Configuration validation errors and semantic validation.

use regex::Regex;
use thiserror::Error;

use crate::analytics::{AnalyticsConfig, RiskMarkers};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

/// Validate analytics configuration semantically.
pub fn validate_config(config: &AnalyticsConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    let route = &config.route;
    positive("route.frequent_radius_m", route.frequent_radius_m)?;
    unit_interval("route.frequent_fraction", route.frequent_fraction)?;
    positive("route.flag_distance_m", route.flag_distance_m)?;
    if route.flag_min_duration_secs < 0 {
        return Err(ValidationError::InvalidValue {
            field: "route.flag_min_duration_secs".to_string(),
            message: format!("Must be non-negative, got {}", route.flag_min_duration_secs),
        });
    }

    let anomaly = &config.anomaly;
    positive("anomaly.rapid_speed_kmh", anomaly.rapid_speed_kmh)?;
    positive("anomaly.route_variation", anomaly.route_variation)?;
    positive("anomaly.captures_per_day", anomaly.captures_per_day)?;

    let risk = &config.risk;
    unit_interval("risk.full_check_threshold", risk.full_check_threshold)?;
    unit_interval("risk.event_threshold", risk.event_threshold)?;
    positive("risk.event_horizon_days", risk.event_horizon_days)?;
    non_negative("risk.speed_weight", risk.speed_weight)?;
    non_negative("risk.variation_weight", risk.variation_weight)?;
    if risk.speed_weight + risk.variation_weight <= 0.0 {
        return Err(ValidationError::SemanticError(format!(
            "Heuristic weights must not both be zero (speed={}, variation={})",
            risk.speed_weight, risk.variation_weight
        )));
    }
    positive("risk.distance_scale_m", risk.distance_scale_m)?;
    positive("risk.speed_scale_kmh", risk.speed_scale_kmh)?;
    positive("risk.variation_scale", risk.variation_scale)?;
    positive("risk.anomaly_scale", risk.anomaly_scale)?;
    positive("risk.high_severity_scale", risk.high_severity_scale)?;
    positive("risk.sample_scale", risk.sample_scale)?;
    positive("risk.recency_scale_secs", risk.recency_scale_secs)?;

    let trend = &config.trend;
    unit_interval("trend.anomaly_confidence", trend.anomaly_confidence)?;
    unit_interval("trend.security_confidence", trend.security_confidence)?;
    if trend.top_hotspots == 0 {
        return Err(ValidationError::InvalidValue {
            field: "trend.top_hotspots".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }
    validate_markers(&trend.risk_markers)?;

    if config.store.query_timeout_ms == 0 {
        return Err(ValidationError::InvalidValue {
            field: "store.query_timeout_ms".to_string(),
            message: "Must be positive".to_string(),
        });
    }

    Ok(())
}

/// Check every marker pattern compiles.
fn validate_markers(markers: &RiskMarkers) -> ValidationResult<()> {
    let groups = [
        ("identifier_patterns", &markers.identifier_patterns),
        ("location_patterns", &markers.location_patterns),
    ];
    for (name, patterns) in groups {
        for (idx, pattern) in patterns.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                return Err(ValidationError::InvalidValue {
                    field: format!("trend.risk_markers.{}[{}]", name, idx),
                    message: format!("Invalid regex {:?}: {}", pattern, e),
                });
            }
        }
    }
    Ok(())
}

fn positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be finite and positive, got {}", value),
        });
    }
    Ok(())
}

fn non_negative(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be finite and non-negative, got {}", value),
        });
    }
    Ok(())
}

fn unit_interval(field: &str, value: f64) -> ValidationResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be in [0, 1], got {}", value),
        });
    }
    Ok(())
}
