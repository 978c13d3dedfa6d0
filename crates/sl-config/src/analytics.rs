//! Analytics configuration types.
//!
//! Every section is optional on disk; missing fields take the defaults below,
//! which are the calibrated values the detectors were tuned against.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::validate::ValidationError;

/// Complete analytics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub schema_version: String,
    pub route: RouteThresholds,
    pub anomaly: AnomalyThresholds,
    pub risk: RiskSettings,
    pub trend: TrendSettings,
    pub store: StoreSettings,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            route: RouteThresholds::default(),
            anomaly: AnomalyThresholds::default(),
            risk: RiskSettings::default(),
            trend: TrendSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

/// Route profiling thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteThresholds {
    /// Radius within which two samples count as the same place.
    pub frequent_radius_m: f64,
    /// A sample is frequent when its neighbour count exceeds this share of all samples.
    pub frequent_fraction: f64,
    /// Consecutive pairs farther apart than this may be flagged.
    pub flag_distance_m: f64,
    /// Consecutive pairs separated by more than this may be flagged.
    pub flag_min_duration_secs: i64,
    /// Switch from pairwise comparison to the grid index at this many samples.
    pub grid_index_min_samples: usize,
}

impl Default for RouteThresholds {
    fn default() -> Self {
        RouteThresholds {
            frequent_radius_m: 100.0,
            frequent_fraction: 0.1,
            flag_distance_m: 500.0,
            flag_min_duration_secs: 3600,
            grid_index_min_samples: 256,
        }
    }
}

/// Anomaly detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub rapid_speed_kmh: f64,
    pub route_variation: f64,
    pub captures_per_day: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        AnomalyThresholds {
            rapid_speed_kmh: 200.0,
            route_variation: 0.1,
            captures_per_day: 10.0,
        }
    }
}

/// Risk scoring weights, normalisation scales and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Risk above this adds the full security check action.
    pub full_check_threshold: f64,
    /// Predicted events are reported only above this probability.
    pub event_threshold: f64,
    /// estimatedTime = now + probability × horizon.
    pub event_horizon_days: f64,
    pub speed_weight: f64,
    pub variation_weight: f64,
    pub distance_scale_m: f64,
    pub speed_scale_kmh: f64,
    pub variation_scale: f64,
    pub anomaly_scale: f64,
    pub high_severity_scale: f64,
    pub sample_scale: f64,
    pub recency_scale_secs: f64,
    pub inference_timeout_ms: u64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            full_check_threshold: 0.7,
            event_threshold: 0.5,
            event_horizon_days: 30.0,
            speed_weight: 0.6,
            variation_weight: 0.4,
            distance_scale_m: 500_000.0,
            speed_scale_kmh: 200.0,
            variation_scale: 0.1,
            anomaly_scale: 5.0,
            high_severity_scale: 3.0,
            sample_scale: 100.0,
            recency_scale_secs: 30.0 * 86_400.0,
            inference_timeout_ms: 250,
        }
    }
}

impl RiskSettings {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

/// Trend aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    /// Sightings below this confidence form the anomaly cluster.
    pub anomaly_confidence: f64,
    /// Sightings below this confidence count as a security risk.
    pub security_confidence: f64,
    pub top_hotspots: usize,
    pub peak_hours: usize,
    pub risk_markers: RiskMarkers,
}

impl Default for TrendSettings {
    fn default() -> Self {
        TrendSettings {
            anomaly_confidence: 0.5,
            security_confidence: 0.6,
            top_hotspots: 5,
            peak_hours: 3,
            risk_markers: RiskMarkers::default(),
        }
    }
}

/// Regular expressions that mark an identifier or location as risky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskMarkers {
    pub identifier_patterns: Vec<String>,
    pub location_patterns: Vec<String>,
}

impl Default for RiskMarkers {
    fn default() -> Self {
        RiskMarkers {
            identifier_patterns: vec!["STOLEN".to_string()],
            location_patterns: vec!["HIGH_RISK_AREA".to_string()],
        }
    }
}

/// Persistent store access settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub query_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            query_timeout_ms: 2000,
        }
    }
}

impl StoreSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl AnalyticsConfig {
    /// Load configuration from a file. `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&content),
            _ => Self::parse_toml(&content),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, ValidationError> {
        toml::from_str(content)
            .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
    }

    /// Parse configuration from a JSON string.
    pub fn parse_json(content: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(content)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }
}
