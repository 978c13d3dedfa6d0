//! Configuration snapshots embedded in command output.
//!
//! A snapshot records which thresholds produced a report so that two runs can
//! be compared without diffing the config files themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analytics::AnalyticsConfig;
use crate::resolve::{ConfigPaths, ConfigSource};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path where the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the effective configuration (canonical JSON).
    pub hash: String,

    /// Key thresholds for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of the thresholds that most affect results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub frequent_radius_m: f64,
    pub rapid_speed_kmh: f64,
    pub route_variation: f64,
    pub captures_per_day: f64,
    pub full_check_threshold: f64,
    pub event_threshold: f64,
    pub anomaly_confidence: f64,
    pub security_confidence: f64,
    pub risk_marker_count: usize,
}

impl ConfigSnapshot {
    /// Create a snapshot of the effective configuration.
    ///
    /// The hash covers the parsed values rather than the file bytes, so
    /// reformatting a file or spelling out a default does not change it.
    pub fn new(config: &AnalyticsConfig, paths: &ConfigPaths) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: paths.analytics.as_ref().map(|p| p.display().to_string()),
            source: paths.source.to_string(),
            hash: hash_config(config),
            summary: ConfigSummary::from_config(config),
        }
    }

    /// Create a snapshot with only defaults (no config file loaded).
    pub fn defaults_only() -> Self {
        Self::new(
            &AnalyticsConfig::default(),
            &ConfigPaths {
                analytics: None,
                source: ConfigSource::BuiltinDefault,
            },
        )
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same effective config).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.hash == other.hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.hash[..12.min(self.hash.len())]
    }
}

impl ConfigSummary {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        let markers = &config.trend.risk_markers;
        ConfigSummary {
            frequent_radius_m: config.route.frequent_radius_m,
            rapid_speed_kmh: config.anomaly.rapid_speed_kmh,
            route_variation: config.anomaly.route_variation,
            captures_per_day: config.anomaly.captures_per_day,
            full_check_threshold: config.risk.full_check_threshold,
            event_threshold: config.risk.event_threshold,
            anomaly_confidence: config.trend.anomaly_confidence,
            security_confidence: config.trend.security_confidence,
            risk_marker_count: markers.identifier_patterns.len() + markers.location_patterns.len(),
        }
    }
}

fn hash_config(config: &AnalyticsConfig) -> String {
    // Struct field order is fixed, so serde_json output is canonical here.
    let content = serde_json::to_string(config).unwrap_or_default();
    hash_content(&content)
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
