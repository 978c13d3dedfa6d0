//! Fixed-order feature vector fed to the risk model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_common::{MovementSample, Sighting};
use sl_config::RiskSettings;
use sl_math::{clamp01, normalize};

use super::ScoringError;
use crate::anomaly::AnomalyFinding;
use crate::route::RouteProfile;

pub const FEATURE_COUNT: usize = 8;

/// Raw or normalised features, always in the same index order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub const TOTAL_DISTANCE: usize = 0;
    pub const AVERAGE_SPEED: usize = 1;
    pub const ROUTE_VARIATION: usize = 2;
    pub const ANOMALY_COUNT: usize = 3;
    pub const HIGH_SEVERITY_COUNT: usize = 4;
    pub const SAMPLE_COUNT: usize = 5;
    pub const SECONDS_SINCE_LAST: usize = 6;
    pub const CONFIDENCE: usize = 7;

    pub const NAMES: [&'static str; FEATURE_COUNT] = [
        "total_distance_m",
        "average_speed_kmh",
        "route_variation",
        "anomaly_count",
        "high_severity_count",
        "sample_count",
        "seconds_since_last_sample",
        "sighting_confidence",
    ];

    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        FeatureVector(values)
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// The feature at `index`, or `None` past [`FEATURE_COUNT`].
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Indexed by the associated constants only.
    pub(crate) fn at(&self, index: usize) -> f64 {
        self.0[index]
    }

    /// Assemble raw features for one identifier.
    ///
    /// Seconds since the last sample is 0 when there are no samples.
    pub fn build(
        sighting: &Sighting,
        profile: &RouteProfile,
        findings: &[AnomalyFinding],
        samples: &[MovementSample],
        now: DateTime<Utc>,
    ) -> Result<Self, ScoringError> {
        let high_severity = findings.iter().filter(|f| f.is_high_severity()).count();
        let seconds_since_last = samples
            .iter()
            .map(|s| s.captured_at)
            .max()
            .map(|last| (now - last).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let features = FeatureVector([
            profile.total_distance_m,
            profile.average_speed_kmh,
            profile.route_variation,
            findings.len() as f64,
            high_severity as f64,
            samples.len() as f64,
            seconds_since_last,
            sighting.confidence,
        ]);

        if let Some(index) = features.0.iter().position(|v| !v.is_finite()) {
            return Err(ScoringError::NonFiniteFeature {
                feature: Self::NAMES[index],
                value: features.0[index],
            });
        }
        Ok(features)
    }

    /// Scale each feature into [0, 1]. Confidence is only clamped.
    pub fn normalize(&self, settings: &RiskSettings) -> Self {
        let v = &self.0;
        FeatureVector([
            normalize(v[Self::TOTAL_DISTANCE], settings.distance_scale_m),
            normalize(v[Self::AVERAGE_SPEED], settings.speed_scale_kmh),
            normalize(v[Self::ROUTE_VARIATION], settings.variation_scale),
            normalize(v[Self::ANOMALY_COUNT], settings.anomaly_scale),
            normalize(v[Self::HIGH_SEVERITY_COUNT], settings.high_severity_scale),
            normalize(v[Self::SAMPLE_COUNT], settings.sample_scale),
            normalize(v[Self::SECONDS_SINCE_LAST], settings.recency_scale_secs),
            clamp01(v[Self::CONFIDENCE]),
        ])
    }
}
