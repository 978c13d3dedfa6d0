//! Anomaly detection for a single identifier.
//!
//! Independent checks run in a fixed order (rapid movement, unusual location,
//! frequency deviation, multiple jurisdictions, potential cloning). Each one
//! is silent or emits a single [`AnomalyFinding`]. The last two are delegated
//! to an [`AnomalyHook`]; the default hook never fires.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sl_common::{Identifier, MovementSample, Sighting};
use sl_config::AnomalyThresholds;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::logging::event_names;
use crate::route::RouteProfile;

/// Free-form, type-specific finding details.
pub type FindingDetails = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    UnusualLocation,
    RapidMovement,
    FrequencyDeviation,
    MultipleJurisdictions,
    PotentialCloning,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyFinding {
    pub identifier: Identifier,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: AnomalySeverity,
    #[serde(default)]
    pub details: FindingDetails,
    pub timestamp: DateTime<Utc>,
}

impl AnomalyFinding {
    pub fn new(
        identifier: Identifier,
        anomaly_type: AnomalyType,
        severity: AnomalySeverity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        AnomalyFinding {
            identifier,
            anomaly_type,
            severity,
            details: FindingDetails::new(),
            timestamp,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn is_high_severity(&self) -> bool {
        self.severity == AnomalySeverity::High
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("sample {index} belongs to {found}, expected {expected}")]
    IdentifierMismatch {
        index: usize,
        expected: Identifier,
        found: Identifier,
    },

    #[error("route profile has non-finite {field}")]
    NonFiniteProfile { field: &'static str },
}

impl From<DetectionError> for sl_common::Error {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::IdentifierMismatch { .. } => {
                sl_common::Error::InvalidSample(err.to_string())
            }
            DetectionError::NonFiniteProfile { field } => sl_common::Error::NonFinite {
                field: field.to_string(),
            },
        }
    }
}

/// Everything a check sees for one identifier.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub sighting: &'a Sighting,
    pub profile: &'a RouteProfile,
    pub samples: &'a [MovementSample],
}

/// Extension point for jurisdiction and cloning policies.
///
/// Implementations return the severity and details of a finding, or `None`
/// to stay silent.
pub trait AnomalyHook: Send + Sync {
    fn multiple_jurisdictions(
        &self,
        _input: &DetectionInput<'_>,
    ) -> Option<(AnomalySeverity, FindingDetails)> {
        None
    }

    fn potential_cloning(
        &self,
        _input: &DetectionInput<'_>,
    ) -> Option<(AnomalySeverity, FindingDetails)> {
        None
    }
}

/// Hook that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

impl AnomalyHook for NoHook {}

#[derive(Clone)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
    hook: Arc<dyn AnomalyHook>,
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        AnomalyDetector::new(AnomalyThresholds::default())
    }
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        AnomalyDetector {
            thresholds,
            hook: Arc::new(NoHook),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn AnomalyHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Run every check, logging failures and returning an empty list for a
    /// failing identifier.
    pub fn detect(
        &self,
        sighting: &Sighting,
        profile: &RouteProfile,
        samples: &[MovementSample],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyFinding> {
        match self.try_detect(sighting, profile, samples, now) {
            Ok(findings) => {
                tracing::debug!(
                    target: event_names::DETECT_FINISHED,
                    identifier = %sighting.identifier,
                    findings = findings.len(),
                    message = "anomaly detection finished",
                );
                findings
            }
            Err(e) => {
                tracing::error!(
                    target: event_names::DETECT_FAILED,
                    identifier = %sighting.identifier,
                    error = %e,
                    message = "anomaly detection failed; no findings reported",
                );
                Vec::new()
            }
        }
    }

    pub fn try_detect(
        &self,
        sighting: &Sighting,
        profile: &RouteProfile,
        samples: &[MovementSample],
        now: DateTime<Utc>,
    ) -> Result<Vec<AnomalyFinding>, DetectionError> {
        let identifier = sighting.identifier.normalized();
        for (index, s) in samples.iter().enumerate() {
            let found = s.identifier.normalized();
            if found != identifier {
                return Err(DetectionError::IdentifierMismatch {
                    index,
                    expected: identifier,
                    found,
                });
            }
        }
        for (field, value) in [
            ("average_speed_kmh", profile.average_speed_kmh),
            ("total_distance_m", profile.total_distance_m),
            ("route_variation", profile.route_variation),
        ] {
            if !value.is_finite() {
                return Err(DetectionError::NonFiniteProfile { field });
            }
        }

        let finding = |anomaly_type, severity| {
            AnomalyFinding::new(identifier.clone(), anomaly_type, severity, now)
        };
        let input = DetectionInput {
            sighting,
            profile,
            samples,
        };
        let mut findings = Vec::new();

        if profile.average_speed_kmh > self.thresholds.rapid_speed_kmh {
            findings.push(
                finding(AnomalyType::RapidMovement, AnomalySeverity::High)
                    .with_detail("average_speed_kmh", json!(profile.average_speed_kmh))
                    .with_detail("total_distance_m", json!(profile.total_distance_m)),
            );
        }

        if profile.route_variation > self.thresholds.route_variation {
            findings.push(
                finding(AnomalyType::UnusualLocation, AnomalySeverity::Medium)
                    .with_detail("route_variation", json!(profile.route_variation))
                    .with_detail(
                        "frequent_locations",
                        json!(profile.frequent_locations.len()),
                    ),
            );
        }

        if let Some(per_day) = captures_per_day(samples) {
            if per_day > self.thresholds.captures_per_day {
                findings.push(
                    finding(AnomalyType::FrequencyDeviation, AnomalySeverity::Medium)
                        .with_detail("captures_per_day", json!(per_day))
                        .with_detail("total_captures", json!(samples.len())),
                );
            }
        }

        if let Some((severity, details)) = self.hook.multiple_jurisdictions(&input) {
            let mut f = finding(AnomalyType::MultipleJurisdictions, severity);
            f.details = details;
            findings.push(f);
        }

        if let Some((severity, details)) = self.hook.potential_cloning(&input) {
            let mut f = finding(AnomalyType::PotentialCloning, severity);
            f.details = details;
            findings.push(f);
        }

        Ok(findings)
    }
}

/// Samples per calendar span: n / (whole days between first and last + 1).
fn captures_per_day(samples: &[MovementSample]) -> Option<f64> {
    let first = samples.iter().map(|s| s.captured_at).min()?;
    let last = samples.iter().map(|s| s.captured_at).max()?;
    let days = (last - first).num_days();
    Some(samples.len() as f64 / (days + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const PLATE: &str = "AB-12-CD";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn sighting() -> Sighting {
        Sighting::new(PLATE, t0(), 0.9)
    }

    fn profile(speed: f64, variation: f64) -> RouteProfile {
        RouteProfile {
            sample_count: 2,
            total_distance_m: 1000.0,
            average_speed_kmh: speed,
            route_variation: variation,
            ..RouteProfile::default()
        }
    }

    fn samples_every(n: usize, step: Duration) -> Vec<MovementSample> {
        (0..n)
            .map(|i| MovementSample::new(PLATE, 38.7, -9.1, t0() + step * i as i32))
            .collect()
    }

    fn types(findings: &[AnomalyFinding]) -> Vec<AnomalyType> {
        findings.iter().map(|f| f.anomaly_type).collect()
    }

    #[test]
    fn quiet_profile_has_no_findings() {
        let findings = AnomalyDetector::default().detect(
            &sighting(),
            &profile(80.0, 0.01),
            &samples_every(3, Duration::hours(1)),
            t0(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn rapid_movement_is_strictly_above_threshold() {
        let detector = AnomalyDetector::default();
        let samples = samples_every(2, Duration::hours(1));
        assert!(detector
            .detect(&sighting(), &profile(200.0, 0.0), &samples, t0())
            .is_empty());

        let findings = detector.detect(&sighting(), &profile(200.5, 0.0), &samples, t0());
        assert_eq!(types(&findings), vec![AnomalyType::RapidMovement]);
        assert_eq!(findings[0].severity, AnomalySeverity::High);
        assert_eq!(findings[0].details["average_speed_kmh"], json!(200.5));
        assert_eq!(findings[0].details["total_distance_m"], json!(1000.0));
    }

    #[test]
    fn findings_follow_fixed_order() {
        let samples = samples_every(30, Duration::minutes(5));
        let findings =
            AnomalyDetector::default().detect(&sighting(), &profile(900.0, 0.5), &samples, t0());
        assert_eq!(
            types(&findings),
            vec![
                AnomalyType::RapidMovement,
                AnomalyType::UnusualLocation,
                AnomalyType::FrequencyDeviation
            ]
        );
        assert_eq!(findings[1].severity, AnomalySeverity::Medium);
        assert_eq!(findings[2].details["total_captures"], json!(30));
        assert!(findings.iter().all(|f| f.timestamp == t0()));
    }

    #[test]
    fn captures_per_day_truncates_days() {
        // 23 samples spanning 45h50m: one whole day, so 23 / 2 = 11.5
        let samples = samples_every(24, Duration::minutes(125));
        let per_day = captures_per_day(&samples[..23]).unwrap();
        assert_eq!(per_day, 11.5);

        // 11 samples within one day: 11 > 10
        let findings = AnomalyDetector::default().detect(
            &sighting(),
            &profile(0.0, 0.0),
            &samples_every(11, Duration::minutes(10)),
            t0(),
        );
        assert_eq!(types(&findings), vec![AnomalyType::FrequencyDeviation]);

        // 10 samples within one day: not above 10
        let findings = AnomalyDetector::default().detect(
            &sighting(),
            &profile(0.0, 0.0),
            &samples_every(10, Duration::minutes(10)),
            t0(),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn mismatched_samples_yield_empty_list() {
        let mut samples = samples_every(12, Duration::minutes(1));
        samples[3].identifier = Identifier::new("ZZ-99-ZZ");
        let detector = AnomalyDetector::default();
        assert!(matches!(
            detector.try_detect(&sighting(), &profile(500.0, 0.5), &samples, t0()),
            Err(DetectionError::IdentifierMismatch { index: 3, .. })
        ));
        assert!(detector
            .detect(&sighting(), &profile(500.0, 0.5), &samples, t0())
            .is_empty());
    }

    #[test]
    fn identifier_case_is_ignored() {
        let samples = vec![MovementSample::new("ab-12-cd", 0.0, 0.0, t0())];
        assert!(AnomalyDetector::default()
            .try_detect(&sighting(), &profile(0.0, 0.0), &samples, t0())
            .is_ok());
    }

    #[test]
    fn non_finite_profile_is_rejected() {
        let result = AnomalyDetector::default().try_detect(
            &sighting(),
            &profile(f64::INFINITY, 0.0),
            &[],
            t0(),
        );
        assert_eq!(
            result,
            Err(DetectionError::NonFiniteProfile {
                field: "average_speed_kmh"
            })
        );
    }

    struct CloningPolicy;

    impl AnomalyHook for CloningPolicy {
        fn potential_cloning(
            &self,
            input: &DetectionInput<'_>,
        ) -> Option<(AnomalySeverity, FindingDetails)> {
            (input.profile.average_speed_kmh > 1000.0).then(|| {
                let mut details = FindingDetails::new();
                details.insert("reason".into(), json!("impossible travel"));
                (AnomalySeverity::Critical, details)
            })
        }
    }

    #[test]
    fn hook_findings_come_last() {
        let detector = AnomalyDetector::default().with_hook(Arc::new(CloningPolicy));
        let findings = detector.detect(
            &sighting(),
            &profile(1200.0, 0.0),
            &samples_every(2, Duration::minutes(5)),
            t0(),
        );
        assert_eq!(
            types(&findings),
            vec![AnomalyType::RapidMovement, AnomalyType::PotentialCloning]
        );
        assert_eq!(findings[1].severity, AnomalySeverity::Critical);
    }
}
