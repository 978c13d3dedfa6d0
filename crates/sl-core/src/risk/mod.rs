//! Risk scoring.
//!
//! A [`RiskScorer`] turns an identifier's profile, findings and samples into
//! a [`RiskAssessment`]: a score in [0, 1], predicted events and recommended
//! actions. The score comes from the inference backend when one is
//! configured and healthy; otherwise from a linear heuristic over speed and
//! route variation. Feature problems yield the neutral assessment.

mod features;

pub use features::{FeatureVector, FEATURE_COUNT};

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_common::{Identifier, MovementSample, Sighting};
use sl_config::RiskSettings;
use sl_math::clamp01;
use std::sync::Arc;
use thiserror::Error;

use crate::anomaly::AnomalyFinding;
use crate::inference::{InferenceBackend, InferenceError};
use crate::logging::event_names;
use crate::route::RouteProfile;

pub const FULL_CHECK_ACTION: &str = "Perform full security check";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("feature {feature} is not finite ({value})")]
    NonFiniteFeature { feature: &'static str, value: f64 },
}

impl From<ScoringError> for sl_common::Error {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::NonFiniteFeature { feature, .. } => sl_common::Error::NonFinite {
                field: feature.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PredictedEventType {
    TheftRisk,
    MaintenanceNeeded,
    UnusualMovement,
    PotentialViolation,
    HighMileage,
}

impl PredictedEventType {
    pub const ALL: [PredictedEventType; 5] = [
        PredictedEventType::TheftRisk,
        PredictedEventType::MaintenanceNeeded,
        PredictedEventType::UnusualMovement,
        PredictedEventType::PotentialViolation,
        PredictedEventType::HighMileage,
    ];

    /// Probability over a normalised feature vector, clamped to [0, 1].
    pub fn probability(self, n: &FeatureVector) -> f64 {
        use FeatureVector as F;
        let p = match self {
            PredictedEventType::TheftRisk => {
                0.5 * n.at(F::AVERAGE_SPEED) + 0.3 * n.at(F::ROUTE_VARIATION)
            }
            PredictedEventType::MaintenanceNeeded => {
                0.4 * n.at(F::TOTAL_DISTANCE) + 0.6 * n.at(F::CONFIDENCE)
            }
            PredictedEventType::UnusualMovement => {
                0.7 * n.at(F::ROUTE_VARIATION) + 0.3 * n.at(F::ANOMALY_COUNT)
            }
            PredictedEventType::PotentialViolation => {
                0.6 * n.at(F::AVERAGE_SPEED) + 0.4 * n.at(F::HIGH_SEVERITY_COUNT)
            }
            PredictedEventType::HighMileage => {
                0.8 * n.at(F::TOTAL_DISTANCE) + 0.2 * n.at(F::SAMPLE_COUNT)
            }
        };
        clamp01(p)
    }

    pub fn action(self) -> &'static str {
        match self {
            PredictedEventType::TheftRisk => "Activate tracking and alert authorities",
            PredictedEventType::MaintenanceNeeded => "Schedule preventive maintenance",
            PredictedEventType::UnusualMovement => "Investigate suspicious movement patterns",
            PredictedEventType::PotentialViolation => "Check for possible traffic violations",
            PredictedEventType::HighMileage => "Assess need for parts replacement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PredictedEvent {
    #[serde(rename = "type")]
    pub event_type: PredictedEventType,
    pub probability: f64,
    pub estimated_time: DateTime<Utc>,
}

/// Where a risk score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Model,
    Heuristic,
    /// Scoring failed; the assessment carries no information.
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskAssessment {
    pub identifier: Identifier,
    pub risk_score: f64,
    pub score_source: ScoreSource,
    pub predicted_events: Vec<PredictedEvent>,
    pub recommended_actions: Vec<String>,
}

impl RiskAssessment {
    /// Score 0, nothing predicted, nothing recommended.
    pub fn neutral(identifier: Identifier) -> Self {
        RiskAssessment {
            identifier,
            risk_score: 0.0,
            score_source: ScoreSource::Neutral,
            predicted_events: Vec::new(),
            recommended_actions: Vec::new(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.score_source == ScoreSource::Neutral
    }

    pub fn event(&self, event_type: PredictedEventType) -> Option<&PredictedEvent> {
        self.predicted_events
            .iter()
            .find(|e| e.event_type == event_type)
    }
}

#[derive(Clone)]
pub struct RiskScorer {
    settings: RiskSettings,
    backend: Option<Arc<dyn InferenceBackend>>,
}

impl std::fmt::Debug for RiskScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskScorer")
            .field("settings", &self.settings)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        RiskScorer::new(RiskSettings::default())
    }
}

impl RiskScorer {
    pub fn new(settings: RiskSettings) -> Self {
        RiskScorer {
            settings,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Assess one identifier. Never fails: feature errors are logged and the
    /// neutral assessment is returned.
    pub fn assess(
        &self,
        sighting: &Sighting,
        profile: &RouteProfile,
        findings: &[AnomalyFinding],
        samples: &[MovementSample],
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        match self.try_assess(sighting, profile, findings, samples, now) {
            Ok(assessment) => {
                tracing::debug!(
                    target: event_names::SCORE_FINISHED,
                    identifier = %assessment.identifier,
                    risk_score = assessment.risk_score,
                    source = ?assessment.score_source,
                    events = assessment.predicted_events.len(),
                    message = "risk assessed",
                );
                assessment
            }
            Err(e) => {
                tracing::error!(
                    target: event_names::SCORE_FAILED,
                    identifier = %sighting.identifier,
                    error = %e,
                    message = "risk scoring failed; using neutral assessment",
                );
                RiskAssessment::neutral(sighting.identifier.normalized())
            }
        }
    }

    pub fn try_assess(
        &self,
        sighting: &Sighting,
        profile: &RouteProfile,
        findings: &[AnomalyFinding],
        samples: &[MovementSample],
        now: DateTime<Utc>,
    ) -> Result<RiskAssessment, ScoringError> {
        let raw = FeatureVector::build(sighting, profile, findings, samples, now)?;
        let normalized = raw.normalize(&self.settings);

        let (risk_score, score_source) = self.score_features(&normalized);
        let predicted_events = self.predict_events(&normalized, now);
        let recommended_actions = self.recommended_actions(risk_score, &predicted_events);

        Ok(RiskAssessment {
            identifier: sighting.identifier.normalized(),
            risk_score,
            score_source,
            predicted_events,
            recommended_actions,
        })
    }

    /// Score a normalised vector with the backend, falling back to the
    /// heuristic when there is none or it fails. Always in [0, 1].
    pub fn score_features(&self, normalized: &FeatureVector) -> (f64, ScoreSource) {
        let Some(backend) = &self.backend else {
            return (self.heuristic_score(normalized), ScoreSource::Heuristic);
        };

        let result = backend
            .score(normalized, self.settings.inference_timeout())
            .and_then(|score| {
                if score.is_finite() {
                    Ok(score)
                } else {
                    Err(InferenceError::InvalidOutput(score))
                }
            });

        match result {
            Ok(score) => (clamp01(score), ScoreSource::Model),
            Err(e) => {
                tracing::warn!(
                    target: event_names::SCORE_HEURISTIC_FALLBACK,
                    backend = %backend.name(),
                    error = %e,
                    message = "inference failed; using heuristic score",
                );
                (self.heuristic_score(normalized), ScoreSource::Heuristic)
            }
        }
    }

    /// Weighted speed plus weighted route variation, clamped.
    pub fn heuristic_score(&self, normalized: &FeatureVector) -> f64 {
        clamp01(
            self.settings.speed_weight * normalized.at(FeatureVector::AVERAGE_SPEED)
                + self.settings.variation_weight * normalized.at(FeatureVector::ROUTE_VARIATION),
        )
    }

    /// Events whose probability exceeds the event threshold, in fixed type
    /// order.
    pub fn predict_events(&self, normalized: &FeatureVector, now: DateTime<Utc>) -> Vec<PredictedEvent> {
        PredictedEventType::ALL
            .iter()
            .filter_map(|&event_type| {
                let probability = event_type.probability(normalized);
                (probability > self.settings.event_threshold).then(|| PredictedEvent {
                    event_type,
                    probability,
                    estimated_time: now + self.lead_time(probability),
                })
            })
            .collect()
    }

    /// Whole days: trunc(probability × horizon).
    fn lead_time(&self, probability: f64) -> Duration {
        let days = (probability * self.settings.event_horizon_days).trunc();
        Duration::days(days as i64)
    }

    pub fn recommended_actions(&self, risk_score: f64, events: &[PredictedEvent]) -> Vec<String> {
        let mut actions = Vec::with_capacity(events.len() + 1);
        if risk_score > self.settings.full_check_threshold {
            actions.push(FULL_CHECK_ACTION.to_string());
        }
        actions.extend(events.iter().map(|e| e.event_type.action().to_string()));
        actions
    }
}
