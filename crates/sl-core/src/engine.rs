//! Analytics orchestration.
//!
//! [`AnalyticsEngine`] owns the collaborator handles (store, optional
//! inference backend) and the four analytics components, and runs the data
//! flow for one identifier or one batch:
//!
//! ```text
//! store ──▶ samples ──▶ RouteProfiler ──▶ AnomalyDetector ──▶ RiskScorer
//!   │                                                          │
//!   └──▶ sightings ──▶ TrendAggregator                          ▼
//!                                                        IdentifierReport
//! ```
//!
//! Collaborator failures never escape: a failing identifier produces the
//! zero profile, no findings and the neutral assessment, with the error
//! recorded on the report and logged.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_common::{Identifier, MovementSample, Sighting, StructuredError, TimeWindow};
use sl_config::AnalyticsConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::anomaly::{AnomalyDetector, AnomalyFinding, AnomalyHook};
use crate::inference::InferenceBackend;
use crate::logging::{event_names, Stage};
use crate::risk::{RiskAssessment, RiskScorer};
use crate::route::{RouteProfile, RouteProfiler};
use crate::store::{SampleStore, StoreError, TimeoutStore};
use crate::trend::{BatchSummary, FindingsByIdentifier, TrendAggregator, TrendInsight};

/// Everything computed for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdentifierReport {
    pub identifier: Identifier,
    pub profile: RouteProfile,
    pub findings: Vec<AnomalyFinding>,
    pub assessment: RiskAssessment,
    /// Why the report is degraded, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

impl IdentifierReport {
    /// Zero profile, no findings, neutral assessment.
    pub fn degraded(identifier: Identifier, error: &sl_common::Error) -> Self {
        IdentifierReport {
            identifier: identifier.clone(),
            profile: RouteProfile::zero(),
            findings: Vec::new(),
            assessment: RiskAssessment::neutral(identifier),
            error: Some(StructuredError::from(error)),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}: risk {:.2} ({:?}), {} findings, {} events, {:.1} km/h over {} samples",
            self.identifier,
            self.assessment.risk_score,
            self.assessment.score_source,
            self.findings.len(),
            self.assessment.predicted_events.len(),
            self.profile.average_speed_kmh,
            self.profile.sample_count,
        )
    }
}

pub struct AnalyticsEngine {
    store: Arc<dyn SampleStore>,
    config: AnalyticsConfig,
    profiler: RouteProfiler,
    detector: AnomalyDetector,
    scorer: RiskScorer,
    aggregator: TrendAggregator,
}

impl std::fmt::Debug for AnalyticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsEngine")
            .field("config", &self.config)
            .field("scorer", &self.scorer)
            .finish_non_exhaustive()
    }
}

impl AnalyticsEngine {
    /// Build an engine over `store`. Every store call is bounded by
    /// `store.query_timeout_ms`.
    pub fn new(
        store: Arc<dyn SampleStore>,
        config: AnalyticsConfig,
    ) -> Result<Self, sl_common::Error> {
        let aggregator = TrendAggregator::new(config.trend.clone())?;
        let store: Arc<dyn SampleStore> =
            Arc::new(TimeoutStore::new(store, config.store.query_timeout())?);

        Ok(AnalyticsEngine {
            store,
            profiler: RouteProfiler::new(config.route.clone()),
            detector: AnomalyDetector::new(config.anomaly.clone()),
            scorer: RiskScorer::new(config.risk.clone()),
            aggregator,
            config,
        })
    }

    pub fn with_inference(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.scorer = self.scorer.with_backend(backend);
        self
    }

    pub fn with_anomaly_hook(mut self, hook: Arc<dyn AnomalyHook>) -> Self {
        self.detector = self.detector.with_hook(hook);
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Run profile, detection and scoring for one identifier.
    pub fn analyze_identifier(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> IdentifierReport {
        let identifier = identifier.normalized();
        let _span = tracing::info_span!("analyze", identifier = %identifier).entered();

        let (sighting, samples) = match self.load(&identifier, window) {
            Ok(loaded) => loaded,
            Err(e) => return IdentifierReport::degraded(identifier, &e),
        };

        let mut failure = None;
        let profile = {
            let _stage = tracing::info_span!("stage", stage = %Stage::Profile).entered();
            recover(Stage::Profile, self.profiler.try_profile(&samples), &mut failure)
                .unwrap_or_else(RouteProfile::zero)
        };
        let findings = {
            let _stage = tracing::info_span!("stage", stage = %Stage::Detect).entered();
            let detected = self.detector.try_detect(&sighting, &profile, &samples, now);
            recover(Stage::Detect, detected, &mut failure).unwrap_or_default()
        };
        let assessment = {
            let _stage = tracing::info_span!("stage", stage = %Stage::Score).entered();
            let assessed = self
                .scorer
                .try_assess(&sighting, &profile, &findings, &samples, now);
            recover(Stage::Score, assessed, &mut failure)
                .unwrap_or_else(|| RiskAssessment::neutral(identifier.clone()))
        };

        IdentifierReport {
            identifier,
            profile,
            findings,
            assessment,
            error: failure,
        }
    }

    /// Analyse each identifier independently; one failure never affects the
    /// others.
    pub fn analyze_batch(
        &self,
        identifiers: &[Identifier],
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Vec<IdentifierReport> {
        identifiers
            .iter()
            .map(|id| self.analyze_identifier(id, window, now))
            .collect()
    }

    /// Route profile only. Store failures give the zero profile.
    pub fn profile_identifier(&self, identifier: &Identifier, window: TimeWindow) -> RouteProfile {
        let identifier = identifier.normalized();
        let _span = tracing::info_span!("profile", identifier = %identifier).entered();
        match self.samples(&identifier, window) {
            Ok(samples) => self.profile_samples(&samples),
            Err(_) => RouteProfile::zero(),
        }
    }

    /// Anomaly findings only. Store failures and a missing sighting give no
    /// findings.
    pub fn findings_for(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyFinding> {
        let identifier = identifier.normalized();
        let _span = tracing::info_span!("findings", identifier = %identifier).entered();
        match self.load(&identifier, window) {
            Ok((sighting, samples)) => {
                let profile = self.profile_samples(&samples);
                self.detect(&sighting, &profile, &samples, now)
            }
            Err(_) => Vec::new(),
        }
    }

    /// Trend insights over the sightings in `window`. With `with_findings`,
    /// each identifier in the batch is profiled and checked so the anomaly
    /// cluster can report finding counts.
    pub fn trends(
        &self,
        window: TimeWindow,
        with_findings: bool,
        now: DateTime<Utc>,
    ) -> Vec<TrendInsight> {
        let _span = tracing::info_span!("trends", stage = %Stage::Trend).entered();
        let Ok(sightings) = self.sightings(window) else {
            return Vec::new();
        };

        let joined = with_findings.then(|| self.join_findings(&sightings, window, now));
        self.aggregator.aggregate_at(&sightings, joined.as_ref(), now)
    }

    /// Descriptive statistics over the sightings in `window`.
    pub fn summary(&self, window: TimeWindow) -> BatchSummary {
        let _span = tracing::info_span!("summary", stage = %Stage::Trend).entered();
        match self.sightings(window) {
            Ok(sightings) => self.aggregator.summarize(&sightings),
            Err(_) => BatchSummary::default(),
        }
    }

    fn join_findings(
        &self,
        sightings: &[Sighting],
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> FindingsByIdentifier {
        // Latest sighting per identifier within the batch
        let mut latest: BTreeMap<Identifier, &Sighting> = BTreeMap::new();
        for s in sightings {
            let entry = latest.entry(s.identifier.normalized()).or_insert(s);
            if s.captured_at > entry.captured_at {
                *entry = s;
            }
        }

        let mut joined = FindingsByIdentifier::new();
        for (identifier, sighting) in latest {
            let _span = tracing::info_span!("join", identifier = %identifier).entered();
            let Ok(samples) = self.samples(&identifier, window) else {
                continue;
            };
            let profile = self.profile_samples(&samples);
            let findings = self.detect(sighting, &profile, &samples, now);
            joined.insert(identifier, findings);
        }
        joined
    }

    fn load(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
    ) -> Result<(Sighting, Vec<MovementSample>), sl_common::Error> {
        let _stage = tracing::info_span!("stage", stage = %Stage::Load).entered();
        let sighting = self
            .store
            .sighting_by_identifier(identifier)
            .map_err(|e| self.store_failed("sighting_by_identifier", e))?;
        let Some(sighting) = sighting else {
            tracing::warn!(
                target: event_names::STORE_SIGHTING_MISSING,
                message = "no sighting for identifier; reporting neutral results",
            );
            return Err(sl_common::Error::IdentifierNotFound {
                identifier: identifier.to_string(),
            });
        };
        let samples = self.samples(identifier, window)?;
        Ok((sighting, samples))
    }

    fn samples(
        &self,
        identifier: &Identifier,
        window: TimeWindow,
    ) -> Result<Vec<MovementSample>, sl_common::Error> {
        let mut samples = self
            .store
            .samples_for_identifier(identifier, window)
            .map_err(|e| self.store_failed("samples_for_identifier", e))?;
        samples.sort_by_key(|s| s.captured_at);
        tracing::debug!(
            target: event_names::STORE_LOADED,
            samples = samples.len(),
            message = "movement samples loaded",
        );
        Ok(samples)
    }

    fn sightings(&self, window: TimeWindow) -> Result<Vec<Sighting>, sl_common::Error> {
        let sightings = self
            .store
            .sightings_in_range(window)
            .map_err(|e| self.store_failed("sightings_in_range", e))?;
        tracing::debug!(
            target: event_names::STORE_LOADED,
            sightings = sightings.len(),
            message = "sightings loaded",
        );
        Ok(sightings)
    }

    fn store_failed(&self, query: &'static str, err: StoreError) -> sl_common::Error {
        tracing::error!(
            target: event_names::STORE_QUERY_FAILED,
            query,
            error = %err,
            message = "store query failed",
        );
        err.into()
    }

    fn profile_samples(&self, samples: &[MovementSample]) -> RouteProfile {
        let _stage = tracing::info_span!("stage", stage = %Stage::Profile).entered();
        self.profiler.profile(samples)
    }

    fn detect(
        &self,
        sighting: &Sighting,
        profile: &RouteProfile,
        samples: &[MovementSample],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyFinding> {
        let _stage = tracing::info_span!("stage", stage = %Stage::Detect).entered();
        self.detector.detect(sighting, profile, samples, now)
    }
}

/// Pass a stage result through, logging a failure and keeping the first one
/// for the report.
fn recover<T, E>(stage: Stage, result: Result<T, E>, failure: &mut Option<StructuredError>) -> Option<T>
where
    E: Into<sl_common::Error>,
{
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            let err: sl_common::Error = e.into();
            tracing::error!(
                target: event_names::ENGINE_STAGE_FAILED,
                stage = %stage,
                error = %err,
                message = "analytics stage failed; using its neutral result",
            );
            failure.get_or_insert_with(|| {
                StructuredError::from(&err).with_context("stage", stage.to_string())
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyType;
    use crate::risk::ScoreSource;
    use crate::store::MemoryStore;
    use crate::trend::TrendType;
    use chrono::{Duration, TimeZone};
    use sl_common::ErrorCategory;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn engine(store: MemoryStore) -> AnalyticsEngine {
        AnalyticsEngine::new(Arc::new(store), AnalyticsConfig::default()).unwrap()
    }

    fn fast_mover() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_sighting(Sighting::new("FAST-1", t0(), 0.9))
            .unwrap();
        for i in 0..5 {
            store
                .insert_sample(MovementSample::new(
                    "FAST-1",
                    0.0,
                    0.45 * f64::from(i),
                    t0() + Duration::seconds(150 * i64::from(i)),
                ))
                .unwrap();
        }
        store
    }

    #[test]
    fn fast_mover_is_flagged_end_to_end() {
        let report =
            engine(fast_mover()).analyze_identifier(&Identifier::new("fast-1"), TimeWindow::all(), t0());
        assert!(!report.is_degraded());
        assert!(report.profile.average_speed_kmh > 1100.0);
        assert_eq!(report.findings[0].anomaly_type, AnomalyType::RapidMovement);
        assert_eq!(report.assessment.score_source, ScoreSource::Heuristic);
        assert_eq!(report.assessment.risk_score, 1.0);
    }

    #[test]
    fn missing_sighting_degrades() {
        let report = engine(MemoryStore::new()).analyze_identifier(
            &Identifier::new("GHOST"),
            TimeWindow::all(),
            t0(),
        );
        assert!(report.is_degraded());
        assert!(report.profile.is_zero());
        assert!(report.findings.is_empty());
        assert!(report.assessment.is_neutral());
        assert_eq!(report.error.unwrap().code, 22);
    }

    struct Broken;

    impl SampleStore for Broken {
        fn samples_for_identifier(
            &self,
            _identifier: &Identifier,
            _window: TimeWindow,
        ) -> Result<Vec<MovementSample>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn sightings_in_range(&self, _window: TimeWindow) -> Result<Vec<Sighting>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn sighting_by_identifier(
            &self,
            identifier: &Identifier,
        ) -> Result<Option<Sighting>, StoreError> {
            Ok(Some(Sighting::new(identifier.as_str(), t0(), 0.9)))
        }
    }

    #[test]
    fn store_failures_never_escape() {
        let engine = AnalyticsEngine::new(Arc::new(Broken), AnalyticsConfig::default()).unwrap();
        let report = engine.analyze_identifier(&Identifier::new("AB"), TimeWindow::all(), t0());
        assert_eq!(report.error.as_ref().unwrap().category, ErrorCategory::Store);
        assert!(report.assessment.is_neutral());
        assert!(engine.trends(TimeWindow::all(), true, t0()).is_empty());
        assert_eq!(engine.summary(TimeWindow::all()), BatchSummary::default());
        assert!(engine
            .profile_identifier(&Identifier::new("AB"), TimeWindow::all())
            .is_zero());
    }

    #[test]
    fn batch_isolates_failures() {
        let reports = engine(fast_mover()).analyze_batch(
            &[Identifier::new("FAST-1"), Identifier::new("GHOST")],
            TimeWindow::all(),
            t0(),
        );
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].is_degraded());
        assert!(reports[1].is_degraded());
    }

    #[test]
    fn trends_join_findings() {
        let store = fast_mover();
        store
            .insert_sighting(Sighting::new("FAST-1", t0() + Duration::minutes(5), 0.3))
            .unwrap();
        let insights = engine(store).trends(TimeWindow::all(), true, t0());
        let cluster = insights
            .iter()
            .find(|i| i.trend_type == TrendType::AnomalyCluster)
            .unwrap();
        assert_eq!(cluster.affected_count, 1);
        let json = serde_json::to_value(cluster).unwrap();
        assert_eq!(json["details"]["findings_per_identifier"]["FAST-1"], 2);
    }

    #[test]
    fn stage_failure_is_recorded_on_report() {
        let store = MemoryStore::new();
        store
            .insert_sighting(Sighting::new("BAD-GPS", t0(), 0.9))
            .unwrap();
        store
            .insert_sample(MovementSample::new("BAD-GPS", 0.0, 0.0, t0()))
            .unwrap();
        store
            .insert_sample(MovementSample::new("BAD-GPS", 95.0, 0.0, t0() + Duration::hours(1)))
            .unwrap();

        let report =
            engine(store).analyze_identifier(&Identifier::new("bad-gps"), TimeWindow::all(), t0());
        assert!(report.is_degraded());
        assert!(report.profile.is_zero());
        assert_eq!(report.assessment.score_source, ScoreSource::Heuristic);

        let error = report.error.unwrap();
        assert_eq!(error.code, 41);
        assert_eq!(error.category, ErrorCategory::Analysis);
        assert_eq!(error.context["stage"], serde_json::json!("profile"));
    }

    #[test]
    fn component_errors_convert() {
        use crate::risk::ScoringError;
        use crate::trend::TrendError;

        let err: sl_common::Error = ScoringError::NonFiniteFeature {
            feature: "sighting_confidence",
            value: f64::NAN,
        }
        .into();
        assert_eq!(err.code(), 42);

        let err: sl_common::Error = TrendError::InvalidMarker {
            pattern: "[".into(),
            message: "unclosed".into(),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn invalid_markers_fail_construction() {
        let mut config = AnalyticsConfig::default();
        config.trend.risk_markers.location_patterns = vec!["[".into()];
        let err = AnalyticsEngine::new(Arc::new(MemoryStore::new()), config).unwrap_err();
        assert_eq!(err.code(), 11);
    }
}
