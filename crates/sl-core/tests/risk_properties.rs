//! Property-based tests for risk scoring and trend intensity.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use sl_common::{MovementSample, Sighting};
use sl_config::RiskSettings;
use sl_core::inference::{Activation, LinearModel};
use sl_core::risk::{FeatureVector, PredictedEventType, RiskScorer, ScoreSource, FEATURE_COUNT};
use sl_core::route::RouteProfile;
use sl_core::trend::TrendIntensity;
use std::sync::Arc;

fn raw_features() -> impl Strategy<Value = FeatureVector> {
    prop::array::uniform8(0.0..1e7f64).prop_map(FeatureVector::new)
}

/// Any f64 at all: negatives, subnormals, infinities and NaN.
fn hostile_features() -> impl Strategy<Value = FeatureVector> {
    prop::array::uniform8(prop::num::f64::ANY).prop_map(FeatureVector::new)
}

fn hostile_profile() -> impl Strategy<Value = RouteProfile> {
    (
        prop::num::f64::ANY,
        prop::num::f64::ANY,
        prop::num::f64::ANY,
    )
        .prop_map(|(total_distance_m, average_speed_kmh, route_variation)| RouteProfile {
            sample_count: 2,
            total_distance_m,
            average_speed_kmh,
            route_variation,
            ..RouteProfile::default()
        })
}

fn weights() -> impl Strategy<Value = [f64; FEATURE_COUNT]> {
    prop::array::uniform8(-50.0..50.0f64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Every normalised feature lies in [0, 1].
    #[test]
    fn normalized_features_in_unit_interval(raw in raw_features()) {
        let normalized = raw.normalize(&RiskSettings::default());
        for (i, value) in normalized.values().iter().enumerate() {
            prop_assert!((0.0..=1.0).contains(value), "feature {} = {}", i, value);
        }
    }

    /// The heuristic score and every event probability stay in [0, 1].
    #[test]
    fn heuristic_and_events_in_unit_interval(raw in raw_features()) {
        let scorer = RiskScorer::new(RiskSettings::default());
        let normalized = raw.normalize(scorer.settings());

        let score = scorer.heuristic_score(&normalized);
        prop_assert!((0.0..=1.0).contains(&score), "heuristic {}", score);

        for event_type in PredictedEventType::ALL {
            let p = event_type.probability(&normalized);
            prop_assert!((0.0..=1.0).contains(&p), "{:?} = {}", event_type, p);
        }
    }

    /// Whatever a linear model returns, the final score is clamped to [0, 1].
    #[test]
    fn model_scores_are_clamped(
        raw in raw_features(),
        w in weights(),
        bias in -50.0..50.0f64,
        logistic in any::<bool>(),
    ) {
        let activation = if logistic { Activation::Logistic } else { Activation::Identity };
        let scorer = RiskScorer::new(RiskSettings::default())
            .with_backend(Arc::new(LinearModel::new(w, bias, activation)));
        let normalized = raw.normalize(scorer.settings());

        let (score, _source) = scorer.score_features(&normalized);
        prop_assert!((0.0..=1.0).contains(&score), "score {}", score);
    }

    /// Hostile raw values still normalise into [0, 1] and score into [0, 1].
    #[test]
    fn hostile_features_score_in_unit_interval(
        raw in hostile_features(),
        w in weights(),
        bias in -50.0..50.0f64,
    ) {
        let settings = RiskSettings::default();
        let normalized = raw.normalize(&settings);
        for value in normalized.values() {
            prop_assert!((0.0..=1.0).contains(value), "normalised {}", value);
        }

        let heuristic = RiskScorer::new(settings.clone());
        let (score, _) = heuristic.score_features(&normalized);
        prop_assert!((0.0..=1.0).contains(&score), "heuristic {}", score);

        let model = RiskScorer::new(settings)
            .with_backend(Arc::new(LinearModel::new(w, bias, Activation::Identity)));
        let (score, _) = model.score_features(&normalized);
        prop_assert!((0.0..=1.0).contains(&score), "model {}", score);
    }

    /// A full assessment over hostile inputs is either in range or exactly
    /// the neutral default.
    #[test]
    fn hostile_assessment_is_bounded_or_neutral(
        profile in hostile_profile(),
        confidence in prop::num::f64::ANY,
        minutes_ago in -10_000i64..10_000,
    ) {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let sighting = Sighting::new("HOSTILE-1", now, confidence);
        let samples = vec![
            MovementSample::new("HOSTILE-1", 0.0, 0.0, now - Duration::minutes(minutes_ago)),
        ];

        let assessment = RiskScorer::default().assess(&sighting, &profile, &[], &samples, now);
        let all_finite = confidence.is_finite()
            && profile.total_distance_m.is_finite()
            && profile.average_speed_kmh.is_finite()
            && profile.route_variation.is_finite();

        if all_finite {
            prop_assert_eq!(assessment.score_source, ScoreSource::Heuristic);
            prop_assert!((0.0..=1.0).contains(&assessment.risk_score));
            for event in &assessment.predicted_events {
                prop_assert!((0.0..=1.0).contains(&event.probability));
            }
        } else {
            prop_assert!(assessment.is_neutral());
            prop_assert_eq!(assessment.risk_score, 0.0);
            prop_assert!(assessment.predicted_events.is_empty());
        }
    }

    /// Predicted events never precede the reference instant and never exceed
    /// the horizon.
    #[test]
    fn event_lead_times_within_horizon(raw in raw_features()) {
        let settings = RiskSettings::default();
        let horizon = chrono::Duration::days(settings.event_horizon_days as i64);
        let scorer = RiskScorer::new(settings);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        for event in scorer.predict_events(&raw.normalize(scorer.settings()), now) {
            prop_assert!(event.estimated_time >= now);
            prop_assert!(event.estimated_time <= now + horizon);
        }
    }

    /// Intensity is monotone in the subset size.
    #[test]
    fn intensity_is_monotone(a in 0usize..500, b in 0usize..500) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(TrendIntensity::from_count(lo) <= TrendIntensity::from_count(hi));
    }

    /// Intensity buckets match the fixed cut points.
    #[test]
    fn intensity_buckets(count in 0usize..1000) {
        let expected = if count > 100 {
            TrendIntensity::Critical
        } else if count > 50 {
            TrendIntensity::High
        } else if count > 20 {
            TrendIntensity::Moderate
        } else {
            TrendIntensity::Low
        };
        prop_assert_eq!(TrendIntensity::from_count(count), expected);
    }
}
