//! Route profiling.
//!
//! Turns one identifier's movement samples into a [`RouteProfile`]: total
//! distance, average speed, coordinate spread, frequently visited samples and
//! flagged consecutive transitions.

mod grid;

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_common::MovementSample;
use sl_config::RouteThresholds;
use sl_math::{distance, population_variance};
use thiserror::Error;

use crate::logging::event_names;

/// Errors raised while profiling. Never surfaced by [`RouteProfiler::profile`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouteError {
    #[error("sample {index} has invalid coordinates ({lat}, {lon})")]
    InvalidCoordinate { index: usize, lat: f64, lon: f64 },

    #[error("non-finite {field} computed from {samples} samples")]
    NonFinite { field: &'static str, samples: usize },
}

impl From<RouteError> for sl_common::Error {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::InvalidCoordinate { .. } => sl_common::Error::InvalidSample(err.to_string()),
            RouteError::NonFinite { field, .. } => sl_common::Error::NonFinite {
                field: field.to_string(),
            },
        }
    }
}

/// A consecutive pair of samples that crossed both flag thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlaggedMovement {
    pub from: MovementSample,
    pub to: MovementSample,
    pub distance_m: f64,
    pub duration_secs: i64,
}

/// Movement summary for one identifier over its samples.
///
/// `route_variation` is the mean of the latitude and longitude variances in
/// squared degrees. It is a spread proxy calibrated against the anomaly
/// threshold, not a distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteProfile {
    pub sample_count: usize,
    pub total_distance_m: f64,
    pub average_speed_kmh: f64,
    pub route_variation: f64,
    pub frequent_locations: Vec<MovementSample>,
    pub flagged_movements: Vec<FlaggedMovement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl RouteProfile {
    /// The zero-valued profile returned for unusable input.
    pub fn zero() -> Self {
        RouteProfile::default()
    }

    /// Zero-valued metrics for fewer than two samples, keeping the input count.
    fn short(samples: &[MovementSample]) -> Self {
        RouteProfile {
            sample_count: samples.len(),
            first_seen: samples.first().map(|s| s.captured_at),
            last_seen: samples.first().map(|s| s.captured_at),
            ..RouteProfile::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_distance_m == 0.0
            && self.average_speed_kmh == 0.0
            && self.route_variation == 0.0
            && self.frequent_locations.is_empty()
            && self.flagged_movements.is_empty()
    }
}

/// Builds [`RouteProfile`]s. Stateless apart from its thresholds.
#[derive(Debug, Clone, Default)]
pub struct RouteProfiler {
    thresholds: RouteThresholds,
}

impl RouteProfiler {
    pub fn new(thresholds: RouteThresholds) -> Self {
        RouteProfiler { thresholds }
    }

    pub fn thresholds(&self) -> &RouteThresholds {
        &self.thresholds
    }

    /// Profile the samples, logging any failure and returning the zero
    /// profile in its place.
    pub fn profile(&self, samples: &[MovementSample]) -> RouteProfile {
        match self.try_profile(samples) {
            Ok(profile) => {
                tracing::debug!(
                    target: event_names::ROUTE_PROFILED,
                    samples = profile.sample_count,
                    total_distance_m = profile.total_distance_m,
                    average_speed_kmh = profile.average_speed_kmh,
                    flagged = profile.flagged_movements.len(),
                    message = "route profiled",
                );
                profile
            }
            Err(e) => {
                tracing::error!(
                    target: event_names::ROUTE_PROFILE_FAILED,
                    samples = samples.len(),
                    error = %e,
                    message = "route profiling failed; using zero profile",
                );
                RouteProfile::zero()
            }
        }
    }

    /// Profile the samples. Input order does not matter; samples are sorted
    /// by capture time first.
    pub fn try_profile(&self, samples: &[MovementSample]) -> Result<RouteProfile, RouteError> {
        if samples.len() < 2 {
            return Ok(RouteProfile::short(samples));
        }

        let mut ordered = samples.to_vec();
        ordered.sort_by_key(|s| s.captured_at);

        for (index, s) in ordered.iter().enumerate() {
            if !s.point().is_valid() {
                return Err(RouteError::InvalidCoordinate {
                    index,
                    lat: s.latitude,
                    lon: s.longitude,
                });
            }
        }

        let n = ordered.len();
        let total_distance_m: f64 = ordered
            .windows(2)
            .map(|pair| distance(pair[0].point(), pair[1].point()))
            .sum();
        check_finite("total_distance_m", total_distance_m, n)?;

        let first = &ordered[0];
        let last = &ordered[n - 1];
        let elapsed_secs = (last.captured_at - first.captured_at).num_milliseconds() as f64 / 1000.0;
        let average_speed_kmh = if elapsed_secs > 0.0 {
            total_distance_m / elapsed_secs * 3.6
        } else {
            0.0
        };

        let lats: Vec<f64> = ordered.iter().map(|s| s.latitude).collect();
        let lons: Vec<f64> = ordered.iter().map(|s| s.longitude).collect();
        let route_variation = (population_variance(&lats) + population_variance(&lons)) / 2.0;
        check_finite("route_variation", route_variation, n)?;

        let frequent_locations = self.frequent_locations(&ordered);
        let flagged_movements = self.flagged_movements(&ordered);

        Ok(RouteProfile {
            sample_count: n,
            total_distance_m,
            average_speed_kmh,
            route_variation,
            frequent_locations,
            flagged_movements,
            first_seen: Some(first.captured_at),
            last_seen: Some(last.captured_at),
        })
    }

    /// Samples with more than `frequent_fraction × n` other samples within
    /// `frequent_radius_m`, in input order.
    ///
    /// Uses a grid index for large inputs; membership is identical to the
    /// pairwise scan.
    pub fn frequent_locations(&self, samples: &[MovementSample]) -> Vec<MovementSample> {
        let n = samples.len();
        if n < 2 {
            return Vec::new();
        }
        let radius = self.thresholds.frequent_radius_m;
        let counts = if n >= self.thresholds.grid_index_min_samples {
            grid::neighbour_counts(samples, radius)
                .unwrap_or_else(|| pairwise_neighbour_counts(samples, radius))
        } else {
            pairwise_neighbour_counts(samples, radius)
        };

        let min_neighbours = self.thresholds.frequent_fraction * n as f64;
        samples
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count as f64 > min_neighbours)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Consecutive pairs farther apart than `flag_distance_m` and separated
    /// by more than `flag_min_duration_secs`. Expects time-ordered samples.
    ///
    /// The duration test uses the exact elapsed time; `duration_secs` in the
    /// result is truncated to whole seconds.
    pub fn flagged_movements(&self, ordered: &[MovementSample]) -> Vec<FlaggedMovement> {
        let min_elapsed =
            Duration::try_seconds(self.thresholds.flag_min_duration_secs).unwrap_or(Duration::MAX);
        ordered
            .windows(2)
            .filter_map(|pair| {
                let distance_m = distance(pair[0].point(), pair[1].point());
                let elapsed = pair[1].captured_at - pair[0].captured_at;
                (distance_m > self.thresholds.flag_distance_m && elapsed > min_elapsed).then(
                    || FlaggedMovement {
                        from: pair[0].clone(),
                        to: pair[1].clone(),
                        distance_m,
                        duration_secs: elapsed.num_seconds(),
                    },
                )
            })
            .collect()
    }
}

fn check_finite(field: &'static str, value: f64, samples: usize) -> Result<(), RouteError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RouteError::NonFinite { field, samples })
    }
}

/// For each sample, the number of other samples within `radius_m`.
fn pairwise_neighbour_counts(samples: &[MovementSample], radius_m: f64) -> Vec<usize> {
    let mut counts = vec![0usize; samples.len()];
    for i in 0..samples.len() {
        for j in (i + 1)..samples.len() {
            if distance(samples[i].point(), samples[j].point()) <= radius_m {
                counts[i] += 1;
                counts[j] += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sl_math::METERS_PER_DEGREE_LAT;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn sample(lat: f64, lon: f64, minutes: i64) -> MovementSample {
        MovementSample::new("AB-12-CD", lat, lon, t0() + Duration::minutes(minutes))
    }

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn short_input_yields_zero_profile() {
        let profiler = RouteProfiler::default();
        assert!(profiler.profile(&[]).is_zero());
        assert_eq!(profiler.profile(&[]).sample_count, 0);
        let single = profiler.profile(&[sample(38.7, -9.1, 0)]);
        assert!(single.is_zero());
        assert_eq!(single.sample_count, 1);
        assert_eq!(single.first_seen, Some(t0()));
        assert_eq!(single.last_seen, Some(t0()));
    }

    #[test]
    fn three_point_equator_walk() {
        let samples = vec![sample(0.0, 0.0, 0), sample(0.0, 0.01, 60), sample(0.0, 0.02, 120)];
        let profile = RouteProfiler::default().profile(&samples);

        let leg = METERS_PER_DEGREE_LAT * 0.01;
        assert!(approx_eq(profile.total_distance_m, 2.0 * leg, 1e-6));
        let expected_speed = (2.0 * leg / 1000.0) / 2.0;
        assert!(approx_eq(profile.average_speed_kmh, expected_speed, 1e-9));
        // 1.1 km per hour apart never crosses the 500 m + 1 h flag
        assert!(profile.flagged_movements.is_empty());
    }

    #[test]
    fn samples_are_sorted_before_profiling() {
        let ordered = vec![sample(0.0, 0.0, 0), sample(0.0, 0.01, 60), sample(0.0, 0.02, 120)];
        let shuffled = vec![ordered[2].clone(), ordered[0].clone(), ordered[1].clone()];
        let profiler = RouteProfiler::default();
        assert_eq!(profiler.profile(&ordered), profiler.profile(&shuffled));
    }

    #[test]
    fn zero_elapsed_time_gives_zero_speed() {
        let samples = vec![sample(0.0, 0.0, 0), sample(0.0, 0.5, 0)];
        let profile = RouteProfiler::default().profile(&samples);
        assert!(profile.total_distance_m > 0.0);
        assert_eq!(profile.average_speed_kmh, 0.0);
    }

    #[test]
    fn route_variation_is_mean_of_coordinate_variances() {
        // lats {0, 2}: variance 1; lons {0, 0}: variance 0
        let samples = vec![sample(0.0, 0.0, 0), sample(2.0, 0.0, 600)];
        let profile = RouteProfiler::default().profile(&samples);
        assert!(approx_eq(profile.route_variation, 0.5, 1e-12));
    }

    #[test]
    fn flags_require_both_distance_and_duration() {
        let samples = vec![
            sample(0.0, 0.0, 0),
            // 1.1 km in 61 minutes: flagged
            sample(0.0, 0.01, 61),
            // 1.1 km in 60 minutes: duration not strictly greater
            sample(0.0, 0.02, 121),
            // 111 m in 2 hours: too short
            sample(0.0, 0.021, 241),
        ];
        let profile = RouteProfiler::default().profile(&samples);
        assert_eq!(profile.flagged_movements.len(), 1);
        let flag = &profile.flagged_movements[0];
        assert_eq!(flag.duration_secs, 61 * 60);
        assert!(flag.distance_m > 500.0);
    }

    #[test]
    fn flag_duration_compares_sub_second_precision() {
        let hour = Duration::hours(1);
        let at = |lon: f64, offset: Duration| MovementSample::new("AB-12-CD", 0.0, lon, t0() + offset);
        let profiler = RouteProfiler::default();

        let just_over = vec![at(0.0, Duration::zero()), at(0.01, hour + Duration::milliseconds(1))];
        let flags = profiler.flagged_movements(&just_over);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].duration_secs, 3600);

        let half_second = vec![at(0.0, Duration::zero()), at(0.01, hour + Duration::milliseconds(500))];
        assert_eq!(profiler.flagged_movements(&half_second).len(), 1);

        let exact = vec![at(0.0, Duration::zero()), at(0.01, hour)];
        assert!(profiler.flagged_movements(&exact).is_empty());
    }

    #[test]
    fn frequent_locations_count_other_samples() {
        // 5 samples at home, 5 spread far apart; threshold 10% of 10 = 1
        let mut samples: Vec<MovementSample> =
            (0..5).map(|i| sample(38.7, -9.1, i * 10)).collect();
        samples.extend((0..5).map(|i| sample(39.0 + i as f64, -8.0, 100 + i * 10)));
        let profile = RouteProfiler::default().profile(&samples);
        assert_eq!(profile.frequent_locations.len(), 5);
        assert!(profile
            .frequent_locations
            .iter()
            .all(|s| s.latitude == 38.7));
    }

    #[test]
    fn pair_and_spread_membership() {
        // Each sample has exactly 1 neighbour; 1 > 0.1 * 2 so both qualify
        let samples = vec![sample(38.7, -9.1, 0), sample(38.7, -9.1, 5)];
        assert_eq!(RouteProfiler::default().profile(&samples).frequent_locations.len(), 2);

        // Twenty distinct places: no sample has a neighbour
        let spread: Vec<_> = (0..20).map(|i| sample(i as f64, 0.0, i)).collect();
        assert!(RouteProfiler::default().profile(&spread).frequent_locations.is_empty());
    }

    #[test]
    fn grid_index_matches_pairwise() {
        let mut samples = Vec::new();
        for i in 0..400 {
            let jitter = (i % 17) as f64 * 0.0004;
            let lat = if i % 3 == 0 { 38.7 + jitter } else { 41.1 + jitter * 2.0 };
            let lon = -9.1 + (i % 11) as f64 * 0.0003;
            samples.push(sample(lat, lon, i));
        }
        let grid = RouteProfiler::new(RouteThresholds {
            grid_index_min_samples: 1,
            ..RouteThresholds::default()
        });
        let naive = RouteProfiler::new(RouteThresholds {
            grid_index_min_samples: usize::MAX,
            ..RouteThresholds::default()
        });
        assert_eq!(grid.frequent_locations(&samples), naive.frequent_locations(&samples));
    }

    #[test]
    fn invalid_coordinates_fall_back_to_zero() {
        let samples = vec![sample(0.0, 0.0, 0), sample(f64::NAN, 0.0, 10)];
        let profiler = RouteProfiler::default();
        assert!(matches!(
            profiler.try_profile(&samples),
            Err(RouteError::InvalidCoordinate { index: 1, .. })
        ));
        assert!(profiler.profile(&samples).is_zero());

        let out_of_range = vec![sample(0.0, 0.0, 0), sample(95.0, 0.0, 10)];
        assert!(profiler.try_profile(&out_of_range).is_err());
    }
}
