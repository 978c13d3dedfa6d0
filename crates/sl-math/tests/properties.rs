//! Property-based tests for sl-math functions.
//!
//! Uses proptest to verify geometric and statistical properties hold across many random inputs.

use proptest::prelude::*;
use sl_math::{clamp01, distance, normalize, population_variance, GeoPoint, EARTH_RADIUS_M};

/// Tolerance for floating point comparisons, in meters.
const TOL_M: f64 = 1e-6;

fn point() -> impl Strategy<Value = GeoPoint> {
    (-90.0..=90.0f64, -180.0..=180.0f64).prop_map(|(lat, lon)| GeoPoint::new(lat, lon))
}

// ============================================================================
// distance properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// distance(a, a) is exactly zero.
    #[test]
    fn distance_identity(a in point()) {
        prop_assert_eq!(distance(a, a), 0.0);
    }

    /// distance is symmetric.
    #[test]
    fn distance_symmetric(a in point(), b in point()) {
        let ab = distance(a, b);
        let ba = distance(b, a);
        prop_assert!((ab - ba).abs() <= TOL_M, "d(a,b)={} != d(b,a)={}", ab, ba);
    }

    /// distance is never negative and never exceeds half the circumference.
    #[test]
    fn distance_bounded(a in point(), b in point()) {
        let d = distance(a, b);
        prop_assert!(d >= 0.0, "negative distance {}", d);
        prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + TOL_M, "distance {} too large", d);
    }

    /// Triangle inequality holds on the sphere.
    #[test]
    fn distance_triangle(a in point(), b in point(), c in point()) {
        let ac = distance(a, c);
        let via_b = distance(a, b) + distance(b, c);
        prop_assert!(ac <= via_b + 1e-3, "d(a,c)={} > d(a,b)+d(b,c)={}", ac, via_b);
    }
}

// ============================================================================
// statistics properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Variance is never negative.
    #[test]
    fn variance_non_negative(values in prop::collection::vec(-180.0..180.0f64, 0..64)) {
        prop_assert!(population_variance(&values) >= 0.0);
    }

    /// clamp01 always lands in [0, 1].
    #[test]
    fn clamp01_in_unit_interval(x in any::<f64>()) {
        let c = clamp01(x);
        prop_assert!((0.0..=1.0).contains(&c), "clamp01({})={}", x, c);
    }

    /// normalize always lands in [0, 1], whatever the inputs.
    #[test]
    fn normalize_in_unit_interval(x in any::<f64>(), scale in any::<f64>()) {
        let n = normalize(x, scale);
        prop_assert!((0.0..=1.0).contains(&n), "normalize({}, {})={}", x, scale, n);
    }
}
