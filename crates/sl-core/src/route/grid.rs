//! Uniform lat/lon grid for neighbour counting.
//!
//! Cells are at least `radius` wide in both directions at the highest
//! latitude present, so every neighbour within `radius` sits in the same or
//! an adjacent cell. Candidates are confirmed with the exact great-circle
//! distance, which keeps membership identical to the pairwise scan.

use std::collections::HashMap;

use sl_common::MovementSample;
use sl_math::{distance, meters_per_degree_lon, METERS_PER_DEGREE_LAT};

/// Polar caps where longitude cells degenerate.
const MAX_GRID_LATITUDE: f64 = 85.0;

/// Samples this close to the antimeridian would need wrap-around cells.
const ANTIMERIDIAN_MARGIN_DEG: f64 = 0.01;

/// Cells are widened by this factor so the small-angle approximation of the
/// longitude bound can never hide a neighbour.
const CELL_MARGIN: f64 = 1.5;

/// Neighbour counts via the grid, or `None` when the input needs the
/// pairwise scan (polar caps, antimeridian, degenerate radius).
pub(super) fn neighbour_counts(samples: &[MovementSample], radius_m: f64) -> Option<Vec<usize>> {
    if !(radius_m.is_finite() && radius_m > 0.0) {
        return None;
    }

    let mut max_abs_lat: f64 = 0.0;
    for s in samples {
        max_abs_lat = max_abs_lat.max(s.latitude.abs());
        if s.longitude.abs() > 180.0 - ANTIMERIDIAN_MARGIN_DEG {
            return None;
        }
    }
    if max_abs_lat > MAX_GRID_LATITUDE {
        return None;
    }

    let cell_lat = CELL_MARGIN * radius_m / METERS_PER_DEGREE_LAT;
    let cell_lon = CELL_MARGIN * radius_m / meters_per_degree_lon(max_abs_lat);

    let key = |s: &MovementSample| -> (i64, i64) {
        (
            (s.latitude / cell_lat).floor() as i64,
            (s.longitude / cell_lon).floor() as i64,
        )
    };

    let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (idx, s) in samples.iter().enumerate() {
        cells.entry(key(s)).or_default().push(idx);
    }

    let mut counts = vec![0usize; samples.len()];
    for (idx, s) in samples.iter().enumerate() {
        let (row, col) = key(s);
        for dr in -1..=1 {
            for dc in -1..=1 {
                let Some(members) = cells.get(&(row + dr, col + dc)) else {
                    continue;
                };
                counts[idx] += members
                    .iter()
                    .filter(|&&other| {
                        other != idx && distance(s.point(), samples[other].point()) <= radius_m
                    })
                    .count();
            }
        }
    }
    Some(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(lat: f64, lon: f64) -> MovementSample {
        MovementSample::new("GRID-1", lat, lon, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn counts_exclude_self() {
        let samples = vec![at(10.0, 10.0), at(10.0, 10.0), at(10.0005, 10.0)];
        let counts = neighbour_counts(&samples, 100.0).unwrap();
        assert_eq!(counts, vec![2, 2, 2]);
    }

    #[test]
    fn neighbours_across_cell_boundaries_are_found() {
        // Straddle a cell edge at the equator: ~90 m apart
        let cell_lat = CELL_MARGIN * 100.0 / METERS_PER_DEGREE_LAT;
        let samples = vec![at(cell_lat - 0.0004, 0.0), at(cell_lat + 0.0004, 0.0)];
        assert_eq!(neighbour_counts(&samples, 100.0).unwrap(), vec![1, 1]);
    }

    #[test]
    fn polar_and_antimeridian_inputs_decline() {
        assert!(neighbour_counts(&[at(86.0, 0.0)], 100.0).is_none());
        assert!(neighbour_counts(&[at(0.0, 179.995)], 100.0).is_none());
        assert!(neighbour_counts(&[at(0.0, 0.0)], 0.0).is_none());
    }
}
