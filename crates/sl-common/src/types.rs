//! Raw geotemporal records produced by the capture pipeline.
//!
//! Both record types are immutable once created; the analytics engine only
//! ever reads them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_math::GeoPoint;

use crate::Identifier;

/// One detection event of an identifier at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sighting {
    pub identifier: Identifier,
    pub captured_at: DateTime<Utc>,
    /// Recognition confidence, nominally in [0, 1] (not enforced).
    pub confidence: f64,
    /// Free-text location label (e.g. "Av. da Liberdade").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Sighting {
    pub fn new(identifier: impl Into<Identifier>, captured_at: DateTime<Utc>, confidence: f64) -> Self {
        Sighting {
            identifier: identifier.into(),
            captured_at,
            confidence,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// One geolocation fix associated with an identifier's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MovementSample {
    pub identifier: Identifier,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    /// Reported fix accuracy in meters.
    #[serde(default)]
    pub accuracy: f64,
}

impl MovementSample {
    pub fn new(
        identifier: impl Into<Identifier>,
        latitude: f64,
        longitude: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        MovementSample {
            identifier: identifier.into(),
            latitude,
            longitude,
            captured_at,
            accuracy: 0.0,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Inclusive time range for store queries. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        TimeWindow { since, until }
    }

    /// The unbounded window.
    pub fn all() -> Self {
        TimeWindow::default()
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        TimeWindow {
            since: Some(since),
            until: Some(until),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.since.map_or(true, |s| ts >= s) && self.until.map_or(true, |u| ts <= u)
    }

    /// A window whose start lies after its end selects nothing.
    pub fn is_empty(&self) -> bool {
        matches!((self.since, self.until), (Some(s), Some(u)) if s > u)
    }
}
