//! Batch trend aggregation.
//!
//! One pass over a batch of sightings produces four insights, always in this
//! order: location hotspots, temporal pattern, anomaly cluster and security
//! risk. All four share the batch's first and last capture time; an empty
//! batch still yields all four, zero-valued and stamped with the reference
//! instant.
//!
//! Unlike the per-identifier components, a failure anywhere aborts the whole
//! run and yields no insights.

mod summary;

pub use summary::{BatchSummary, ConfidenceBrackets, IdentifierCount};

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_common::{Identifier, Sighting};
use sl_config::TrendSettings;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use crate::anomaly::AnomalyFinding;
use crate::logging::event_names;

/// Findings keyed by identifier, as joined into a trend run.
pub type FindingsByIdentifier = HashMap<Identifier, Vec<AnomalyFinding>>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrendError {
    #[error("invalid risk marker {pattern:?}: {message}")]
    InvalidMarker { pattern: String, message: String },

    #[error("sighting of {identifier} has non-finite confidence")]
    NonFiniteConfidence { identifier: Identifier },
}

impl From<TrendError> for sl_common::Error {
    fn from(err: TrendError) -> Self {
        match err {
            TrendError::InvalidMarker { .. } => sl_common::Error::InvalidConfig(err.to_string()),
            TrendError::NonFiniteConfidence { .. } => sl_common::Error::NonFinite {
                field: "confidence".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    LocationHotspot,
    TemporalPattern,
    AnomalyCluster,
    SecurityRisk,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TrendIntensity {
    Low,
    Moderate,
    High,
    Critical,
}

impl TrendIntensity {
    /// Bucket a subset size: >100 critical, >50 high, >20 moderate.
    pub fn from_count(count: usize) -> Self {
        match count {
            c if c > 100 => TrendIntensity::Critical,
            c if c > 50 => TrendIntensity::High,
            c if c > 20 => TrendIntensity::Moderate,
            _ => TrendIntensity::Low,
        }
    }
}

/// Aggregate for one location label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Hotspot {
    pub location: String,
    pub frequency: usize,
    pub distinct_identifiers: usize,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendDetails {
    Hotspots {
        hotspots: Vec<Hotspot>,
    },
    Temporal {
        /// Sightings per "HH:00" slot (UTC); empty slots are omitted.
        hourly: BTreeMap<String, usize>,
        peak_hours: Vec<String>,
    },
    AnomalyCluster {
        sightings: Vec<Sighting>,
        /// Present when findings were joined into the run.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        findings_per_identifier: Option<BTreeMap<String, usize>>,
    },
    SecurityRisk {
        sightings: Vec<Sighting>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendInsight {
    pub trend_type: TrendType,
    pub intensity: TrendIntensity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub affected_count: usize,
    pub details: TrendDetails,
}

#[derive(Debug, Clone)]
pub struct TrendAggregator {
    settings: TrendSettings,
    identifier_markers: Vec<Regex>,
    location_markers: Vec<Regex>,
}

impl TrendAggregator {
    pub fn new(settings: TrendSettings) -> Result<Self, TrendError> {
        let identifier_markers = compile(&settings.risk_markers.identifier_patterns)?;
        let location_markers = compile(&settings.risk_markers.location_patterns)?;
        Ok(TrendAggregator {
            settings,
            identifier_markers,
            location_markers,
        })
    }

    pub fn settings(&self) -> &TrendSettings {
        &self.settings
    }

    /// [`TrendAggregator::aggregate_at`] with the current time as reference.
    pub fn aggregate(
        &self,
        sightings: &[Sighting],
        findings: Option<&FindingsByIdentifier>,
    ) -> Vec<TrendInsight> {
        self.aggregate_at(sightings, findings, Utc::now())
    }

    /// Aggregate a batch, logging any failure and returning no insights in
    /// its place. `now` stamps the insights of an empty batch.
    pub fn aggregate_at(
        &self,
        sightings: &[Sighting],
        findings: Option<&FindingsByIdentifier>,
        now: DateTime<Utc>,
    ) -> Vec<TrendInsight> {
        match self.try_aggregate_at(sightings, findings, now) {
            Ok(insights) => {
                tracing::debug!(
                    target: event_names::TREND_FINISHED,
                    sightings = sightings.len(),
                    insights = insights.len(),
                    message = "trend aggregation finished",
                );
                insights
            }
            Err(e) => {
                tracing::error!(
                    target: event_names::TREND_FAILED,
                    sightings = sightings.len(),
                    error = %e,
                    message = "trend aggregation failed; no insights reported",
                );
                Vec::new()
            }
        }
    }

    pub fn try_aggregate(
        &self,
        sightings: &[Sighting],
        findings: Option<&FindingsByIdentifier>,
    ) -> Result<Vec<TrendInsight>, TrendError> {
        self.try_aggregate_at(sightings, findings, Utc::now())
    }

    pub fn try_aggregate_at(
        &self,
        sightings: &[Sighting],
        findings: Option<&FindingsByIdentifier>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrendInsight>, TrendError> {
        if let Some(bad) = sightings.iter().find(|s| !s.confidence.is_finite()) {
            return Err(TrendError::NonFiniteConfidence {
                identifier: bad.identifier.normalized(),
            });
        }
        let start = sightings.iter().map(|s| s.captured_at).min().unwrap_or(now);
        let end = sightings.iter().map(|s| s.captured_at).max().unwrap_or(now);

        let insight = |trend_type, count: usize, affected_count, details| TrendInsight {
            trend_type,
            intensity: TrendIntensity::from_count(count),
            start,
            end,
            affected_count,
            details,
        };

        let hotspots = self.hotspots(sightings);
        let (hourly, peak_hours) = self.hourly(sightings);
        let cluster = self.anomaly_cluster(sightings);
        let risky = self.security_risks(sightings);

        let findings_per_identifier = findings.map(|joined| {
            cluster
                .iter()
                .map(|s| s.identifier.normalized())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|id| {
                    let count = joined.get(&id).map_or(0, Vec::len);
                    (id.to_string(), count)
                })
                .collect()
        });

        Ok(vec![
            insight(
                TrendType::LocationHotspot,
                hotspots.len(),
                sightings.len(),
                TrendDetails::Hotspots { hotspots },
            ),
            insight(
                TrendType::TemporalPattern,
                hourly.len(),
                sightings.len(),
                TrendDetails::Temporal { hourly, peak_hours },
            ),
            insight(
                TrendType::AnomalyCluster,
                cluster.len(),
                cluster.len(),
                TrendDetails::AnomalyCluster {
                    sightings: cluster,
                    findings_per_identifier,
                },
            ),
            insight(
                TrendType::SecurityRisk,
                risky.len(),
                risky.len(),
                TrendDetails::SecurityRisk { sightings: risky },
            ),
        ])
    }

    /// Top locations by frequency, ties by label. Unlabelled sightings are
    /// skipped.
    pub fn hotspots(&self, sightings: &[Sighting]) -> Vec<Hotspot> {
        let mut by_location: HashMap<&str, Vec<&Sighting>> = HashMap::new();
        for s in sightings {
            if let Some(location) = s.location.as_deref() {
                by_location.entry(location).or_default().push(s);
            }
        }

        let mut hotspots: Vec<Hotspot> = by_location
            .into_iter()
            .map(|(location, group)| {
                let distinct: BTreeSet<Identifier> =
                    group.iter().map(|s| s.identifier.normalized()).collect();
                let confidence: Vec<f64> = group.iter().map(|s| s.confidence).collect();
                Hotspot {
                    location: location.to_string(),
                    frequency: group.len(),
                    distinct_identifiers: distinct.len(),
                    average_confidence: sl_math::mean(&confidence),
                }
            })
            .collect();

        hotspots.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.location.cmp(&b.location))
        });
        hotspots.truncate(self.settings.top_hotspots);
        hotspots
    }

    /// Counts per hour slot and the busiest slots (ties by slot).
    pub fn hourly(&self, sightings: &[Sighting]) -> (BTreeMap<String, usize>, Vec<String>) {
        let mut hourly: BTreeMap<String, usize> = BTreeMap::new();
        for s in sightings {
            *hourly
                .entry(format!("{:02}:00", s.captured_at.hour()))
                .or_default() += 1;
        }

        let mut ranked: Vec<(&String, &usize)> = hourly.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let peak_hours = ranked
            .into_iter()
            .take(self.settings.peak_hours)
            .map(|(slot, _)| slot.clone())
            .collect();
        (hourly, peak_hours)
    }

    pub fn anomaly_cluster(&self, sightings: &[Sighting]) -> Vec<Sighting> {
        sightings
            .iter()
            .filter(|s| s.confidence < self.settings.anomaly_confidence)
            .cloned()
            .collect()
    }

    pub fn security_risks(&self, sightings: &[Sighting]) -> Vec<Sighting> {
        sightings
            .iter()
            .filter(|s| s.confidence < self.settings.security_confidence || self.is_marked(s))
            .cloned()
            .collect()
    }

    /// Whether the identifier or location label matches a risk marker.
    pub fn is_marked(&self, sighting: &Sighting) -> bool {
        let id = sighting.identifier.as_str();
        if self.identifier_markers.iter().any(|re| re.is_match(id)) {
            return true;
        }
        sighting
            .location
            .as_deref()
            .is_some_and(|loc| self.location_markers.iter().any(|re| re.is_match(loc)))
    }

    pub fn summarize(&self, sightings: &[Sighting]) -> BatchSummary {
        BatchSummary::from_sightings(sightings)
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, TrendError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| TrendError::InvalidMarker {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}
