//! Descriptive batch statistics.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sl_common::{Identifier, Sighting};
use std::collections::HashMap;

const TOP_IDENTIFIERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdentifierCount {
    pub identifier: Identifier,
    pub sightings: usize,
}

/// Sightings per confidence band: [0, 0.3), [0.3, 0.6), [0.6, 0.8), [0.8, ∞).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfidenceBrackets {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub very_high: usize,
}

impl ConfidenceBrackets {
    fn record(&mut self, confidence: f64) {
        if confidence < 0.3 {
            self.low += 1;
        } else if confidence < 0.6 {
            self.medium += 1;
        } else if confidence < 0.8 {
            self.high += 1;
        } else {
            self.very_high += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    pub total_sightings: usize,
    pub unique_identifiers: usize,
    /// Most sighted identifiers, count descending then identifier.
    pub top_identifiers: Vec<IdentifierCount>,
    pub average_confidence: f64,
    pub confidence_brackets: ConfidenceBrackets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl BatchSummary {
    pub fn from_sightings(sightings: &[Sighting]) -> Self {
        let mut per_identifier: HashMap<Identifier, usize> = HashMap::new();
        let mut brackets = ConfidenceBrackets::default();
        let mut confidence = Vec::with_capacity(sightings.len());

        for s in sightings {
            *per_identifier.entry(s.identifier.normalized()).or_default() += 1;
            brackets.record(s.confidence);
            if s.confidence.is_finite() {
                confidence.push(s.confidence);
            }
        }

        let unique_identifiers = per_identifier.len();
        let mut top_identifiers: Vec<IdentifierCount> = per_identifier
            .into_iter()
            .map(|(identifier, sightings)| IdentifierCount {
                identifier,
                sightings,
            })
            .collect();
        top_identifiers.sort_by(|a, b| {
            b.sightings
                .cmp(&a.sightings)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        top_identifiers.truncate(TOP_IDENTIFIERS);

        BatchSummary {
            total_sightings: sightings.len(),
            unique_identifiers,
            top_identifiers,
            average_confidence: sl_math::mean(&confidence),
            confidence_brackets: brackets,
            start: sightings.iter().map(|s| s.captured_at).min(),
            end: sightings.iter().map(|s| s.captured_at).max(),
        }
    }

    pub fn summary_line(&self) -> String {
        let top = self
            .top_identifiers
            .first()
            .map(|t| format!("{} ({})", t.identifier, t.sightings))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} sightings, {} identifiers, avg confidence {:.2}, top {}",
            self.total_sightings, self.unique_identifiers, self.average_confidence, top
        )
    }
}
