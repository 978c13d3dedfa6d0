//! JSON Schema generation for command output types.
//!
//! ```bash
//! # List available schema types
//! sightline schema --list
//!
//! # Generate schema for a specific type
//! sightline schema IdentifierReport
//!
//! # Generate all schemas
//! sightline schema --all
//! ```

use schemars::schema_for;
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::anomaly::{AnomalyFinding, AnomalySeverity, AnomalyType};
pub use crate::engine::IdentifierReport;
pub use crate::risk::{PredictedEvent, PredictedEventType, RiskAssessment};
pub use crate::route::{FlaggedMovement, RouteProfile};
pub use crate::trend::{BatchSummary, Hotspot, TrendInsight, TrendIntensity};
pub use sl_common::{Identifier, MovementSample, Sighting, TimeWindow};

/// Available schema types with their descriptions.
pub fn available_schemas() -> Vec<(&'static str, &'static str)> {
    vec![
        // Input records
        ("Identifier", "Normalized tracked identifier (vehicle plate)"),
        ("Sighting", "One detection event with confidence"),
        ("MovementSample", "One geolocation fix"),
        ("TimeWindow", "Inclusive query time range"),
        // Per-identifier analytics
        ("RouteProfile", "Distance, speed, spread and frequent places"),
        ("FlaggedMovement", "Consecutive samples crossing flag thresholds"),
        ("AnomalyType", "Kinds of movement anomaly"),
        ("AnomalySeverity", "Finding severity (low..critical)"),
        ("AnomalyFinding", "One flagged deviation for an identifier"),
        ("PredictedEventType", "Kinds of predicted event"),
        ("PredictedEvent", "Predicted event with probability and lead time"),
        ("RiskAssessment", "Risk score, predicted events and actions"),
        (
            "IdentifierReport",
            "Profile, findings and assessment for one identifier",
        ),
        // Batch analytics
        ("Hotspot", "Aggregate for one location label"),
        ("TrendIntensity", "Trend intensity bucket (low..critical)"),
        ("TrendInsight", "Batch-level trend insight"),
        ("BatchSummary", "Descriptive statistics for a batch"),
    ]
}

/// Generate JSON Schema for a type by name.
///
/// Returns None if the type is unknown.
pub fn generate_schema(type_name: &str) -> Option<Value> {
    let schema = match type_name {
        "Identifier" => schema_for!(Identifier),
        "Sighting" => schema_for!(Sighting),
        "MovementSample" => schema_for!(MovementSample),
        "TimeWindow" => schema_for!(TimeWindow),
        "RouteProfile" => schema_for!(RouteProfile),
        "FlaggedMovement" => schema_for!(FlaggedMovement),
        "AnomalyType" => schema_for!(AnomalyType),
        "AnomalySeverity" => schema_for!(AnomalySeverity),
        "AnomalyFinding" => schema_for!(AnomalyFinding),
        "PredictedEventType" => schema_for!(PredictedEventType),
        "PredictedEvent" => schema_for!(PredictedEvent),
        "RiskAssessment" => schema_for!(RiskAssessment),
        "IdentifierReport" => schema_for!(IdentifierReport),
        "Hotspot" => schema_for!(Hotspot),
        "TrendIntensity" => schema_for!(TrendIntensity),
        "TrendInsight" => schema_for!(TrendInsight),
        "BatchSummary" => schema_for!(BatchSummary),
        _ => return None,
    };

    serde_json::to_value(schema).ok()
}

/// Generate all schemas as a map from type name to schema.
pub fn generate_all_schemas() -> BTreeMap<String, Value> {
    available_schemas()
        .into_iter()
        .filter_map(|(name, _)| generate_schema(name).map(|s| (name.to_string(), s)))
        .collect()
}
