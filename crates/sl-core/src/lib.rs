//! Sightline Core Library
//!
//! Turns raw geotemporal history into movement analytics:
//! - Route profiling (distance, speed, spread, frequent places)
//! - Anomaly detection per identifier
//! - Risk scoring with an optional inference model and heuristic fallback
//! - Batch trend aggregation (hotspots, hours, clusters, security risk)
//!
//! The binary entry point is in `main.rs`.

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod exit_codes;
pub mod inference;
pub mod logging;
pub mod risk;
pub mod route;
pub mod schema;
pub mod store;
pub mod trend;

pub use anomaly::{AnomalyDetector, AnomalyFinding, AnomalySeverity, AnomalyType};
pub use engine::{AnalyticsEngine, IdentifierReport};
pub use risk::{FeatureVector, PredictedEvent, PredictedEventType, RiskAssessment, RiskScorer};
pub use route::{FlaggedMovement, RouteProfile, RouteProfiler};
pub use store::{MemoryStore, SampleStore, StoreError};
pub use trend::{BatchSummary, TrendAggregator, TrendInsight, TrendIntensity, TrendType};
