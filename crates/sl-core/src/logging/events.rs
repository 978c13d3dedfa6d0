//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! All events carry the run_id and the pipeline stage that emitted them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Processing stages in the analytics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading samples and sightings from the store.
    Load,
    /// Route profiling.
    Profile,
    /// Anomaly detection.
    Detect,
    /// Risk scoring.
    Score,
    /// Batch trend aggregation.
    Trend,
    /// Writing command output.
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Profile => "profile",
            Stage::Detect => "detect",
            Stage::Score => "score",
            Stage::Trend => "trend",
            Stage::Output => "output",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names, used as tracing targets.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_FAILED: &str = "run.failed";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    // Store
    pub const STORE_LOADED: &str = "store.loaded";
    pub const STORE_QUERY_FAILED: &str = "store.query_failed";
    pub const STORE_SIGHTING_MISSING: &str = "store.sighting_missing";

    // Route profiling
    pub const ROUTE_PROFILED: &str = "route.profiled";
    pub const ROUTE_PROFILE_FAILED: &str = "route.profile_failed";

    // Anomaly detection
    pub const DETECT_FINISHED: &str = "detect.finished";
    pub const DETECT_FAILED: &str = "detect.failed";

    // Risk scoring
    pub const SCORE_FINISHED: &str = "score.finished";
    pub const SCORE_FAILED: &str = "score.failed";
    pub const SCORE_HEURISTIC_FALLBACK: &str = "score.heuristic_fallback";

    // Inference subsystem
    pub const INFERENCE_MODEL_LOADED: &str = "inference.model_loaded";
    pub const INFERENCE_MODEL_UNAVAILABLE: &str = "inference.model_unavailable";
    pub const INFERENCE_WORKER_STOPPED: &str = "inference.worker_stopped";

    // Trends
    pub const TREND_FINISHED: &str = "trend.finished";
    pub const TREND_FAILED: &str = "trend.failed";

    // Engine
    pub const ENGINE_STAGE_FAILED: &str = "engine.stage_failed";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// One JSONL log line, as written by [`super::JsonlLayer`].
///
/// Correlation fields are optional: they come from enclosing spans and an
/// event logged outside any span has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name, the tracing target (e.g. "run.started").
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Identifier under analysis, when the event concerns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEvent {
    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// The run ID shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_event_omits_absent_correlation() {
        let event = LogEvent {
            ts: Utc::now(),
            level: Level::Info,
            event: event_names::RUN_STARTED.to_string(),
            run_id: Some("run-12345".into()),
            stage: None,
            identifier: None,
            message: Some("starting analytics run".into()),
            fields: BTreeMap::new(),
        };

        let json = event.to_jsonl();
        assert!(json.contains(r#""event":"run.started""#));
        assert!(json.contains(r#""level":"info""#));
        assert!(json.contains(r#""run_id":"run-12345""#));
        assert!(!json.contains("stage"));
        assert!(!json.contains("identifier"));
        assert!(!json.contains("fields"));

        let back: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Profile.to_string(), "profile");
        assert_eq!(Stage::Detect.to_string(), "detect");
        assert_eq!(serde_json::to_string(&Stage::Trend).unwrap(), "\"trend\"");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(event_names::RUN_STARTED, "run.started");
        assert_eq!(event_names::SCORE_HEURISTIC_FALLBACK, "score.heuristic_fallback");
    }
}
