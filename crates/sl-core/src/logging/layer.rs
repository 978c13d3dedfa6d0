//! Custom tracing layer for JSONL output.
//!
//! Produces one JSON object per event on stderr while keeping stdout clean
//! for command payloads. Correlation fields (run_id, stage, identifier) are
//! lifted from enclosing spans so components can log without carrying them.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::{Level, LogEvent};

/// Correlation fields recorded on a span.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    stage: Option<String>,
    identifier: Option<String>,
}

impl SpanContext {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "run_id" => self.run_id = Some(value),
            "stage" => self.stage = Some(value),
            "identifier" => self.identifier = Some(value),
            _ => {}
        }
    }

    /// Fill unset fields from an outer span.
    fn inherit(&mut self, outer: &SpanContext) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&outer.run_id);
        }
        if self.stage.is_none() {
            self.stage.clone_from(&outer.stage);
        }
        if self.identifier.is_none() {
            self.identifier.clone_from(&outer.identifier);
        }
    }
}

struct SpanContextVisitor(SpanContext);

impl Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // Display-formatted span fields (`%value`) arrive here too
        self.0.set(field.name(), format!("{:?}", value));
    }
}

/// A visitor that extracts field values from tracing events.
struct JsonFieldVisitor {
    fields: BTreeMap<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: BTreeMap::new(),
            message: None,
        }
    }

    fn insert_string(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(value));
        }
    }
}

impl Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert_string(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert_string(field, format!("{:?}", value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form
        let v = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(value.to_string()));
        self.fields.insert(field.name().to_string(), v);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// JSONL tracing layer, writing to stderr unless given another writer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor(SpanContext::default());
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        // Innermost span wins for each field
        let mut span_ctx = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(outer) = span.extensions().get::<SpanContext>() {
                    span_ctx.inherit(outer);
                }
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        // Correlation fields on the event itself (as `log_event!` sets them)
        // take precedence over span context.
        let mut fields = visitor.fields;
        let mut lift = |name: &str, from_span: Option<String>| match fields.remove(name) {
            Some(serde_json::Value::String(value)) => Some(value),
            Some(other) => Some(other.to_string()),
            None => from_span,
        };
        let run_id = lift("run_id", span_ctx.run_id);
        let stage = lift("stage", span_ctx.stage);
        let identifier = lift("identifier", span_ctx.identifier);

        let line = LogEvent {
            ts,
            level: Level::from(*event.metadata().level()),
            event: event.metadata().target().to_string(),
            run_id,
            stage,
            identifier,
            message: visitor.message,
            fields,
        };

        let json = line.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<serde_json::Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.lock().unwrap();
        String::from_utf8_lossy(&output)
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid JSON line"))
            .collect()
    }

    #[test]
    fn test_jsonl_layer_output() {
        let lines = capture(|| {
            tracing::info!(target: "test.event", message = "test message");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[0]["event"], "test.event");
        assert_eq!(lines[0]["message"], "test message");
        assert!(lines[0]["ts"].is_string());
    }

    #[test]
    fn layer_records_extra_fields() {
        let lines = capture(|| {
            tracing::warn!(target: "score.heuristic_fallback", samples = 42, model = false, speed = 12.5, message = "hi");
        });
        assert_eq!(lines[0]["level"], "warn");
        assert_eq!(lines[0]["fields"]["samples"], 42);
        assert_eq!(lines[0]["fields"]["model"], false);
        assert_eq!(lines[0]["fields"]["speed"], 12.5);
    }

    #[test]
    fn layer_keeps_non_finite_floats() {
        let lines = capture(|| {
            tracing::error!(target: "route.profile_failed", value = f64::NAN, message = "bad");
        });
        assert_eq!(lines[0]["fields"]["value"], "NaN");
    }

    #[test]
    fn layer_lifts_span_context() {
        let lines = capture(|| {
            let run = tracing::info_span!("run", run_id = "run-abc", stage = "init");
            let _run = run.enter();
            let inner = tracing::info_span!("identifier", identifier = "AB-12-CD", stage = "profile");
            let _inner = inner.enter();
            tracing::error!(target: "route.profile_failed", message = "failed");
        });
        assert_eq!(lines[0]["run_id"], "run-abc");
        assert_eq!(lines[0]["stage"], "profile");
        assert_eq!(lines[0]["identifier"], "AB-12-CD");
    }

    #[test]
    fn layer_lines_parse_as_log_events() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("run", run_id = "run-xyz");
            let _entered = span.enter();
            tracing::debug!(target: "store.loaded", samples = 7u64, message = "loaded");
        });

        let output = buffer.lock().unwrap();
        let text = String::from_utf8_lossy(&output);
        let event: LogEvent = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(event.level, Level::Debug);
        assert_eq!(event.event, "store.loaded");
        assert_eq!(event.run_id.as_deref(), Some("run-xyz"));
        assert_eq!(event.stage, None);
        assert_eq!(event.message.as_deref(), Some("loaded"));
        assert_eq!(event.fields["samples"], 7);
    }

    #[test]
    fn event_correlation_fields_are_lifted() {
        let lines = capture(|| {
            let span = tracing::info_span!("run", run_id = "run-outer", stage = "init");
            let _entered = span.enter();
            tracing::info!(target: "run.started", run_id = "run-inner", stage = "load", message = "go");
        });
        assert_eq!(lines[0]["run_id"], "run-inner");
        assert_eq!(lines[0]["stage"], "load");
        assert!(lines[0].get("fields").is_none());
    }

    #[test]
    fn span_context_inherit_fills_gaps_only() {
        let mut inner = SpanContext {
            stage: Some("score".into()),
            ..SpanContext::default()
        };
        let outer = SpanContext {
            run_id: Some("run-1".into()),
            stage: Some("init".into()),
            identifier: None,
        };
        inner.inherit(&outer);
        assert_eq!(inner.run_id.as_deref(), Some("run-1"));
        assert_eq!(inner.stage.as_deref(), Some("score"));
        assert!(inner.identifier.is_none());
    }
}
