//! OTLP bridge for span export (feature `otlp`).
//!
//! Adapts apcore [`Span`]s onto the OpenTelemetry SDK: each exported
//! span becomes a real OTel span with matching timestamps, attributes
//! and status, shipped through the OTLP exporter to any compatible
//! collector. The apcore identifiers are carried as `apcore.*`
//! attributes so traces can be correlated in the backend.
//!
//! Building this module requires the `otlp` cargo feature; without it
//! the missing type is a compile-time signal rather than a runtime
//! surprise.

use crate::observability::tracing::{Span, SpanExporter};
use apcore_types::ModuleError;
use opentelemetry::trace::{SpanBuilder, Status, TraceContextExt, Tracer as _};
use opentelemetry::KeyValue;
use serde_json::Value;
use std::time::{Duration, UNIX_EPOCH};

/// Exports spans via the OpenTelemetry Protocol.
///
/// Construction installs a batching OTLP pipeline on the current tokio
/// runtime; [`SpanExporter::shutdown`] flushes pending spans.
pub struct OtlpExporter {
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl OtlpExporter {
    /// Creates an exporter.
    ///
    /// `endpoint` defaults to the SDK default when `None`;
    /// `service_name` becomes the `service.name` resource attribute.
    ///
    /// # Errors
    ///
    /// `GENERAL_INTERNAL_ERROR` when the OTLP pipeline cannot be
    /// installed (bad endpoint syntax, no tokio runtime).
    pub fn new(endpoint: Option<&str>, service_name: &str) -> Result<Self, ModuleError> {
        use opentelemetry_otlp::WithExportConfig;

        let mut exporter = opentelemetry_otlp::new_exporter().tonic();
        if let Some(endpoint) = endpoint {
            exporter = exporter.with_endpoint(endpoint.to_string());
        }

        let resource = opentelemetry_sdk::Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(
                opentelemetry_sdk::trace::Config::default().with_resource(resource),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .map_err(|e| ModuleError::internal(format!("cannot install OTLP pipeline: {e}")))?;

        Ok(Self { tracer })
    }
}

impl SpanExporter for OtlpExporter {
    fn export(&self, span: &Span) {
        let start = UNIX_EPOCH + Duration::from_secs_f64(span.start_time.max(0.0));
        let end = span
            .end_time
            .map(|t| UNIX_EPOCH + Duration::from_secs_f64(t.max(0.0)));

        let mut attributes = vec![
            KeyValue::new("apcore.trace_id", span.trace_id.clone()),
            KeyValue::new("apcore.span_id", span.span_id.clone()),
        ];
        if let Some(parent) = &span.parent_span_id {
            attributes.push(KeyValue::new("apcore.parent_span_id", parent.clone()));
        }
        for (key, value) in &span.attributes {
            attributes.push(otel_attribute(key, value));
        }

        let builder = SpanBuilder::from_name(span.name.clone())
            .with_start_time(start)
            .with_attributes(attributes);
        let context = opentelemetry::Context::new();
        let otel_span = self.tracer.build_with_context(builder, &context);
        let context = context.with_span(otel_span);
        let span_ref = context.span();

        if span.status == "error" {
            span_ref.set_status(Status::error("module call failed"));
        }

        for event in &span.events {
            let name = event
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("event")
                .to_string();
            let event_attributes: Vec<KeyValue> = event
                .as_object()
                .map(|map| {
                    map.iter()
                        .filter(|(key, _)| key.as_str() != "name")
                        .map(|(key, value)| otel_attribute(key, value))
                        .collect()
                })
                .unwrap_or_default();
            span_ref.add_event(name, event_attributes);
        }

        match end {
            Some(end) => span_ref.end_with_timestamp(end),
            None => span_ref.end(),
        }
    }

    fn shutdown(&self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Primitive attribute values pass through; everything else is
/// stringified.
fn otel_attribute(key: &str, value: &Value) -> KeyValue {
    let key = key.to_string();
    match value {
        Value::String(text) => KeyValue::new(key, text.clone()),
        Value::Bool(flag) => KeyValue::new(key, *flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                KeyValue::new(key, int)
            } else {
                KeyValue::new(key, number.as_f64().unwrap_or(0.0))
            }
        }
        other => KeyValue::new(key, other.to_string()),
    }
}
