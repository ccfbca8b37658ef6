//! Tracing: spans, exporters, and the tracing middleware.
//!
//! The middleware keeps a **span stack** in `context.data` so nested
//! module-to-module calls produce correctly-parented spans: `before`
//! pushes a span whose parent is the stack top, `after`/`on_error` pop
//! and finalize it.
//!
//! # Sampling
//!
//! The decision whether a trace is exported is made once at the root
//! call and recorded in `context.data`; every child span of the same
//! trace inherits it. Four strategies: `full`, `off`, `proportional`
//! (random at a configured rate) and `error_first` (proportional for
//! success spans, errors always exported).

use crate::middleware::Middleware;
use apcore_types::{Context, ErrorCode, JsonMap, ModuleError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// `context.data` key holding the span stack.
pub const SPAN_STACK_KEY: &str = "_tracing_spans";
/// `context.data` key holding the per-trace sampling decision.
pub const SAMPLED_KEY: &str = "_tracing_sampled";

/// Default capacity of the in-memory exporter ring.
pub const DEFAULT_MAX_SPANS: usize = 10_000;

/// A trace span: one unit of work in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Trace this span belongs to.
    pub trace_id: String,
    /// 16 hex chars from 8 random bytes.
    pub span_id: String,
    /// Enclosing span within the same trace, if any. Serialized as null
    /// for root spans so every exported line carries the same fields.
    #[serde(default)]
    pub parent_span_id: Option<String>,
    /// Operation name.
    pub name: String,
    /// Start time, epoch seconds.
    pub start_time: f64,
    /// End time, epoch seconds; `None` while in flight.
    #[serde(default)]
    pub end_time: Option<f64>,
    /// `"ok"` or `"error"`.
    pub status: String,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: JsonMap,
    /// Ordered span events.
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

impl Span {
    /// Starts a span now.
    #[must_use]
    pub fn start(trace_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: new_span_id(),
            parent_span_id: None,
            name: name.into(),
            start_time: epoch_seconds(),
            end_time: None,
            status: "ok".to_string(),
            attributes: JsonMap::new(),
            events: Vec::new(),
        }
    }

    /// Duration in milliseconds, when ended.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        self.end_time.map(|end| (end - self.start_time) * 1000.0)
    }
}

/// Generates a 16-hex-char span id from 8 random bytes.
#[must_use]
pub fn new_span_id() -> String {
    let bytes: [u8; 8] = rand::random();
    let mut id = String::with_capacity(16);
    for byte in bytes {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Export destination for completed spans.
pub trait SpanExporter: Send + Sync {
    /// Exports one completed span.
    fn export(&self, span: &Span);

    /// Flushes pending work; called on shutdown.
    fn shutdown(&self) {}
}

/// Writes one JSON object per line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutExporter;

impl SpanExporter for StdoutExporter {
    fn export(&self, span: &Span) {
        if let Ok(line) = serde_json::to_string(span) {
            println!("{line}");
        }
    }
}

/// Collects spans in a thread-safe bounded ring; oldest are evicted
/// when full.
pub struct InMemoryExporter {
    spans: Mutex<VecDeque<Span>>,
    max_spans: usize,
}

impl Default for InMemoryExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExporter {
    /// Creates an exporter bounded at [`DEFAULT_MAX_SPANS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SPANS)
    }

    /// Creates an exporter bounded at `max_spans`.
    #[must_use]
    pub fn with_capacity(max_spans: usize) -> Self {
        Self {
            spans: Mutex::new(VecDeque::new()),
            max_spans,
        }
    }

    /// All collected spans, oldest first.
    #[must_use]
    pub fn get_spans(&self) -> Vec<Span> {
        self.spans.lock().iter().cloned().collect()
    }

    /// Removes all collected spans.
    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, span: &Span) {
        let mut spans = self.spans.lock();
        if spans.len() == self.max_spans {
            spans.pop_front();
        }
        spans.push_back(span.clone());
    }
}

/// How traces are chosen for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingStrategy {
    /// Always sample.
    Full,
    /// Never sample.
    Off,
    /// Random at the configured rate.
    Proportional,
    /// Proportional for success spans; error spans always export.
    ErrorFirst,
}

impl SamplingStrategy {
    /// Parses the configuration string form.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "full" => Some(Self::Full),
            "off" => Some(Self::Off),
            "proportional" => Some(Self::Proportional),
            "error_first" => Some(Self::ErrorFirst),
            _ => None,
        }
    }
}

/// Middleware that creates and exports spans for module calls.
pub struct TracingMiddleware {
    exporter: Arc<dyn SpanExporter>,
    sampling_rate: f64,
    strategy: SamplingStrategy,
}

impl TracingMiddleware {
    /// Creates a tracing middleware.
    ///
    /// # Errors
    ///
    /// `GENERAL_INVALID_INPUT` when `sampling_rate` is outside `[0, 1]`.
    pub fn new(
        exporter: Arc<dyn SpanExporter>,
        strategy: SamplingStrategy,
        sampling_rate: f64,
    ) -> Result<Self, ModuleError> {
        if !(0.0..=1.0).contains(&sampling_rate) {
            return Err(ModuleError::invalid_input(format!(
                "sampling_rate must be between 0.0 and 1.0, got {sampling_rate}"
            )));
        }
        Ok(Self {
            exporter,
            sampling_rate,
            strategy,
        })
    }

    /// Full-sampling middleware (every trace exported).
    ///
    /// # Errors
    ///
    /// Never fails; kept fallible for signature symmetry with
    /// [`TracingMiddleware::new`].
    pub fn full(exporter: Arc<dyn SpanExporter>) -> Result<Self, ModuleError> {
        Self::new(exporter, SamplingStrategy::Full, 1.0)
    }

    /// Makes or inherits the per-trace sampling decision.
    fn should_sample(&self, context: &Context) -> bool {
        if let Some(existing) = context.data().get::<bool>(SAMPLED_KEY) {
            return existing;
        }
        let decision = match self.strategy {
            SamplingStrategy::Full => true,
            SamplingStrategy::Off => false,
            SamplingStrategy::Proportional | SamplingStrategy::ErrorFirst => {
                rand::random::<f64>() < self.sampling_rate
            }
        };
        context.data().insert(SAMPLED_KEY, decision);
        decision
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "TracingMiddleware"
    }

    async fn before(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        self.should_sample(context);

        let parent_span_id = context
            .data()
            .top::<Span>(SPAN_STACK_KEY)
            .map(|span| span.span_id);

        let mut span = Span::start(context.trace_id.clone(), "apcore.module.execute");
        span.parent_span_id = parent_span_id;
        span.attributes.insert("module_id".into(), json!(module_id));
        span.attributes.insert("method".into(), json!("execute"));
        span.attributes
            .insert("caller_id".into(), json!(context.caller_id));

        context.data().push(SPAN_STACK_KEY, span);
        Ok(None)
    }

    async fn after(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        _output: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let Some(mut span) = context.data().pop::<Span>(SPAN_STACK_KEY) else {
            warn!(module_id, "span stack empty in after hook");
            return Ok(None);
        };

        span.end_time = Some(epoch_seconds());
        span.status = "ok".to_string();
        if let Some(duration) = span.duration_ms() {
            span.attributes.insert("duration_ms".into(), json!(duration));
        }
        span.attributes.insert("success".into(), json!(true));

        if context.data().get::<bool>(SAMPLED_KEY).unwrap_or(false) {
            self.exporter.export(&span);
        }
        Ok(None)
    }

    async fn on_error(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        error: &ModuleError,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let Some(mut span) = context.data().pop::<Span>(SPAN_STACK_KEY) else {
            warn!(module_id, "span stack empty in on_error hook");
            return Ok(None);
        };

        span.end_time = Some(epoch_seconds());
        span.status = "error".to_string();
        if let Some(duration) = span.duration_ms() {
            span.attributes.insert("duration_ms".into(), json!(duration));
        }
        span.attributes.insert("success".into(), json!(false));
        span.attributes
            .insert("error_code".into(), json!(error.code()));
        span.attributes
            .insert("error_type".into(), json!(kind_name(error)));

        let sampled = context.data().get::<bool>(SAMPLED_KEY).unwrap_or(false);
        if sampled || self.strategy == SamplingStrategy::ErrorFirst {
            self.exporter.export(&span);
        }
        Ok(None)
    }
}

fn kind_name(error: &ModuleError) -> &'static str {
    // The stable code already names the kind; expose a type-style name
    // alongside for consumers that expect one.
    error.code()
}
