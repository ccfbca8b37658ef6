//! Observability middlewares: tracing, metrics, structured logging.
//!
//! Recommended registration order (outer to inner): tracing, metrics,
//! logging. This is a convention, not enforced.

pub mod context_logger;
pub mod metrics;
#[cfg(feature = "otlp")]
pub mod otlp;
pub mod tracing;

pub use context_logger::{
    ContextLogger, LogFormat, LogLevel, LogSink, MemorySink, ObsLoggingMiddleware, StderrSink,
    StdoutSink,
};
pub use metrics::{MetricsCollector, MetricsMiddleware, MetricsSnapshot, DEFAULT_BUCKETS};
#[cfg(feature = "otlp")]
pub use otlp::OtlpExporter;
pub use tracing::{
    new_span_id, InMemoryExporter, SamplingStrategy, Span, SpanExporter, StdoutExporter,
    TracingMiddleware, DEFAULT_MAX_SPANS,
};
