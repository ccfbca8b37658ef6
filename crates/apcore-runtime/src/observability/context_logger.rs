//! Structured per-call logging.
//!
//! [`ContextLogger`] writes one structured record per call event to a
//! [`LogSink`], as JSON (one object per line) or a compact text form,
//! injecting `trace_id`, `module_id` and `caller_id` from the execution
//! context. Values of `extra` keys beginning with `_secret_` are
//! redacted when `redact_sensitive` is on (the default).
//!
//! This is the *product* logging surface; framework diagnostics use the
//! `tracing` macros instead.

use crate::middleware::Middleware;
use apcore_types::{Context, JsonMap, ModuleError, REDACTED_VALUE};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

/// `context.data` key holding the logging middleware's start-time stack.
pub const START_STACK_KEY: &str = "_obs_logging_starts";

/// Severity levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Finest-grained diagnostics.
    Trace,
    /// Debug detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected but tolerable.
    Warn,
    /// An operation failed.
    Error,
    /// The process cannot continue.
    Fatal,
}

impl LogLevel {
    /// Parses the lowercase level name; unknown names read as `Info`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" => Self::Warn,
            "error" => Self::Error,
            "fatal" => Self::Fatal,
            _ => Self::Info,
        }
    }

    /// The lowercase level name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

/// Output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// `YYYY-MM-DD HH:MM:SS [LEVEL] [trace=…] [module=…] message k=v…`
    Text,
}

/// Destination for rendered log lines.
pub trait LogSink: Send + Sync {
    /// Writes one complete line (without trailing newline).
    fn write_line(&self, line: &str);
}

/// Writes to standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: &str) {
        let _ = writeln!(std::io::stderr(), "{line}");
    }
}

/// Writes to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Collects lines in memory (tests, inspection).
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Structured logger with context injection and redaction.
#[derive(Clone)]
pub struct ContextLogger {
    name: String,
    format: LogFormat,
    level: LogLevel,
    redact_sensitive: bool,
    sink: Arc<dyn LogSink>,
    trace_id: Option<String>,
    module_id: Option<String>,
    caller_id: Option<String>,
}

impl ContextLogger {
    /// Creates a JSON logger at `info` writing to stderr, with
    /// redaction on.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: LogFormat::Json,
            level: LogLevel::Info,
            redact_sensitive: true,
            sink: Arc::new(StderrSink),
            trace_id: None,
            module_id: None,
            caller_id: None,
        }
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the minimum level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Enables or disables `_secret_` redaction.
    #[must_use]
    pub fn with_redaction(mut self, redact_sensitive: bool) -> Self {
        self.redact_sensitive = redact_sensitive;
        self
    }

    /// Creates a logger pre-populated with the context's trace id,
    /// current module and caller.
    #[must_use]
    pub fn from_context(context: &Context, name: impl Into<String>) -> Self {
        Self::new(name).with_context(context)
    }

    /// Returns a copy bound to the given context.
    #[must_use]
    pub fn with_context(mut self, context: &Context) -> Self {
        self.trace_id = Some(context.trace_id.clone());
        self.module_id = context.current_module().map(str::to_string);
        self.caller_id = context.caller_id.clone();
        self
    }

    /// Emits a record at the given level.
    pub fn log(&self, level: LogLevel, message: &str, extra: Option<&JsonMap>) {
        if level < self.level {
            return;
        }

        let extra = extra.map(|extra| {
            if self.redact_sensitive {
                extra
                    .iter()
                    .map(|(key, value)| {
                        if key.starts_with("_secret_") {
                            (key.clone(), Value::String(REDACTED_VALUE.to_string()))
                        } else {
                            (key.clone(), value.clone())
                        }
                    })
                    .collect::<JsonMap>()
            } else {
                extra.clone()
            }
        });

        let now = Utc::now();
        match self.format {
            LogFormat::Json => {
                let entry = json!({
                    "timestamp": now.to_rfc3339(),
                    "level": level.as_str(),
                    "message": message,
                    "trace_id": self.trace_id,
                    "module_id": self.module_id,
                    "caller_id": self.caller_id,
                    "logger": self.name,
                    "extra": extra,
                });
                if let Ok(line) = serde_json::to_string(&entry) {
                    self.sink.write_line(&line);
                }
            }
            LogFormat::Text => {
                let mut line = format!(
                    "{} [{}] [trace={}] [module={}] {message}",
                    now.format("%Y-%m-%d %H:%M:%S"),
                    level.as_str().to_uppercase(),
                    self.trace_id.as_deref().unwrap_or("none"),
                    self.module_id.as_deref().unwrap_or("none"),
                );
                if let Some(extra) = &extra {
                    for (key, value) in extra {
                        line.push_str(&format!(" {key}={}", render_scalar(value)));
                    }
                }
                self.sink.write_line(&line);
            }
        }
    }

    /// Logs at `trace`.
    pub fn trace(&self, message: &str, extra: Option<&JsonMap>) {
        self.log(LogLevel::Trace, message, extra);
    }

    /// Logs at `debug`.
    pub fn debug(&self, message: &str, extra: Option<&JsonMap>) {
        self.log(LogLevel::Debug, message, extra);
    }

    /// Logs at `info`.
    pub fn info(&self, message: &str, extra: Option<&JsonMap>) {
        self.log(LogLevel::Info, message, extra);
    }

    /// Logs at `warn`.
    pub fn warn(&self, message: &str, extra: Option<&JsonMap>) {
        self.log(LogLevel::Warn, message, extra);
    }

    /// Logs at `error`.
    pub fn error(&self, message: &str, extra: Option<&JsonMap>) {
        self.log(LogLevel::Error, message, extra);
    }

    /// Logs at `fatal`.
    pub fn fatal(&self, message: &str, extra: Option<&JsonMap>) {
        self.log(LogLevel::Fatal, message, extra);
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Observability logging middleware built on [`ContextLogger`].
///
/// Emits `"Module call started"` / `"Module call completed"` /
/// `"Module call failed"` at info/info/error, with `duration_ms` on
/// completion and failure. When logging inputs, the redacted copy from
/// the context is preferred over the raw payload.
pub struct ObsLoggingMiddleware {
    logger: ContextLogger,
    log_inputs: bool,
    log_outputs: bool,
}

impl Default for ObsLoggingMiddleware {
    fn default() -> Self {
        Self::new(ContextLogger::new("apcore.obs_logging"))
    }
}

impl ObsLoggingMiddleware {
    /// Creates a middleware emitting through `logger`.
    #[must_use]
    pub fn new(logger: ContextLogger) -> Self {
        Self {
            logger,
            log_inputs: true,
            log_outputs: true,
        }
    }

    /// Controls input logging.
    #[must_use]
    pub fn with_log_inputs(mut self, log_inputs: bool) -> Self {
        self.log_inputs = log_inputs;
        self
    }

    /// Controls output logging.
    #[must_use]
    pub fn with_log_outputs(mut self, log_outputs: bool) -> Self {
        self.log_outputs = log_outputs;
        self
    }
}

#[async_trait]
impl Middleware for ObsLoggingMiddleware {
    fn name(&self) -> &str {
        "ObsLoggingMiddleware"
    }

    async fn before(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        context.data().push(START_STACK_KEY, Instant::now());

        let mut extra = JsonMap::new();
        extra.insert("module_id".into(), json!(module_id));
        extra.insert("caller_id".into(), json!(context.caller_id));
        if self.log_inputs {
            let payload = context.redacted_inputs.as_ref().unwrap_or(inputs);
            extra.insert("inputs".into(), Value::Object(payload.clone()));
        }
        self.logger
            .clone()
            .with_context(context)
            .info("Module call started", Some(&extra));
        Ok(None)
    }

    async fn after(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        output: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let duration_ms = context
            .data()
            .pop::<Instant>(START_STACK_KEY)
            .map_or(0.0, |start| start.elapsed().as_secs_f64() * 1000.0);

        let mut extra = JsonMap::new();
        extra.insert("module_id".into(), json!(module_id));
        extra.insert("duration_ms".into(), json!(duration_ms));
        if self.log_outputs {
            extra.insert("output".into(), Value::Object(output.clone()));
        }
        self.logger
            .clone()
            .with_context(context)
            .info("Module call completed", Some(&extra));
        Ok(None)
    }

    async fn on_error(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        error: &ModuleError,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let duration_ms = context
            .data()
            .pop::<Instant>(START_STACK_KEY)
            .map_or(0.0, |start| start.elapsed().as_secs_f64() * 1000.0);

        let mut extra = JsonMap::new();
        extra.insert("module_id".into(), json!(module_id));
        extra.insert("duration_ms".into(), json!(duration_ms));
        extra.insert("error_code".into(), json!(apcore_types::ErrorCode::code(error)));
        extra.insert("error_message".into(), json!(error.to_string()));
        self.logger
            .clone()
            .with_context(context)
            .error("Module call failed", Some(&extra));
        Ok(None)
    }
}
