//! Unified error model for apcore.
//!
//! Every error that crosses the executor surface is a [`ModuleError`]: a
//! structured record carrying a stable machine-readable code, a human
//! message, a UTC timestamp, a details map, and an optional cause. The
//! concrete failure is described by [`ErrorKind`].
//!
//! # Design
//!
//! - **Stable codes**: each kind maps to exactly one `UPPER_SNAKE_CASE`
//!   code via the [`ErrorCode`] trait. Codes are an API contract and must
//!   not change once defined.
//! - **Structured details**: [`ModuleError::details`] renders the
//!   kind-specific fields (module id, call chain, validation issues, ...)
//!   as a JSON map so callers and log sinks never parse messages.
//! - **Recoverability**: [`ErrorCode::is_recoverable`] drives retry logic.
//!   Only transient conditions (timeouts) are recoverable; invalid input,
//!   denied access and broken configuration are not.
//!
//! # Example
//!
//! ```
//! use apcore_types::{ErrorCode, ErrorKind, ModuleError};
//!
//! let err = ModuleError::from(ErrorKind::ModuleNotFound {
//!     module_id: "billing.invoice".into(),
//! });
//! assert_eq!(err.code(), "MODULE_NOT_FOUND");
//! assert!(!err.is_recoverable());
//! assert_eq!(err.details()["module_id"], "billing.invoice");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Unified error code interface.
///
/// Implemented by [`ErrorKind`] and [`ModuleError`] so both the bare kind
/// and the enriched record expose the same stable code.
///
/// # Code Format
///
/// - `UPPER_SNAKE_CASE`
/// - Domain-prefixed where useful (`SCHEMA_`, `BINDING_`, `CALL_`)
/// - Stable across versions (changing a code is a breaking change)
pub trait ErrorCode {
    /// Returns the machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// One structured validation failure.
///
/// `path` is a `/`-joined JSON Pointer into the offending document,
/// `constraint` names the violated JSON-Schema keyword (`required`, `type`,
/// `minLength`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location of the failure, e.g. `/user/name`.
    pub path: String,
    /// Violated constraint keyword, e.g. `required`, `maximum`, `enum`.
    pub constraint: String,
    /// Human-readable description.
    pub message: String,
    /// What the schema expected, when meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// The offending value, when meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl ValidationIssue {
    /// Creates an issue without expected/actual context.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            constraint: constraint.into(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Attaches the expected value.
    #[must_use]
    pub fn with_expected(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Attaches the actual value.
    #[must_use]
    pub fn with_actual(mut self, actual: Value) -> Self {
        self.actual = Some(actual);
        self
    }
}

/// Aggregated outcome of a validation pass.
///
/// Returned by `Executor::validate` and the schema validator instead of an
/// error so callers can inspect every failure at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether validation passed.
    pub valid: bool,
    /// All collected failures; empty when `valid`.
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing result from collected issues.
    #[must_use]
    pub fn failed(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// Converts a failing result into a [`ModuleError`].
    ///
    /// # Panics
    ///
    /// Panics if called on a passing result; that is a programming error,
    /// not a runtime condition.
    #[must_use]
    pub fn into_error(self, message: impl Into<String>) -> ModuleError {
        assert!(!self.valid, "cannot convert a passing result into an error");
        ErrorKind::SchemaValidation {
            message: message.into(),
            issues: self.errors,
        }
        .into()
    }
}

/// The concrete failure taxonomy.
///
/// Variant fields mirror the details map each code carries; see
/// [`ModuleError::details`].
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// A configuration file does not exist.
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration content is invalid.
    #[error("{message}")]
    ConfigInvalid { message: String },

    /// An ACL rule is structurally invalid.
    #[error("{message}")]
    AclRule { message: String },

    /// The ACL evaluated to deny.
    #[error("access denied: {} -> {target_id}", .caller_id.as_deref().unwrap_or("@external"))]
    AclDenied {
        caller_id: Option<String>,
        target_id: String,
    },

    /// Registry lookup miss.
    #[error("module not found: {module_id}")]
    ModuleNotFound { module_id: String },

    /// Handler exceeded its effective timeout.
    #[error("module {module_id} timed out after {timeout_ms}ms")]
    ModuleTimeout { module_id: String, timeout_ms: u64 },

    /// A module could not be loaded or resolved during discovery.
    #[error("failed to load module '{module_id}': {reason}")]
    ModuleLoad { module_id: String, reason: String },

    /// A handler failed while executing.
    #[error("module {module_id} failed: {message}")]
    ModuleExecute { module_id: String, message: String },

    /// Input or output failed schema validation.
    #[error("{message}")]
    SchemaValidation {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    /// A schema file or reference target does not exist.
    #[error("schema not found: {schema_id}")]
    SchemaNotFound { schema_id: String },

    /// A schema uses invalid syntax or an unsupported keyword.
    #[error("{message}")]
    SchemaParse { message: String },

    /// Circular `$ref` chain, or reference depth exhausted.
    #[error("circular reference detected: {ref_path}")]
    SchemaCircularRef { ref_path: String },

    /// Call chain longer than the configured maximum.
    #[error("call depth {depth} exceeds maximum {max_depth}")]
    CallDepthExceeded {
        depth: usize,
        max_depth: usize,
        call_chain: Vec<String>,
    },

    /// A cycle of length >= 2 in the call chain.
    #[error("circular call detected for module {module_id}")]
    CircularCall {
        module_id: String,
        call_chain: Vec<String>,
    },

    /// A module repeated too often in one call chain.
    #[error("module {module_id} called {count} times, max is {max_repeat}")]
    CallFrequencyExceeded {
        module_id: String,
        count: usize,
        max_repeat: usize,
        call_chain: Vec<String>,
    },

    /// Caller misuse: negative timeout, duplicate registration, bad event
    /// name, malformed module id.
    #[error("{message}")]
    InvalidInput { message: String },

    /// An invariant broke inside the framework itself.
    #[error("{message}")]
    Internal { message: String },

    /// A middleware `before` hook failed; wraps the original error.
    #[error("middleware chain failed: {message}")]
    MiddlewareChain {
        message: String,
        executed: Vec<String>,
    },

    /// Circular dependency among discovered modules.
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// A binding target string is not in `path:Symbol` form.
    #[error("invalid binding target '{target}'")]
    BindingInvalidTarget { target: String },

    /// A binding target is not present in the function table.
    #[error("binding target '{target}' is not registered")]
    BindingTargetNotFound { target: String },

    /// No schema could be determined for a binding.
    #[error("no schema available for binding target '{target}'")]
    BindingSchemaMissing { target: String },

    /// A bindings file failed to parse or is structurally invalid.
    #[error("invalid binding file '{path}': {reason}")]
    BindingFileInvalid { path: String, reason: String },
}

impl ErrorCode for ErrorKind {
    fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            Self::ConfigInvalid { .. } => "CONFIG_INVALID",
            Self::AclRule { .. } => "ACL_RULE_ERROR",
            Self::AclDenied { .. } => "ACL_DENIED",
            Self::ModuleNotFound { .. } => "MODULE_NOT_FOUND",
            Self::ModuleTimeout { .. } => "MODULE_TIMEOUT",
            Self::ModuleLoad { .. } => "MODULE_LOAD_ERROR",
            Self::ModuleExecute { .. } => "MODULE_EXECUTE_ERROR",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_ERROR",
            Self::SchemaNotFound { .. } => "SCHEMA_NOT_FOUND",
            Self::SchemaParse { .. } => "SCHEMA_PARSE_ERROR",
            Self::SchemaCircularRef { .. } => "SCHEMA_CIRCULAR_REF",
            Self::CallDepthExceeded { .. } => "CALL_DEPTH_EXCEEDED",
            Self::CircularCall { .. } => "CIRCULAR_CALL",
            Self::CallFrequencyExceeded { .. } => "CALL_FREQUENCY_EXCEEDED",
            Self::InvalidInput { .. } => "GENERAL_INVALID_INPUT",
            Self::Internal { .. } => "GENERAL_INTERNAL_ERROR",
            Self::MiddlewareChain { .. } => "MIDDLEWARE_CHAIN_ERROR",
            Self::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            Self::BindingInvalidTarget { .. } => "BINDING_INVALID_TARGET",
            Self::BindingTargetNotFound { .. } => "BINDING_TARGET_NOT_FOUND",
            Self::BindingSchemaMissing { .. } => "BINDING_SCHEMA_MISSING",
            Self::BindingFileInvalid { .. } => "BINDING_FILE_INVALID",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::ModuleTimeout { .. })
    }
}

/// A structured apcore error: kind + timestamp + optional trace id + cause.
///
/// Cloneable so recovery paths and telemetry can hold a copy; the cause is
/// reference-counted.
#[derive(Debug, Clone)]
pub struct ModuleError {
    kind: ErrorKind,
    timestamp: DateTime<Utc>,
    trace_id: Option<String>,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ModuleError {
    /// Creates an error from a kind, stamping the current UTC time.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            trace_id: None,
            cause: None,
        }
    }

    /// Shorthand for [`ErrorKind::InvalidInput`].
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput {
            message: message.into(),
        })
    }

    /// Shorthand for [`ErrorKind::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Shorthand for [`ErrorKind::ConfigInvalid`].
    #[must_use]
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid {
            message: message.into(),
        })
    }

    /// Shorthand for [`ErrorKind::SchemaParse`].
    #[must_use]
    pub fn schema_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaParse {
            message: message.into(),
        })
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attaches the trace id of the call that failed.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// The failure kind.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The human-readable message (without the code prefix).
    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// When the error was created.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Trace id of the failing call, when known.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// The wrapped cause, when present.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.cause.as_deref()
    }

    /// Renders the kind-specific fields as a JSON map.
    #[must_use]
    pub fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match &self.kind {
            ErrorKind::ConfigNotFound { path } => {
                map.insert("config_path".into(), json!(path));
            }
            ErrorKind::AclDenied {
                caller_id,
                target_id,
            } => {
                map.insert("caller_id".into(), json!(caller_id));
                map.insert("target_id".into(), json!(target_id));
            }
            ErrorKind::ModuleNotFound { module_id } => {
                map.insert("module_id".into(), json!(module_id));
            }
            ErrorKind::ModuleTimeout {
                module_id,
                timeout_ms,
            } => {
                map.insert("module_id".into(), json!(module_id));
                map.insert("timeout_ms".into(), json!(timeout_ms));
            }
            ErrorKind::ModuleLoad { module_id, reason } => {
                map.insert("module_id".into(), json!(module_id));
                map.insert("reason".into(), json!(reason));
            }
            ErrorKind::ModuleExecute { module_id, .. } => {
                map.insert("module_id".into(), json!(module_id));
            }
            ErrorKind::SchemaValidation { issues, .. } => {
                map.insert("errors".into(), json!(issues));
            }
            ErrorKind::SchemaNotFound { schema_id } => {
                map.insert("schema_id".into(), json!(schema_id));
            }
            ErrorKind::SchemaCircularRef { ref_path } => {
                map.insert("ref_path".into(), json!(ref_path));
            }
            ErrorKind::CallDepthExceeded {
                depth,
                max_depth,
                call_chain,
            } => {
                map.insert("depth".into(), json!(depth));
                map.insert("max_depth".into(), json!(max_depth));
                map.insert("call_chain".into(), json!(call_chain));
            }
            ErrorKind::CircularCall {
                module_id,
                call_chain,
            } => {
                map.insert("module_id".into(), json!(module_id));
                map.insert("call_chain".into(), json!(call_chain));
            }
            ErrorKind::CallFrequencyExceeded {
                module_id,
                count,
                max_repeat,
                call_chain,
            } => {
                map.insert("module_id".into(), json!(module_id));
                map.insert("count".into(), json!(count));
                map.insert("max_repeat".into(), json!(max_repeat));
                map.insert("call_chain".into(), json!(call_chain));
            }
            ErrorKind::MiddlewareChain { executed, .. } => {
                map.insert("executed_middlewares".into(), json!(executed));
            }
            ErrorKind::CircularDependency { cycle } => {
                map.insert("cycle_path".into(), json!(cycle));
            }
            ErrorKind::BindingInvalidTarget { target }
            | ErrorKind::BindingTargetNotFound { target }
            | ErrorKind::BindingSchemaMissing { target } => {
                map.insert("target".into(), json!(target));
            }
            ErrorKind::BindingFileInvalid { path, reason } => {
                map.insert("file_path".into(), json!(path));
                map.insert("reason".into(), json!(reason));
            }
            ErrorKind::ConfigInvalid { .. }
            | ErrorKind::AclRule { .. }
            | ErrorKind::SchemaParse { .. }
            | ErrorKind::InvalidInput { .. }
            | ErrorKind::Internal { .. } => {}
        }
        map
    }
}

impl ErrorCode for ModuleError {
    fn code(&self) -> &'static str {
        self.kind.code()
    }

    fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.kind)
    }
}

impl std::error::Error for ModuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for ModuleError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
