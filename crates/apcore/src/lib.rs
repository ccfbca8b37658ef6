//! apcore: an in-process module execution runtime.
//!
//! Dispatches structured, typed requests to named handler units
//! ("modules") through a fixed safety-and-validation pipeline, guarded
//! by an access-control matcher, wrapped in an onion-style middleware
//! chain, and observable via tracing, metrics, and structured logging.
//!
//! This crate is the convenience facade: it re-exports the public
//! surface of the SDK crates (`apcore-types`, `apcore-schema`,
//! `apcore-module`, `apcore-acl`) and the runtime crate
//! (`apcore-runtime`). Depend on the individual crates instead when you
//! only need a slice: module authors typically want just
//! `apcore-types` + `apcore-module`.
//!
//! # Quick start
//!
//! ```
//! use apcore::{Executor, FunctionModule, Registry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! let module = FunctionModule::builder("greet.hello")
//!     .description("Say hello")
//!     .handler(|inputs, _ctx| {
//!         let name = inputs["name"].as_str().unwrap_or("world");
//!         Ok(json!({"message": format!("hi {name}")}))
//!     })
//!     .build()
//!     .expect("valid module");
//! registry.register("greet.hello", Arc::new(module)).expect("registers");
//!
//! let executor = Executor::new(registry);
//! let inputs = json!({"name": "Alice"}).as_object().cloned().unwrap();
//! let output = executor.call("greet.hello", inputs, None).expect("executes");
//! assert_eq!(output["message"], "hi Alice");
//! ```

// Shared model.
pub use apcore_types::{
    match_pattern, Config, Context, DataMap, ErrorCode, ErrorKind, Identity, JsonMap,
    ModuleAnnotations, ModuleError, ModuleExample, ValidationIssue, ValidationResult,
    REDACTED_VALUE,
};

// Schema engine.
pub use apcore_schema::{
    to_strict, CompiledSchema, ExportProfile, ModuleSchema, RefResolver, SchemaDefinition,
    SchemaExporter, SchemaLoader, SchemaStrategy, SchemaValidator,
};

// Module abstraction.
pub use apcore_module::{
    auto_module_id, normalize_result, validate_module, ChunkSink, DependencyInfo,
    DiscoveredModule, FunctionModule, FunctionModuleBuilder, Module, ModuleDescriptor,
};

// Access control.
pub use apcore_acl::{Acl, AclRule, Effect, RuleConditions, EXTERNAL_CALLER};

// Runtime.
pub use apcore_runtime::{
    is_valid_module_id, redact_sensitive, AfterMiddleware, BeforeMiddleware, BindingLoader,
    CallOptions, ContextLogger, Executor, FunctionTable, InMemoryExporter, LogFormat, LogLevel,
    LogSink, LoggingMiddleware, MemorySink, MetricsCollector, MetricsMiddleware, Middleware,
    MiddlewareManager, ModuleCatalog, NativeFunction, ObsLoggingMiddleware, Registry,
    RegistryEvent, RootSpec, SamplingStrategy, Span, SpanExporter, StdoutExporter,
    TracingMiddleware,
};

#[cfg(feature = "otlp")]
pub use apcore_runtime::observability::OtlpExporter;
