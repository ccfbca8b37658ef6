//! apcore runtime: the layer that actually runs modules.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SDK Layer                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  apcore-types   : Context, Identity, Config, errors          │
//! │  apcore-schema  : bundles, validator, exporters              │
//! │  apcore-module  : Module trait, FunctionModule               │
//! │  apcore-acl     : access-control rules + engine              │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Runtime Layer (THIS CRATE)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  registry/      : store, events, 8-step discovery            │
//! │  middleware/    : onion hooks, snapshot manager, adapters    │
//! │  executor/      : the 10-step call pipeline                  │
//! │  observability/ : tracing, metrics, structured logging       │
//! │  bindings       : YAML bindings over a function table        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # A single call
//!
//! caller → [`Executor::call`] → context derived → safety checks →
//! [`Registry`] lookup → ACL check → input validation + redaction →
//! middleware before-chain → handler (timeout-enforced) → output
//! validation → middleware after-chain → result. Errors after input
//! validation walk the executed middleware prefix for recovery.
//!
//! # Example
//!
//! ```
//! use apcore_module::FunctionModule;
//! use apcore_runtime::{Executor, Registry};
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

pub mod bindings;
pub mod executor;
pub mod middleware;
pub mod observability;
pub mod registry;

pub use bindings::{BindingLoader, FunctionTable, NativeFunction};
pub use executor::{
    redact_sensitive, CallOptions, Executor, DEFAULT_GLOBAL_TIMEOUT_MS, DEFAULT_MAX_CALL_DEPTH,
    DEFAULT_MAX_MODULE_REPEAT, DEFAULT_TIMEOUT_MS,
};
pub use middleware::{
    AfterMiddleware, BeforeMiddleware, LoggingMiddleware, Middleware, MiddlewareChainError,
    MiddlewareManager,
};
pub use observability::{
    ContextLogger, InMemoryExporter, LogFormat, LogLevel, LogSink, MemorySink, MetricsCollector,
    MetricsMiddleware, ObsLoggingMiddleware, SamplingStrategy, Span, SpanExporter, StdoutExporter,
    TracingMiddleware,
};
pub use registry::{
    is_valid_module_id, ModuleCatalog, ModuleFactory, Registry, RegistryCallback, RegistryEvent,
    RootSpec,
};
