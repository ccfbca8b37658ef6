//! The `Module` trait: the unit of execution.
//!
//! A module is anything implementing the capability set
//! `{input_schema, output_schema, description, execute}`. The executor
//! drives modules exclusively through this trait; the registry stores
//! them as `Arc<dyn Module>`.
//!
//! # Sync vs async
//!
//! The interface is uniformly async: a synchronous handler simply
//! returns without suspending. The executor's synchronous entry point
//! drives the future to completion on a worker, so module authors never
//! deal with two interfaces.
//!
//! # Example
//!
//! ```
//! use apcore_module::Module;
//! use apcore_schema::ModuleSchema;
//! use apcore_types::{Context, JsonMap, ModuleError};
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! struct Echo {
//!     input: ModuleSchema,
//!     output: ModuleSchema,
//! }
//!
//! #[async_trait]
//! impl Module for Echo {
//!     fn description(&self) -> &str {
//!         "Echo inputs back"
//!     }
//!
//!     fn input_schema(&self) -> &ModuleSchema {
//!         &self.input
//!     }
//!
//!     fn output_schema(&self) -> &ModuleSchema {
//!         &self.output
//!     }
//!
//!     async fn execute(
//!         &self,
//!         inputs: JsonMap,
//!         _ctx: &Context,
//!     ) -> Result<JsonMap, ModuleError> {
//!         Ok(inputs)
//!     }
//! }
//!
//! let echo = Echo {
//!     input: ModuleSchema::permissive(),
//!     output: ModuleSchema::permissive(),
//! };
//! let inputs = json!({"k": 1}).as_object().cloned().unwrap();
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let ctx = Context::root().child("echo");
//! let out = rt.block_on(echo.execute(inputs.clone(), &ctx)).unwrap();
//! assert_eq!(out, inputs);
//! ```

use apcore_schema::ModuleSchema;
use apcore_types::{Context, JsonMap, ModuleAnnotations, ModuleError, ModuleExample};
use async_trait::async_trait;

/// Channel end a streaming module pushes chunks into.
pub type ChunkSink = tokio::sync::mpsc::Sender<JsonMap>;

/// A registered unit of execution.
///
/// Only `description`, the two schemas, and `execute` are mandatory;
/// everything else has conservative defaults.
#[async_trait]
pub trait Module: Send + Sync {
    /// Human description of what the module does. Must be non-empty.
    fn description(&self) -> &str;

    /// Validator for call inputs.
    fn input_schema(&self) -> &ModuleSchema;

    /// Validator for handler outputs.
    fn output_schema(&self) -> &ModuleSchema;

    /// Module version.
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Classification tags for registry filtering.
    fn tags(&self) -> &[String] {
        &[]
    }

    /// Behavioral annotations.
    fn annotations(&self) -> ModuleAnnotations {
        ModuleAnnotations::default()
    }

    /// Example invocations.
    fn examples(&self) -> Vec<ModuleExample> {
        Vec::new()
    }

    /// Free-form metadata (merged with YAML metadata by the registry).
    fn metadata(&self) -> JsonMap {
        JsonMap::new()
    }

    /// Optional long-form documentation.
    fn documentation(&self) -> Option<&str> {
        None
    }

    /// Lifecycle hook invoked on registration. A failure removes the
    /// module from the registry again and propagates.
    fn on_load(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Lifecycle hook invoked on unregistration.
    fn on_unload(&self) {}

    /// Executes the module.
    ///
    /// `inputs` has already passed input validation; the return value
    /// will be validated against [`Module::output_schema`].
    async fn execute(&self, inputs: JsonMap, ctx: &Context) -> Result<JsonMap, ModuleError>;

    /// Whether [`Module::stream`] is implemented.
    fn supports_stream(&self) -> bool {
        false
    }

    /// Streams partial outputs through `sink`.
    ///
    /// Chunks are shallow-merged by the executor into the accumulated
    /// output, which is then validated against the output schema.
    ///
    /// # Errors
    ///
    /// The default implementation rejects streaming.
    async fn stream(
        &self,
        inputs: JsonMap,
        ctx: &Context,
        sink: ChunkSink,
    ) -> Result<(), ModuleError> {
        let _ = (inputs, ctx, sink);
        Err(ModuleError::invalid_input(
            "module does not support streaming",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed {
        input: ModuleSchema,
        output: ModuleSchema,
    }

    #[async_trait]
    impl Module for Fixed {
        fn description(&self) -> &str {
            "fixed output"
        }

        fn input_schema(&self) -> &ModuleSchema {
            &self.input
        }

        fn output_schema(&self) -> &ModuleSchema {
            &self.output
        }

        async fn execute(&self, _inputs: JsonMap, _ctx: &Context) -> Result<JsonMap, ModuleError> {
            Ok(json!({"done": true}).as_object().cloned().unwrap_or_default())
        }
    }

    fn fixed() -> Fixed {
        Fixed {
            input: ModuleSchema::permissive(),
            output: ModuleSchema::permissive(),
        }
    }

    #[tokio::test]
    async fn defaults_are_conservative() {
        let module = fixed();
        assert_eq!(module.version(), "1.0.0");
        assert!(module.tags().is_empty());
        assert!(module.metadata().is_empty());
        assert!(module.examples().is_empty());
        assert!(module.documentation().is_none());
        assert!(!module.supports_stream());
        assert_eq!(module.annotations(), ModuleAnnotations::default());
    }

    #[tokio::test]
    async fn default_stream_rejects() {
        let module = fixed();
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let ctx = Context::root().child("fixed");
        let err = module
            .stream(JsonMap::new(), &ctx, tx)
            .await
            .expect_err("no streaming");
        assert!(err.to_string().contains("streaming"));
    }

    #[tokio::test]
    async fn object_safe() {
        let module: std::sync::Arc<dyn Module> = std::sync::Arc::new(fixed());
        let ctx = Context::root().child("fixed");
        let out = module.execute(JsonMap::new(), &ctx).await.expect("executes");
        assert_eq!(out["done"], json!(true));
    }
}
