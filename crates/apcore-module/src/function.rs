//! Function-backed modules.
//!
//! [`FunctionModule`] adapts a plain closure to the [`Module`] interface
//! so it can participate in the full executor pipeline (ACL, middleware,
//! timeout, validation). This is the primitive behind the YAML binding
//! loader; embedding applications can also use it directly:
//!
//! ```
//! use apcore_module::FunctionModule;
//! use serde_json::json;
//!
//! let module = FunctionModule::builder("greet.hello")
//!     .description("Say hello")
//!     .handler(|inputs, _ctx| {
//!         let name = inputs["name"].as_str().unwrap_or("world");
//!         Ok(json!({"message": format!("hi {name}")}))
//!     })
//!     .build()
//!     .expect("valid module");
//! assert_eq!(module.module_id(), "greet.hello");
//! ```
//!
//! # Result normalization
//!
//! Handler return values are normalized into an output map: `null`
//! becomes `{}`, a JSON object passes through, anything else is wrapped
//! as `{"result": value}`. Structured records should be serialized to a
//! JSON object by the handler (`serde_json::to_value`).

use crate::Module;
use apcore_schema::ModuleSchema;
use apcore_types::{Context, JsonMap, ModuleAnnotations, ModuleError, ModuleExample};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

type SyncHandler = dyn Fn(JsonMap, &Context) -> Result<Value, ModuleError> + Send + Sync;
type AsyncHandler =
    dyn for<'a> Fn(JsonMap, &'a Context) -> BoxFuture<'a, Result<Value, ModuleError>> + Send + Sync;

enum Handler {
    Sync(Box<SyncHandler>),
    Async(Box<AsyncHandler>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Normalizes a handler return value into an output map.
#[must_use]
pub fn normalize_result(value: Value) -> JsonMap {
    match value {
        Value::Null => JsonMap::new(),
        Value::Object(map) => map,
        other => {
            let mut map = JsonMap::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

/// Derives a module id from a namespace and a symbol name.
///
/// Joins the parts with `.`, lowercases, replaces anything outside
/// `[a-z0-9_.]` with `_`, and prefixes digit-leading segments with `_`
/// so the result satisfies the module-id grammar.
#[must_use]
pub fn auto_module_id(namespace: &str, name: &str) -> String {
    let raw = if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    };
    let lowered = raw.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned
        .split('.')
        .map(|segment| {
            if segment.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                format!("_{segment}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// A module backed by a closure.
#[derive(Debug)]
pub struct FunctionModule {
    module_id: String,
    description: String,
    documentation: Option<String>,
    version: String,
    tags: Vec<String>,
    annotations: ModuleAnnotations,
    examples: Vec<ModuleExample>,
    metadata: JsonMap,
    input_schema: ModuleSchema,
    output_schema: ModuleSchema,
    handler: Handler,
}

impl FunctionModule {
    /// Starts building a function module with the given id.
    #[must_use]
    pub fn builder(module_id: impl Into<String>) -> FunctionModuleBuilder {
        FunctionModuleBuilder::new(module_id)
    }

    /// The module id this function was built for.
    #[must_use]
    pub fn module_id(&self) -> &str {
        &self.module_id
    }
}

#[async_trait]
impl Module for FunctionModule {
    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> &ModuleSchema {
        &self.input_schema
    }

    fn output_schema(&self) -> &ModuleSchema {
        &self.output_schema
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn annotations(&self) -> ModuleAnnotations {
        self.annotations
    }

    fn examples(&self) -> Vec<ModuleExample> {
        self.examples.clone()
    }

    fn metadata(&self) -> JsonMap {
        self.metadata.clone()
    }

    fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    async fn execute(&self, inputs: JsonMap, ctx: &Context) -> Result<JsonMap, ModuleError> {
        let value = match &self.handler {
            Handler::Sync(handler) => handler(inputs, ctx)?,
            Handler::Async(handler) => handler(inputs, ctx).await?,
        };
        Ok(normalize_result(value))
    }
}

/// Builder for [`FunctionModule`].
///
/// Description priority: explicit [`description`] > first non-empty line
/// of [`doc`] > `"Module {name}"` where `name` defaults to the last id
/// segment.
///
/// [`description`]: FunctionModuleBuilder::description
/// [`doc`]: FunctionModuleBuilder::doc
pub struct FunctionModuleBuilder {
    module_id: String,
    name: Option<String>,
    description: Option<String>,
    doc: Option<String>,
    documentation: Option<String>,
    version: String,
    tags: Vec<String>,
    annotations: ModuleAnnotations,
    examples: Vec<ModuleExample>,
    metadata: JsonMap,
    input_schema: Option<ModuleSchema>,
    output_schema: Option<ModuleSchema>,
    handler: Option<Handler>,
}

impl FunctionModuleBuilder {
    fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            name: None,
            description: None,
            doc: None,
            documentation: None,
            version: "1.0.0".to_string(),
            tags: Vec::new(),
            annotations: ModuleAnnotations::default(),
            examples: Vec::new(),
            metadata: JsonMap::new(),
            input_schema: None,
            output_schema: None,
            handler: None,
        }
    }

    /// Function name used for the `"Module {name}"` fallback.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit description (highest priority).
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Doc text; its first non-empty line becomes the description when
    /// no explicit one is given.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Long-form documentation.
    #[must_use]
    pub fn documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    /// Module version (default `1.0.0`).
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Classification tags.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Behavioral annotations.
    #[must_use]
    pub fn annotations(mut self, annotations: ModuleAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    /// Example invocations.
    #[must_use]
    pub fn examples(mut self, examples: Vec<ModuleExample>) -> Self {
        self.examples = examples;
        self
    }

    /// Free-form metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Input schema; permissive when omitted.
    #[must_use]
    pub fn input_schema(mut self, schema: ModuleSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Output schema; permissive when omitted.
    #[must_use]
    pub fn output_schema(mut self, schema: ModuleSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Synchronous handler.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(JsonMap, &Context) -> Result<Value, ModuleError> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::Sync(Box::new(handler)));
        self
    }

    /// Asynchronous handler.
    #[must_use]
    pub fn async_handler<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(JsonMap, &'a Context) -> BoxFuture<'a, Result<Value, ModuleError>>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Handler::Async(Box::new(handler)));
        self
    }

    /// Finalizes the module.
    ///
    /// # Errors
    ///
    /// `GENERAL_INVALID_INPUT` when no handler was provided.
    pub fn build(self) -> Result<FunctionModule, ModuleError> {
        let handler = self
            .handler
            .ok_or_else(|| ModuleError::invalid_input("function module requires a handler"))?;

        let name = self.name.unwrap_or_else(|| {
            self.module_id
                .rsplit('.')
                .next()
                .unwrap_or(&self.module_id)
                .to_string()
        });

        let description = self
            .description
            .or_else(|| {
                self.doc.as_deref().and_then(|doc| {
                    doc.lines()
                        .map(str::trim)
                        .find(|line| !line.is_empty())
                        .map(str::to_string)
                })
            })
            .unwrap_or_else(|| format!("Module {name}"));

        Ok(FunctionModule {
            module_id: self.module_id,
            description,
            documentation: self.documentation,
            version: self.version,
            tags: self.tags,
            annotations: self.annotations,
            examples: self.examples,
            metadata: self.metadata,
            input_schema: self.input_schema.unwrap_or_else(ModuleSchema::permissive),
            output_schema: self.output_schema.unwrap_or_else(ModuleSchema::permissive),
            handler,
        })
    }
}
