//! YAML binding loader.
//!
//! Bindings integrate existing functions as modules without code
//! changes to the functions themselves. A bindings file lists entries:
//!
//! ```yaml
//! bindings:
//!   - module_id: dates.format
//!     target: "dates:format_date"
//!     description: Format a date
//!     input_schema:
//!       type: object
//!       properties:
//!         date: {type: string}
//!       required: [date]
//! ```
//!
//! A scripting runtime resolves `target` by importing code at load
//! time; here the embedding binary registers its callables in a
//! [`FunctionTable`] up front and `target` strings are looked up
//! exactly (`"path:Symbol"` or `"path:Type.method"`).
//!
//! Schemas come from one of four modes: `auto_schema: true` (the
//! schemas registered alongside the function), inline `input_schema` /
//! `output_schema`, `schema_ref` (an external YAML file), or the
//! default (same as `auto_schema`). Inline schemas using unsupported
//! JSON-Schema features degrade to a permissive schema.

use crate::registry::Registry;
use apcore_module::FunctionModule;
use apcore_schema::ModuleSchema;
use apcore_types::{match_pattern, Context, ErrorKind, JsonMap, ModuleError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

type SyncFn = dyn Fn(JsonMap, &Context) -> Result<Value, ModuleError> + Send + Sync;
type AsyncFn =
    dyn for<'a> Fn(JsonMap, &'a Context) -> BoxFuture<'a, Result<Value, ModuleError>> + Send + Sync;

/// A callable registered for binding resolution.
#[derive(Clone)]
pub enum NativeFunction {
    /// Synchronous function.
    Sync(Arc<SyncFn>),
    /// Asynchronous function.
    Async(Arc<AsyncFn>),
}

#[derive(Clone)]
struct RegisteredFunction {
    function: NativeFunction,
    input_schema: Option<ModuleSchema>,
    output_schema: Option<ModuleSchema>,
}

/// Table of callables the embedding binary exposes to bindings.
#[derive(Default)]
pub struct FunctionTable {
    entries: Mutex<HashMap<String, RegisteredFunction>>,
}

impl FunctionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous function under a target string.
    pub fn register<F>(&self, target: &str, function: F)
    where
        F: Fn(JsonMap, &Context) -> Result<Value, ModuleError> + Send + Sync + 'static,
    {
        self.entries.lock().insert(
            target.to_string(),
            RegisteredFunction {
                function: NativeFunction::Sync(Arc::new(function)),
                input_schema: None,
                output_schema: None,
            },
        );
    }

    /// Registers an asynchronous function under a target string.
    pub fn register_async<F>(&self, target: &str, function: F)
    where
        F: for<'a> Fn(JsonMap, &'a Context) -> BoxFuture<'a, Result<Value, ModuleError>>
            + Send
            + Sync
            + 'static,
    {
        self.entries.lock().insert(
            target.to_string(),
            RegisteredFunction {
                function: NativeFunction::Async(Arc::new(function)),
                input_schema: None,
                output_schema: None,
            },
        );
    }

    /// Registers a synchronous function together with its declared
    /// schemas (used by the `auto_schema` binding mode).
    pub fn register_with_schemas<F>(
        &self,
        target: &str,
        function: F,
        input_schema: ModuleSchema,
        output_schema: ModuleSchema,
    ) where
        F: Fn(JsonMap, &Context) -> Result<Value, ModuleError> + Send + Sync + 'static,
    {
        self.entries.lock().insert(
            target.to_string(),
            RegisteredFunction {
                function: NativeFunction::Sync(Arc::new(function)),
                input_schema: Some(input_schema),
                output_schema: Some(output_schema),
            },
        );
    }

    fn get(&self, target: &str) -> Option<RegisteredFunction> {
        self.entries.lock().get(target).cloned()
    }

    /// Number of registered targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Loads binding files and registers the resulting modules.
pub struct BindingLoader {
    table: Arc<FunctionTable>,
}

impl BindingLoader {
    /// Creates a loader resolving targets against `table`.
    #[must_use]
    pub fn new(table: Arc<FunctionTable>) -> Self {
        Self { table }
    }

    /// Loads one bindings file, registering every entry.
    ///
    /// Returns the registered module ids in file order.
    ///
    /// # Errors
    ///
    /// `BINDING_FILE_INVALID` for structural problems, the binding
    /// error family for bad entries, and registry errors for duplicate
    /// ids.
    pub fn load_bindings(
        &self,
        file_path: &Path,
        registry: &Registry,
    ) -> Result<Vec<String>, ModuleError> {
        let content = std::fs::read_to_string(file_path)
            .map_err(|e| file_invalid(file_path, format!("{e}")))?;
        let data: Value = serde_yaml::from_str(&content)
            .map_err(|e| file_invalid(file_path, format!("YAML parse error: {e}")))?;

        if data.is_null() {
            return Err(file_invalid(file_path, "file is empty".to_string()));
        }
        let bindings = data
            .as_object()
            .and_then(|map| map.get("bindings"))
            .ok_or_else(|| file_invalid(file_path, "missing 'bindings' key".to_string()))?
            .as_array()
            .ok_or_else(|| file_invalid(file_path, "'bindings' must be a list".to_string()))?;

        let binding_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
        let mut registered = Vec::with_capacity(bindings.len());
        for entry in bindings {
            let entry = entry
                .as_object()
                .ok_or_else(|| file_invalid(file_path, "binding entry must be a mapping".to_string()))?;
            let module_id = entry
                .get("module_id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    file_invalid(file_path, "binding entry missing 'module_id'".to_string())
                })?;
            if entry.get("target").is_none() {
                return Err(file_invalid(
                    file_path,
                    "binding entry missing 'target'".to_string(),
                ));
            }

            let module = self.create_module(entry, binding_dir)?;
            registry.register(module_id, Arc::new(module))?;
            registered.push(module_id.to_string());
        }
        Ok(registered)
    }

    /// Loads every file in `dir_path` whose name matches `pattern`
    /// (wildcard syntax), in sorted order.
    ///
    /// # Errors
    ///
    /// `BINDING_FILE_INVALID` when the directory does not exist, plus
    /// per-file loading errors.
    pub fn load_binding_dir(
        &self,
        dir_path: &Path,
        registry: &Registry,
        pattern: &str,
    ) -> Result<Vec<String>, ModuleError> {
        if !dir_path.is_dir() {
            return Err(file_invalid(
                dir_path,
                "directory does not exist".to_string(),
            ));
        }

        let mut files: Vec<std::path::PathBuf> = std::fs::read_dir(dir_path)
            .map_err(|e| file_invalid(dir_path, format!("{e}")))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|name| match_pattern(pattern, &name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let mut registered = Vec::new();
        for file in files {
            registered.extend(self.load_bindings(&file, registry)?);
        }
        Ok(registered)
    }

    fn create_module(
        &self,
        entry: &JsonMap,
        binding_dir: &Path,
    ) -> Result<FunctionModule, ModuleError> {
        let target = entry
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let module_id = entry
            .get("module_id")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if !target.contains(':') {
            return Err(ErrorKind::BindingInvalidTarget {
                target: target.to_string(),
            }
            .into());
        }
        let resolved = self.table.get(target).ok_or_else(|| {
            ModuleError::from(ErrorKind::BindingTargetNotFound {
                target: target.to_string(),
            })
        })?;

        let (input_schema, output_schema) = self.determine_schemas(entry, &resolved, target, binding_dir)?;
        debug!(module_id, target, "binding resolved");

        let mut builder = FunctionModule::builder(module_id)
            .input_schema(input_schema)
            .output_schema(output_schema);

        if let Some(description) = entry.get("description").and_then(Value::as_str) {
            builder = builder.description(description);
        }
        if let Some(tags) = entry.get("tags").and_then(Value::as_array) {
            builder = builder.tags(tags.iter().filter_map(Value::as_str));
        }
        if let Some(version) = entry.get("version").and_then(Value::as_str) {
            builder = builder.version(version);
        }

        builder = match resolved.function {
            NativeFunction::Sync(function) => {
                builder.handler(move |inputs, ctx| function(inputs, ctx))
            }
            NativeFunction::Async(function) => {
                builder.async_handler(move |inputs, ctx| function(inputs, ctx))
            }
        };

        builder.build()
    }

    fn determine_schemas(
        &self,
        entry: &JsonMap,
        resolved: &RegisteredFunction,
        target: &str,
        binding_dir: &Path,
    ) -> Result<(ModuleSchema, ModuleSchema), ModuleError> {
        let auto = || -> Result<(ModuleSchema, ModuleSchema), ModuleError> {
            match (&resolved.input_schema, &resolved.output_schema) {
                (Some(input), Some(output)) => Ok((input.clone(), output.clone())),
                _ => Err(ErrorKind::BindingSchemaMissing {
                    target: target.to_string(),
                }
                .into()),
            }
        };

        if entry.get("auto_schema").and_then(Value::as_bool) == Some(true) {
            return auto();
        }

        if entry.contains_key("input_schema") || entry.contains_key("output_schema") {
            let input = compile_lenient(entry.get("input_schema"));
            let output = compile_lenient(entry.get("output_schema"));
            return Ok((input, output));
        }

        if let Some(schema_ref) = entry.get("schema_ref").and_then(Value::as_str) {
            let ref_path = binding_dir.join(schema_ref);
            if !ref_path.exists() {
                return Err(file_invalid(
                    &ref_path,
                    "schema reference file not found".to_string(),
                ));
            }
            let content = std::fs::read_to_string(&ref_path)
                .map_err(|e| file_invalid(&ref_path, format!("{e}")))?;
            let data: Value = serde_yaml::from_str(&content)
                .map_err(|e| file_invalid(&ref_path, format!("YAML parse error: {e}")))?;
            let input = compile_lenient(data.get("input_schema"));
            let output = compile_lenient(data.get("output_schema"));
            return Ok((input, output));
        }

        auto()
    }
}

/// Compiles a schema, degrading to permissive when the schema is absent
/// or uses unsupported features.
fn compile_lenient(schema: Option<&Value>) -> ModuleSchema {
    match schema {
        Some(schema) => {
            ModuleSchema::compile(schema.clone()).unwrap_or_else(|_| ModuleSchema::permissive())
        }
        None => ModuleSchema::permissive(),
    }
}

fn file_invalid(path: &Path, reason: String) -> ModuleError {
    ErrorKind::BindingFileInvalid {
        path: path.display().to_string(),
        reason,
    }
    .into()
}
