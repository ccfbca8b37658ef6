//! Schema bundle loading.
//!
//! The loader is the primary entry point of the schema system: it reads
//! `<id>.schema.yaml` bundles from the schemas root, resolves their
//! `$ref`s, compiles validators, and caches both layers.
//!
//! # Strategies
//!
//! - `yaml_first`: try the YAML bundle, fall back to a code-provided
//!   native schema pair; fail if neither exists.
//! - `native_first`: prefer the native pair, fall back to YAML.
//! - `yaml_only`: the YAML bundle must exist.

use crate::resolver::{RefResolver, DEFAULT_MAX_REF_DEPTH};
use crate::types::{ModuleSchema, SchemaDefinition, SchemaStrategy};
use apcore_types::{Config, ErrorKind, JsonMap, ModuleError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Loads, resolves and caches schema bundles.
///
/// Two caches are kept: parsed bundles by module id, and compiled
/// input/output pairs by module id. [`SchemaLoader::clear_cache`] purges
/// both (and the resolver's file cache).
#[derive(Debug)]
pub struct SchemaLoader {
    schemas_dir: PathBuf,
    strategy: SchemaStrategy,
    resolver: RefResolver,
    bundle_cache: Mutex<HashMap<String, SchemaDefinition>>,
    pair_cache: Mutex<HashMap<String, (ModuleSchema, ModuleSchema)>>,
}

impl SchemaLoader {
    /// Creates a loader from configuration.
    ///
    /// Reads `schema.root` (default `./schemas`), `schema.strategy`
    /// (default `yaml_first`) and `schema.max_ref_depth` (default 32).
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let schemas_dir = PathBuf::from(config.get_str("schema.root", "./schemas"));
        let strategy = SchemaStrategy::parse(&config.get_str("schema.strategy", "yaml_first"));
        let max_depth = config.get_i64("schema.max_ref_depth", DEFAULT_MAX_REF_DEPTH as i64);
        Self::with_dir(schemas_dir, strategy, max_depth.max(1) as usize)
    }

    /// Creates a loader with an explicit schemas root.
    #[must_use]
    pub fn with_dir(
        schemas_dir: impl Into<PathBuf>,
        strategy: SchemaStrategy,
        max_ref_depth: usize,
    ) -> Self {
        let schemas_dir = schemas_dir.into();
        Self {
            resolver: RefResolver::new(schemas_dir.clone(), max_ref_depth),
            schemas_dir,
            strategy,
            bundle_cache: Mutex::new(HashMap::new()),
            pair_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The configured schemas root.
    #[must_use]
    pub fn schemas_dir(&self) -> &PathBuf {
        &self.schemas_dir
    }

    /// Loads the bundle for `module_id` from
    /// `<root>/<id with dots as separators>.schema.yaml`.
    ///
    /// # Errors
    ///
    /// `SCHEMA_NOT_FOUND` when the file is missing, `SCHEMA_PARSE_ERROR`
    /// for invalid YAML or missing required fields.
    pub fn load(&self, module_id: &str) -> Result<SchemaDefinition, ModuleError> {
        if let Some(cached) = self.bundle_cache.lock().get(module_id) {
            return Ok(cached.clone());
        }

        let file_path = self
            .schemas_dir
            .join(format!("{}.schema.yaml", module_id.replace('.', "/")));
        if !file_path.exists() {
            return Err(ErrorKind::SchemaNotFound {
                schema_id: module_id.to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(&file_path).map_err(|e| {
            ModuleError::schema_parse(format!("cannot read schema for '{module_id}': {e}"))
        })?;
        let data: Value = serde_yaml::from_str(&content).map_err(|e| {
            ModuleError::schema_parse(format!("invalid YAML in schema for '{module_id}': {e}"))
        })?;
        let map = data.as_object().ok_or_else(|| {
            ModuleError::schema_parse(format!(
                "schema file for '{module_id}' is empty or not a mapping"
            ))
        })?;

        for field in ["input_schema", "output_schema", "description"] {
            if !map.contains_key(field) {
                return Err(ModuleError::schema_parse(format!(
                    "missing required field: {field} in schema for '{module_id}'"
                )));
            }
        }

        let mut definitions: JsonMap = map
            .get("definitions")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(defs) = map.get("$defs").and_then(Value::as_object) {
            for (key, value) in defs {
                definitions.insert(key.clone(), value.clone());
            }
        }

        let description = map
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if description.chars().count() > 200 {
            warn!(module_id, "schema description exceeds 200 characters");
        }

        let definition = SchemaDefinition {
            module_id: map
                .get("module_id")
                .and_then(Value::as_str)
                .unwrap_or(module_id)
                .to_string(),
            description,
            input_schema: map.get("input_schema").cloned().unwrap_or(Value::Null),
            output_schema: map.get("output_schema").cloned().unwrap_or(Value::Null),
            error_schema: map.get("error_schema").cloned(),
            definitions,
            version: map
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or("1.0.0")
                .to_string(),
            documentation: map
                .get("documentation")
                .and_then(Value::as_str)
                .map(str::to_string),
            schema_url: map
                .get("$schema")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        self.bundle_cache
            .lock()
            .insert(module_id.to_string(), definition.clone());
        Ok(definition)
    }

    /// Resolves a bundle's `$ref`s and compiles the validator pair.
    ///
    /// Local references (`#/definitions/...`, `#/$defs/...`) resolve
    /// against the bundle itself.
    ///
    /// # Errors
    ///
    /// Resolver errors plus `SCHEMA_PARSE_ERROR` from validator
    /// compilation.
    pub fn resolve(
        &self,
        definition: &SchemaDefinition,
    ) -> Result<(ModuleSchema, ModuleSchema), ModuleError> {
        let inline_root = json!({
            "definitions": definition.definitions,
            "$defs": definition.definitions,
            "input_schema": definition.input_schema,
            "output_schema": definition.output_schema,
        });

        let resolved_input = self
            .resolver
            .resolve(&definition.input_schema, &inline_root, None)?;
        let resolved_output = self
            .resolver
            .resolve(&definition.output_schema, &inline_root, None)?;

        let input = ModuleSchema::compile(resolved_input)?;
        let output = ModuleSchema::compile(resolved_output)?;
        Ok((input, output))
    }

    /// Returns the compiled schema pair for `module_id` following the
    /// configured strategy.
    ///
    /// `native` is the code-provided fallback pair (the module's own
    /// schemas).
    ///
    /// # Errors
    ///
    /// `SCHEMA_NOT_FOUND` when the strategy cannot produce a pair.
    pub fn get_schema(
        &self,
        module_id: &str,
        native: Option<(ModuleSchema, ModuleSchema)>,
    ) -> Result<(ModuleSchema, ModuleSchema), ModuleError> {
        if let Some(cached) = self.pair_cache.lock().get(module_id) {
            return Ok(cached.clone());
        }

        let result = match self.strategy {
            SchemaStrategy::YamlFirst => match self.load_and_resolve(module_id) {
                Ok(pair) => pair,
                Err(err) if is_not_found(&err) => {
                    native.ok_or(err)?
                }
                Err(err) => return Err(err),
            },
            SchemaStrategy::NativeFirst => match native {
                Some(pair) => pair,
                None => self.load_and_resolve(module_id)?,
            },
            SchemaStrategy::YamlOnly => self.load_and_resolve(module_id)?,
        };

        self.pair_cache
            .lock()
            .insert(module_id.to_string(), result.clone());
        Ok(result)
    }

    fn load_and_resolve(
        &self,
        module_id: &str,
    ) -> Result<(ModuleSchema, ModuleSchema), ModuleError> {
        let definition = self.load(module_id)?;
        self.resolve(&definition)
    }

    /// Purges the bundle, pair, and resolver file caches.
    pub fn clear_cache(&self) {
        self.bundle_cache.lock().clear();
        self.pair_cache.lock().clear();
        self.resolver.clear_cache();
    }
}

fn is_not_found(err: &ModuleError) -> bool {
    matches!(err.kind(), ErrorKind::SchemaNotFound { .. })
}
