//! Entry-point resolution for discovered manifests.
//!
//! Discovery step 4: find exactly one module implementation for each
//! scanned manifest. Selection sources, in priority order:
//!
//! 1. explicit `entry_point: "stem:Symbol"` in the companion metadata;
//! 2. `class` hint from the ID map;
//! 3. auto-inference: exactly one catalog factory registered for the
//!    manifest's file stem.
//!
//! A non-empty manifest may also carry a schema bundle (`description`,
//! `input_schema`, `output_schema`); declared values override the
//! factory module's code-level ones, mirroring the YAML-over-code
//! metadata rule.

use crate::registry::catalog::ModuleCatalog;
use crate::registry::scanner::SOURCE_EXTENSION;
use apcore_module::{DiscoveredModule, Module};
use apcore_schema::{ModuleSchema, RefResolver, DEFAULT_MAX_REF_DEPTH};
use apcore_types::{Context, ErrorKind, JsonMap, ModuleError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Resolves the module instance for a discovered manifest.
///
/// # Errors
///
/// `MODULE_LOAD_ERROR` when no factory matches, the match is ambiguous,
/// the factory fails, or the manifest bundle is malformed.
pub fn resolve_entry_point(
    discovered: &DiscoveredModule,
    meta: &JsonMap,
    class_hint: Option<&str>,
    catalog: &ModuleCatalog,
) -> Result<Arc<dyn Module>, ModuleError> {
    let stem = manifest_stem(discovered);

    let factory_key = if let Some(entry_point) = meta.get("entry_point").and_then(Value::as_str) {
        // "file:Symbol": the symbol is authoritative, the file part is
        // informational (the stem identifies the unit).
        let symbol = entry_point.rsplit(':').next().unwrap_or(entry_point);
        Some(format!("{stem}:{symbol}"))
    } else {
        class_hint.map(|hint| format!("{stem}:{hint}"))
    };

    let module = match factory_key {
        Some(key) => {
            let factory = catalog.get(&key).ok_or_else(|| load_error(
                discovered,
                format!("entry point '{key}' is not registered in the catalog"),
            ))?;
            factory()?
        }
        None => {
            let candidates = catalog.keys_for_stem(&stem);
            match candidates.as_slice() {
                [] => {
                    return Err(load_error(
                        discovered,
                        format!("no module implementation registered for '{stem}'"),
                    ))
                }
                [only] => {
                    let factory = catalog.get(only).ok_or_else(|| {
                        load_error(discovered, format!("factory '{only}' disappeared"))
                    })?;
                    factory()?
                }
                many => {
                    return Err(load_error(
                        discovered,
                        format!(
                            "ambiguous entry point: multiple implementations for '{stem}' ({})",
                            many.join(", ")
                        ),
                    ))
                }
            }
        }
    };

    apply_manifest(discovered, module)
}

/// File stem of the manifest (name minus the source extension).
#[must_use]
pub fn manifest_stem(discovered: &DiscoveredModule) -> String {
    let name = discovered
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(SOURCE_EXTENSION)
        .unwrap_or(&name)
        .to_string()
}

/// Overlays the manifest's declared bundle over the factory module.
fn apply_manifest(
    discovered: &DiscoveredModule,
    module: Arc<dyn Module>,
) -> Result<Arc<dyn Module>, ModuleError> {
    let content = std::fs::read_to_string(&discovered.file_path)
        .map_err(|e| load_error(discovered, format!("cannot read manifest: {e}")))?;
    if content.trim().is_empty() {
        return Ok(module);
    }

    let manifest: Value = serde_yaml::from_str(&content)
        .map_err(|e| load_error(discovered, format!("invalid YAML in manifest: {e}")))?;
    let manifest = match manifest {
        Value::Null => return Ok(module),
        Value::Object(map) => map,
        other => {
            return Err(load_error(
                discovered,
                format!("manifest must be a YAML mapping, got {other}"),
            ))
        }
    };

    let description = manifest
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let manifest_dir = discovered
        .file_path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_default();
    let resolver = RefResolver::new(manifest_dir, DEFAULT_MAX_REF_DEPTH);
    let inline_root = Value::Object(manifest.clone());

    let compile = |key: &str| -> Result<Option<ModuleSchema>, ModuleError> {
        match manifest.get(key) {
            None => Ok(None),
            Some(schema) => {
                let resolved = resolver.resolve(schema, &inline_root, None)?;
                Ok(Some(ModuleSchema::compile(resolved)?))
            }
        }
    };
    let input_schema = compile("input_schema")
        .map_err(|e| load_error(discovered, format!("bad input_schema: {e}")))?;
    let output_schema = compile("output_schema")
        .map_err(|e| load_error(discovered, format!("bad output_schema: {e}")))?;

    if description.is_none() && input_schema.is_none() && output_schema.is_none() {
        return Ok(module);
    }

    Ok(Arc::new(ManifestModule {
        inner: module,
        description,
        input_schema,
        output_schema,
    }))
}

fn load_error(discovered: &DiscoveredModule, reason: String) -> ModuleError {
    ErrorKind::ModuleLoad {
        module_id: discovered.canonical_id.clone(),
        reason,
    }
    .into()
}

/// A factory module with manifest-declared overrides applied.
struct ManifestModule {
    inner: Arc<dyn Module>,
    description: Option<String>,
    input_schema: Option<ModuleSchema>,
    output_schema: Option<ModuleSchema>,
}

#[async_trait]
impl Module for ManifestModule {
    fn description(&self) -> &str {
        self.description
            .as_deref()
            .unwrap_or_else(|| self.inner.description())
    }

    fn input_schema(&self) -> &ModuleSchema {
        self.input_schema
            .as_ref()
            .unwrap_or_else(|| self.inner.input_schema())
    }

    fn output_schema(&self) -> &ModuleSchema {
        self.output_schema
            .as_ref()
            .unwrap_or_else(|| self.inner.output_schema())
    }

    fn version(&self) -> &str {
        self.inner.version()
    }

    fn tags(&self) -> &[String] {
        self.inner.tags()
    }

    fn annotations(&self) -> apcore_types::ModuleAnnotations {
        self.inner.annotations()
    }

    fn examples(&self) -> Vec<apcore_types::ModuleExample> {
        self.inner.examples()
    }

    fn metadata(&self) -> JsonMap {
        self.inner.metadata()
    }

    fn documentation(&self) -> Option<&str> {
        self.inner.documentation()
    }

    fn on_load(&self) -> Result<(), ModuleError> {
        self.inner.on_load()
    }

    fn on_unload(&self) {
        self.inner.on_unload();
    }

    async fn execute(&self, inputs: JsonMap, ctx: &Context) -> Result<JsonMap, ModuleError> {
        self.inner.execute(inputs, ctx).await
    }

    fn supports_stream(&self) -> bool {
        self.inner.supports_stream()
    }

    async fn stream(
        &self,
        inputs: JsonMap,
        ctx: &Context,
        sink: apcore_module::ChunkSink,
    ) -> Result<(), ModuleError> {
        self.inner.stream(inputs, ctx, sink).await
    }
}
