//! Metadata and ID-map loading for discovery.
//!
//! Each module manifest may have a sibling `<stem>_meta.yaml` with
//! description, tags, version, annotations, examples, dependencies, and
//! free-form `metadata`. YAML values win over code-level module
//! attributes; the `metadata` sub-map merges shallowly.

use apcore_module::{DependencyInfo, Module};
use apcore_types::{JsonMap, ModuleError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Loads a `<stem>_meta.yaml` companion file.
///
/// A missing file yields an empty map (metadata is optional).
///
/// # Errors
///
/// `CONFIG_INVALID` for unparsable YAML or a non-mapping root.
pub fn load_metadata(meta_path: &Path) -> Result<JsonMap, ModuleError> {
    if !meta_path.exists() {
        return Ok(JsonMap::new());
    }

    let content = std::fs::read_to_string(meta_path).map_err(|e| {
        ModuleError::config_invalid(format!("cannot read metadata file {}: {e}", meta_path.display()))
    })?;
    if content.trim().is_empty() {
        return Ok(JsonMap::new());
    }

    let parsed: Value = serde_yaml::from_str(&content).map_err(|e| {
        ModuleError::config_invalid(format!(
            "invalid YAML in metadata file {}: {e}",
            meta_path.display()
        ))
    })?;

    match parsed {
        Value::Null => Ok(JsonMap::new()),
        Value::Object(map) => Ok(map),
        _ => Err(ModuleError::config_invalid(format!(
            "metadata file must be a YAML mapping: {}",
            meta_path.display()
        ))),
    }
}

/// Converts the raw `dependencies` metadata entry into typed records.
///
/// Entries without a `module_id` are skipped with a warning.
#[must_use]
pub fn parse_dependencies(deps_raw: &Value) -> Vec<DependencyInfo> {
    let Some(entries) = deps_raw.as_array() else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<DependencyInfo>(entry.clone()) {
            Ok(dep) if !dep.module_id.is_empty() => result.push(dep),
            _ => {
                warn!(entry = %entry, "dependency entry missing 'module_id', skipping");
            }
        }
    }
    result
}

/// Merges YAML metadata over a module's code-level attributes.
///
/// Priority: YAML > code > built-in defaults. The `metadata` sub-map is
/// merged shallowly with YAML keys overriding code keys.
#[must_use]
pub fn merge_module_metadata(module: &dyn Module, meta: &JsonMap) -> JsonMap {
    let mut merged = JsonMap::new();

    let description = meta
        .get("description")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map_or_else(|| module.description().to_string(), str::to_string);
    merged.insert("description".into(), Value::String(description));

    if let Some(name) = meta.get("name").cloned() {
        merged.insert("name".into(), name);
    }

    let tags = match meta.get("tags") {
        Some(tags @ Value::Array(_)) => tags.clone(),
        _ => Value::Array(
            module
                .tags()
                .iter()
                .map(|t| Value::String(t.clone()))
                .collect(),
        ),
    };
    merged.insert("tags".into(), tags);

    let version = meta
        .get("version")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map_or_else(|| module.version().to_string(), str::to_string);
    merged.insert("version".into(), Value::String(version));

    let annotations = match meta.get("annotations") {
        Some(yaml_annotations @ Value::Object(_)) => yaml_annotations.clone(),
        _ => serde_json::to_value(module.annotations()).unwrap_or(Value::Null),
    };
    merged.insert("annotations".into(), annotations);

    let examples = match meta.get("examples") {
        Some(examples @ Value::Array(_)) => examples.clone(),
        _ => serde_json::to_value(module.examples()).unwrap_or_else(|_| Value::Array(Vec::new())),
    };
    merged.insert("examples".into(), examples);

    let mut metadata_map = module.metadata();
    if let Some(Value::Object(yaml_metadata)) = meta.get("metadata") {
        for (key, value) in yaml_metadata {
            metadata_map.insert(key.clone(), value.clone());
        }
    }
    merged.insert("metadata".into(), Value::Object(metadata_map));

    let documentation = meta
        .get("documentation")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| module.documentation().map(str::to_string));
    if let Some(documentation) = documentation {
        merged.insert("documentation".into(), Value::String(documentation));
    }

    merged
}

/// One ID-map entry: the canonical id override and an optional class
/// hint for entry-point resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapEntry {
    /// The overriding canonical id.
    pub id: String,
    /// Entry-point class hint.
    pub class_hint: Option<String>,
}

/// Loads an ID-map file (`{mappings: [{file, id, class?}]}`), keyed by
/// the `file` path relative to the map's directory.
///
/// # Errors
///
/// `CONFIG_NOT_FOUND` when the file is missing (the map was explicitly
/// requested); `CONFIG_INVALID` for structural problems.
pub fn load_id_map(id_map_path: &Path) -> Result<HashMap<String, IdMapEntry>, ModuleError> {
    if !id_map_path.exists() {
        return Err(apcore_types::ErrorKind::ConfigNotFound {
            path: id_map_path.display().to_string(),
        }
        .into());
    }

    let content = std::fs::read_to_string(id_map_path).map_err(|e| {
        ModuleError::config_invalid(format!("cannot read ID map {}: {e}", id_map_path.display()))
    })?;
    let parsed: Value = serde_yaml::from_str(&content).map_err(|e| {
        ModuleError::config_invalid(format!(
            "invalid YAML in ID map {}: {e}",
            id_map_path.display()
        ))
    })?;

    let mappings = parsed
        .as_object()
        .and_then(|map| map.get("mappings"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ModuleError::config_invalid("ID map must contain a 'mappings' list".to_string())
        })?;

    let mut result = HashMap::new();
    for entry in mappings {
        let Some(file) = entry.get("file").and_then(Value::as_str) else {
            warn!(entry = %entry, "ID map entry missing 'file' field, skipping");
            continue;
        };
        result.insert(
            file.to_string(),
            IdMapEntry {
                id: entry
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(file)
                    .to_string(),
                class_hint: entry
                    .get("class")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        );
    }
    Ok(result)
}
