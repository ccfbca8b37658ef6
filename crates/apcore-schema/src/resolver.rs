//! `$ref` resolution for JSON Schema documents.
//!
//! Three reference forms are supported:
//!
//! - **Local**: `#/definitions/Foo` or `#/$defs/Foo`: an RFC 6901 JSON
//!   Pointer into the current document (`~1` unescapes to `/`, `~0` to
//!   `~`).
//! - **Cross-file**: `other.yaml#/path`: resolved relative to the
//!   current file's directory, falling back to the configured schemas
//!   root.
//! - **Canonical**: `apcore://module.id/path`: the schema file of
//!   another module under the schemas root.
//!
//! Resolution deep-copies referenced targets into place; sibling keys
//! alongside `$ref` are merged over the resolved target. Circular
//! references are caught by a visited-set keyed on the full reference
//! string, with `max_depth` as an additional hard floor; both fail with
//! `SCHEMA_CIRCULAR_REF`.

use apcore_types::{ErrorKind, ModuleError};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Default maximum reference nesting depth.
pub const DEFAULT_MAX_REF_DEPTH: usize = 32;

/// Resolves `$ref` references in JSON Schema documents.
///
/// Parsed files are cached so repeated resolutions against the same
/// schema tree stay cheap. The resolver is thread-safe.
#[derive(Debug)]
pub struct RefResolver {
    schemas_dir: PathBuf,
    max_depth: usize,
    file_cache: Mutex<HashMap<PathBuf, Value>>,
}

impl RefResolver {
    /// Creates a resolver rooted at `schemas_dir`.
    #[must_use]
    pub fn new(schemas_dir: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            schemas_dir: schemas_dir.into(),
            max_depth,
            file_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves all references in `schema`, returning a new document.
    ///
    /// Local (`#/...`) references resolve against `inline_root` when no
    /// `current_file` is given: pass the surrounding bundle so
    /// `#/definitions/...` works for inline schemas.
    ///
    /// # Errors
    ///
    /// `SCHEMA_NOT_FOUND` for missing files or dangling pointers,
    /// `SCHEMA_PARSE_ERROR` for unreadable files, `SCHEMA_CIRCULAR_REF`
    /// for cycles or exhausted depth.
    pub fn resolve(
        &self,
        schema: &Value,
        inline_root: &Value,
        current_file: Option<&Path>,
    ) -> Result<Value, ModuleError> {
        self.resolve_node(schema, inline_root, current_file, &HashSet::new(), 0)
    }

    /// Drops all cached parsed files.
    pub fn clear_cache(&self) {
        self.file_cache.lock().clear();
    }

    fn resolve_node(
        &self,
        node: &Value,
        inline_root: &Value,
        current_file: Option<&Path>,
        visited: &HashSet<String>,
        depth: usize,
    ) -> Result<Value, ModuleError> {
        match node {
            Value::Object(map) => {
                if let Some(ref_value) = map.get("$ref") {
                    let ref_string = ref_value.as_str().ok_or_else(|| {
                        ModuleError::schema_parse("'$ref' must be a string")
                    })?;
                    let siblings: Map<String, Value> = map
                        .iter()
                        .filter(|(k, _)| k.as_str() != "$ref")
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    self.resolve_ref(
                        ref_string,
                        inline_root,
                        current_file,
                        visited,
                        depth,
                        &siblings,
                    )
                } else {
                    let mut out = Map::with_capacity(map.len());
                    for (key, value) in map {
                        out.insert(
                            key.clone(),
                            self.resolve_node(value, inline_root, current_file, visited, depth)?,
                        );
                    }
                    Ok(Value::Object(out))
                }
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_node(item, inline_root, current_file, visited, depth)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_ref(
        &self,
        ref_string: &str,
        inline_root: &Value,
        current_file: Option<&Path>,
        visited: &HashSet<String>,
        depth: usize,
        siblings: &Map<String, Value>,
    ) -> Result<Value, ModuleError> {
        if visited.contains(ref_string) {
            return Err(ErrorKind::SchemaCircularRef {
                ref_path: ref_string.to_string(),
            }
            .into());
        }
        if depth >= self.max_depth {
            return Err(ErrorKind::SchemaCircularRef {
                ref_path: format!(
                    "maximum reference depth {} exceeded resolving: {ref_string}",
                    self.max_depth
                ),
            }
            .into());
        }

        let mut visited = visited.clone();
        visited.insert(ref_string.to_string());

        let (target_file, pointer) = self.parse_ref(ref_string, current_file)?;

        let target = match &target_file {
            Some(path) => {
                let document = self.load_file(path)?;
                resolve_json_pointer(&document, &pointer, ref_string)?
            }
            None => resolve_json_pointer(inline_root, &pointer, ref_string)?,
        };

        let mut result = target;
        if !siblings.is_empty() {
            if let Value::Object(map) = &mut result {
                for (key, value) in siblings {
                    map.insert(key.clone(), value.clone());
                }
            }
        }

        // The resolved target may itself contain $ref nodes; resolve them
        // relative to the file the target came from.
        let next_file = target_file.as_deref().or(current_file);
        let next_root = match &target_file {
            Some(path) => self.load_file(path)?,
            None => inline_root.clone(),
        };
        self.resolve_node(&result, &next_root, next_file, &visited, depth + 1)
    }

    /// Splits a reference into (file, pointer). `None` file means the
    /// inline document.
    fn parse_ref(
        &self,
        ref_string: &str,
        current_file: Option<&Path>,
    ) -> Result<(Option<PathBuf>, String), ModuleError> {
        if let Some(pointer) = ref_string.strip_prefix('#') {
            return Ok((current_file.map(Path::to_path_buf), pointer.to_string()));
        }

        if let Some(remainder) = ref_string.strip_prefix("apcore://") {
            let mut parts = remainder.splitn(2, '/');
            let canonical_id = parts.next().unwrap_or_default();
            if canonical_id.is_empty() {
                return Err(ModuleError::schema_parse(format!(
                    "canonical reference '{ref_string}' has no module id"
                )));
            }
            let pointer = match parts.next() {
                Some(rest) if !rest.is_empty() => format!("/{rest}"),
                _ => String::new(),
            };
            let file_rel = format!("{}.schema.yaml", canonical_id.replace('.', "/"));
            return Ok((Some(self.schemas_dir.join(file_rel)), pointer));
        }

        let (file_part, pointer) = match ref_string.split_once('#') {
            Some((file, ptr)) => (file, ptr.to_string()),
            None => (ref_string, String::new()),
        };

        let primary = current_file
            .and_then(Path::parent)
            .unwrap_or(&self.schemas_dir)
            .join(file_part);
        let path = if primary.exists() {
            primary
        } else {
            let fallback = self.schemas_dir.join(file_part);
            if fallback.exists() {
                fallback
            } else {
                primary
            }
        };
        Ok((Some(path), pointer))
    }

    fn load_file(&self, path: &Path) -> Result<Value, ModuleError> {
        if let Some(cached) = self.file_cache.lock().get(path) {
            return Ok(cached.clone());
        }

        if !path.exists() {
            return Err(ErrorKind::SchemaNotFound {
                schema_id: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::schema_parse(format!("cannot read {}: {e}", path.display()))
        })?;

        let parsed: Value = if content.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                ModuleError::schema_parse(format!("invalid YAML in {}: {e}", path.display()))
            })?
        };

        let parsed = match parsed {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => parsed,
            other => {
                return Err(ModuleError::schema_parse(format!(
                    "schema file {} must be a YAML mapping, got {other}",
                    path.display()
                )))
            }
        };

        self.file_cache
            .lock()
            .insert(path.to_path_buf(), parsed.clone());
        Ok(parsed)
    }
}

/// Navigates a document with an RFC 6901 JSON Pointer.
fn resolve_json_pointer(
    document: &Value,
    pointer: &str,
    ref_string: &str,
) -> Result<Value, ModuleError> {
    if pointer.is_empty() {
        return Ok(document.clone());
    }

    let mut current = document;
    for raw_segment in pointer.split('/').skip(1) {
        let segment = raw_segment.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(|| {
            ModuleError::from(ErrorKind::SchemaNotFound {
                schema_id: format!("{ref_string} (segment '{segment}' not found)"),
            })
        })?;
    }
    Ok(current.clone())
}
