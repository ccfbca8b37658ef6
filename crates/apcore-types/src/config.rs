//! Hierarchical configuration with dot-path access.
//!
//! A [`Config`] wraps a JSON-compatible tree (usually loaded from YAML) and
//! resolves keys like `executor.default_timeout` by walking nested
//! mappings. Missing keys fall back to caller-supplied defaults; there are
//! no required keys at this layer.

use crate::{ErrorKind, ModuleError};
use serde_json::Value;
use std::path::Path;

/// Configuration accessor with dot-path key support.
///
/// # Example
///
/// ```
/// use apcore_types::Config;
///
/// let config = Config::from_yaml_str(
///     "executor:\n  default_timeout: 5000\n  max_call_depth: 8\n",
/// )
/// .expect("valid yaml");
///
/// assert_eq!(config.get_i64("executor.default_timeout", 30_000), 5000);
/// assert_eq!(config.get_i64("executor.global_timeout", 60_000), 60_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Creates an empty configuration (every lookup yields the default).
    #[must_use]
    pub fn new() -> Self {
        Self { root: Value::Null }
    }

    /// Wraps an already-parsed tree.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` unless the value is a mapping or null.
    pub fn from_value(root: Value) -> Result<Self, ModuleError> {
        match root {
            Value::Object(_) | Value::Null => Ok(Self { root }),
            other => Err(ModuleError::config_invalid(format!(
                "configuration root must be a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` on parse errors or a non-mapping root.
    pub fn from_yaml_str(text: &str) -> Result<Self, ModuleError> {
        let root: Value = serde_yaml::from_str(text)
            .map_err(|e| ModuleError::config_invalid(format!("invalid YAML: {e}")))?;
        Self::from_value(root)
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_NOT_FOUND` when the file does not exist and
    /// `CONFIG_INVALID` on parse errors.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ErrorKind::ConfigNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::config_invalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Resolves a dot-path key. Returns `None` when any segment is missing
    /// or a non-mapping is traversed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut current = &self.root;
        for part in key.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Integer lookup with default.
    #[must_use]
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Float lookup with default.
    #[must_use]
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Boolean lookup with default.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String lookup with default.
    #[must_use]
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}
