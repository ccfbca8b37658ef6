//! Schema bundle types and loading/export enums.

use crate::validator::CompiledSchema;
use apcore_types::{JsonMap, ModuleError, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Controls how the loader resolves schemas for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStrategy {
    /// Try the YAML bundle first, fall back to the code-provided schema.
    #[default]
    YamlFirst,
    /// Prefer the code-provided schema, fall back to YAML.
    NativeFirst,
    /// The YAML bundle must exist.
    YamlOnly,
}

impl SchemaStrategy {
    /// Parses the configuration string form (`yaml_first`, ...).
    ///
    /// Unknown strings fall back to [`SchemaStrategy::YamlFirst`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "native_first" => Self::NativeFirst,
            "yaml_only" => Self::YamlOnly,
            _ => Self::YamlFirst,
        }
    }
}

/// Which export format [`crate::SchemaExporter`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProfile {
    /// Full pass-through of the bundle.
    Generic,
    /// MCP tool descriptor (`inputSchema`, hint annotations).
    Mcp,
    /// OpenAI function-calling format with strict mode.
    Openai,
    /// Anthropic tool-use format.
    Anthropic,
}

/// A parsed `*.schema.yaml` bundle before `$ref` resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Owning module id.
    pub module_id: String,
    /// Human description of the module.
    pub description: String,
    /// JSON Schema for inputs (unresolved).
    pub input_schema: Value,
    /// JSON Schema for outputs (unresolved).
    pub output_schema: Value,
    /// Optional JSON Schema for structured errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_schema: Option<Value>,
    /// Shared definitions (`definitions` merged with `$defs`).
    #[serde(default)]
    pub definitions: JsonMap,
    /// Bundle version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Optional long-form documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Optional `$schema` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// A resolved schema paired with its runtime validator.
///
/// This is the type modules expose from `input_schema()` /
/// `output_schema()`: the raw (resolved) JSON Schema for exporters and
/// redaction, plus the [`CompiledSchema`] that actually validates.
#[derive(Debug, Clone)]
pub struct ModuleSchema {
    raw: Value,
    compiled: CompiledSchema,
}

impl ModuleSchema {
    /// Compiles a resolved JSON Schema document into a validator.
    ///
    /// # Errors
    ///
    /// Returns `SCHEMA_PARSE_ERROR` on unsupported keywords (`not`,
    /// `if/then/else`), invalid `allOf` merges, or malformed constraints.
    pub fn compile(raw: Value) -> Result<Self, ModuleError> {
        let compiled = CompiledSchema::compile(&raw)?;
        Ok(Self { raw, compiled })
    }

    /// A schema that accepts any object (used where no schema was
    /// declared).
    #[must_use]
    pub fn permissive() -> Self {
        let raw = serde_json::json!({"type": "object"});
        Self {
            compiled: CompiledSchema::compile(&raw).unwrap_or_else(|_| CompiledSchema::any()),
            raw,
        }
    }

    /// The resolved JSON Schema document.
    #[must_use]
    pub fn json(&self) -> &Value {
        &self.raw
    }

    /// The compiled validator.
    #[must_use]
    pub fn compiled(&self) -> &CompiledSchema {
        &self.compiled
    }

    /// Validates a payload with coercion enabled (the default mode).
    #[must_use]
    pub fn validate(&self, data: &JsonMap) -> ValidationResult {
        self.compiled.validate_map(data, true)
    }

    /// Validates a payload in exact-type mode.
    #[must_use]
    pub fn validate_strict_types(&self, data: &JsonMap) -> ValidationResult {
        self.compiled.validate_map(data, false)
    }
}
