//! Platform-specific schema export.
//!
//! One bundle, four consumers:
//!
//! | Profile | Shape |
//! |---------|-------|
//! | Generic | full pass-through of the bundle |
//! | MCP | `{name, description, inputSchema, annotations}`, `x-*` preserved |
//! | OpenAI | strict-mode parameters wrapped as a function tool |
//! | Anthropic | extensions stripped, `_`-form name, optional input examples |

use crate::strict::{apply_llm_descriptions, strip_extensions, to_strict};
use crate::types::{ExportProfile, SchemaDefinition};
use apcore_types::{ModuleAnnotations, ModuleExample};
use serde_json::{json, Value};

/// Stateless transformer that renders a bundle for a target platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaExporter;

impl SchemaExporter {
    /// Creates an exporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Exports in the requested profile.
    #[must_use]
    pub fn export(
        &self,
        definition: &SchemaDefinition,
        profile: ExportProfile,
        annotations: Option<&ModuleAnnotations>,
        examples: &[ModuleExample],
        name: Option<&str>,
    ) -> Value {
        match profile {
            ExportProfile::Mcp => self.export_mcp(definition, annotations, name),
            ExportProfile::Openai => self.export_openai(definition),
            ExportProfile::Anthropic => self.export_anthropic(definition, examples),
            ExportProfile::Generic => self.export_generic(definition),
        }
    }

    /// Full pass-through: module id, description, both schemas,
    /// definitions.
    #[must_use]
    pub fn export_generic(&self, definition: &SchemaDefinition) -> Value {
        json!({
            "module_id": definition.module_id,
            "description": definition.description,
            "input_schema": definition.input_schema,
            "output_schema": definition.output_schema,
            "definitions": definition.definitions,
        })
    }

    /// MCP tool descriptor. Preserves `x-*` extensions and dot-notation
    /// names; hint annotations default to the conservative read/write
    /// open-world combination.
    #[must_use]
    pub fn export_mcp(
        &self,
        definition: &SchemaDefinition,
        annotations: Option<&ModuleAnnotations>,
        name: Option<&str>,
    ) -> Value {
        let default = ModuleAnnotations::default();
        let annotations = annotations.unwrap_or(&default);
        json!({
            "name": name.unwrap_or(&definition.module_id),
            "description": definition.description,
            "inputSchema": definition.input_schema,
            "annotations": {
                "readOnlyHint": annotations.readonly,
                "destructiveHint": annotations.destructive,
                "idempotentHint": annotations.idempotent,
                "openWorldHint": annotations.open_world,
            },
        })
    }

    /// OpenAI function-calling format: strict-mode parameters, `_`-form
    /// name, `strict: true`.
    #[must_use]
    pub fn export_openai(&self, definition: &SchemaDefinition) -> Value {
        let mut schema = definition.input_schema.clone();
        apply_llm_descriptions(&mut schema);
        let parameters = to_strict(&schema);
        json!({
            "type": "function",
            "function": {
                "name": definition.module_id.replace('.', "_"),
                "description": definition.description,
                "parameters": parameters,
                "strict": true,
            },
        })
    }

    /// Anthropic tool-use format: extensions and defaults stripped, no
    /// strict mode, input examples included when provided.
    #[must_use]
    pub fn export_anthropic(
        &self,
        definition: &SchemaDefinition,
        examples: &[ModuleExample],
    ) -> Value {
        let mut schema = definition.input_schema.clone();
        apply_llm_descriptions(&mut schema);
        strip_extensions(&mut schema);
        let mut result = json!({
            "name": definition.module_id.replace('.', "_"),
            "description": definition.description,
            "input_schema": schema,
        });
        if !examples.is_empty() {
            let inputs: Vec<Value> = examples
                .iter()
                .map(|e| Value::Object(e.inputs.clone()))
                .collect();
            result["input_examples"] = json!(inputs);
        }
        result
    }
}
