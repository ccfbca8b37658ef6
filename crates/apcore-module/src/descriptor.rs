//! Descriptor types shared between registry and consumers.

use apcore_types::{JsonMap, ModuleAnnotations, ModuleExample};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Cross-language module descriptor.
///
/// Composed by the registry from module attributes and merged metadata;
/// this is what tooling and exporters consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Canonical module id (dot notation).
    pub module_id: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human description.
    pub description: String,
    /// Optional long-form documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Resolved input JSON Schema.
    pub input_schema: Value,
    /// Resolved output JSON Schema.
    pub output_schema: Value,
    /// Module version.
    pub version: String,
    /// Classification tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Behavioral annotations, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ModuleAnnotations>,
    /// Example invocations.
    #[serde(default)]
    pub examples: Vec<ModuleExample>,
    /// Merged free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Intermediate representation of a module file found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredModule {
    /// Absolute path of the module manifest.
    pub file_path: PathBuf,
    /// Id derived from the path (namespace-prefixed for multi-root).
    pub canonical_id: String,
    /// Companion `<stem>_meta.yaml`, when present.
    pub meta_path: Option<PathBuf>,
    /// The root namespace this module came from.
    pub namespace: Option<String>,
}

/// One dependency declared in module metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// The required module id.
    pub module_id: String,
    /// Optional version constraint (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional dependencies that are missing are skipped with a warning
    /// instead of failing discovery.
    #[serde(default)]
    pub optional: bool,
}
