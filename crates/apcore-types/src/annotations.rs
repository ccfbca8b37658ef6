//! Behavioral annotations and examples for modules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Behavioral hints a module declares about itself.
///
/// Consumed by export profiles (MCP hint fields) and by embedding
/// applications that gate destructive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleAnnotations {
    /// The module only reads data (no side effects).
    pub readonly: bool,
    /// The module may irreversibly modify data.
    pub destructive: bool,
    /// Repeated calls produce the same result.
    pub idempotent: bool,
    /// Human approval is needed before execution.
    pub requires_approval: bool,
    /// The module interacts with external systems.
    pub open_world: bool,
    /// The module can stream partial outputs.
    pub streaming: bool,
}

impl Default for ModuleAnnotations {
    fn default() -> Self {
        Self {
            readonly: false,
            destructive: false,
            idempotent: false,
            requires_approval: false,
            open_world: true,
            streaming: false,
        }
    }
}

/// An example invocation of a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleExample {
    /// Short title for the example.
    pub title: String,
    /// Example input payload.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Expected output payload.
    #[serde(default)]
    pub output: Map<String, Value>,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
