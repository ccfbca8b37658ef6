//! Schema engine for apcore.
//!
//! Turns human-authored JSON-Schema (loaded from YAML bundles) into
//! runtime validators and into export formats for multiple consumers.
//!
//! # Pipeline
//!
//! ```text
//! *.schema.yaml ──▶ SchemaLoader ──▶ SchemaDefinition
//!                        │                 │
//!                        ▼                 ▼
//!                   RefResolver ──▶ resolved JSON Schema
//!                                          │
//!                          ┌───────────────┴────────────────┐
//!                          ▼                                ▼
//!                   CompiledSchema                   SchemaExporter
//!                 (runtime validation)        (generic / MCP / OpenAI /
//!                                                   Anthropic)
//! ```
//!
//! The validator enforces the documented JSON-Schema subset; `not` and
//! `if/then/else` are rejected when a schema is compiled, not at
//! validation time. The [`to_strict`] transform produces the
//! closed-world variant LLM function-calling endpoints require.

mod exporter;
mod loader;
mod resolver;
mod strict;
mod types;
mod validator;

pub use exporter::SchemaExporter;
pub use loader::SchemaLoader;
pub use resolver::{RefResolver, DEFAULT_MAX_REF_DEPTH};
pub use strict::to_strict;
pub use types::{ExportProfile, ModuleSchema, SchemaDefinition, SchemaStrategy};
pub use validator::{CompiledSchema, SchemaValidator};
