//! Core types for apcore.
//!
//! This crate provides the foundational types of the apcore module
//! execution runtime: the per-call [`Context`], the caller [`Identity`],
//! the dot-path [`Config`], the structured error model
//! ([`ModuleError`] / [`ErrorKind`] / [`ErrorCode`]), and the wildcard
//! [`match_pattern`] helper.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SDK Layer                              │
//! │  (stable surface, safe for module authors to depend on)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  apcore-types  : Context, Identity, Config, errors  ◄── HERE │
//! │  apcore-schema : schema bundles, validator, exporters        │
//! │  apcore-module : Module trait, FunctionModule                │
//! │  apcore-acl    : access-control rules + engine               │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runtime Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  apcore-runtime : registry, middleware, executor,            │
//! │                   observability, bindings                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Why a separate types crate?
//!
//! - **Minimal dependencies**: module authors only need these types plus
//!   their schemas.
//! - **No cycles**: every other crate depends on this one; errors and
//!   context flow everywhere.
//! - **Stable codes**: the [`ErrorCode`] contract lives next to the
//!   taxonomy it governs.

mod annotations;
mod config;
mod context;
mod error;
mod identity;
mod pattern;

pub use annotations::{ModuleAnnotations, ModuleExample};
pub use config::Config;
pub use context::{Context, DataMap};
pub use error::{ErrorCode, ErrorKind, ModuleError, ValidationIssue, ValidationResult};
pub use identity::Identity;
pub use pattern::match_pattern;

/// Canonical inputs/outputs payload type for module calls.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The value every redacted field is replaced with.
pub const REDACTED_VALUE: &str = "***REDACTED***";
