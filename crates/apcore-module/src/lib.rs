//! Module abstraction for apcore.
//!
//! A **module** is the unit the executor dispatches to: anything
//! implementing the [`Module`] capability set
//! `{input_schema, output_schema, description, execute}`.
//!
//! This crate provides:
//!
//! - [`Module`]: the trait itself, uniformly async;
//! - [`FunctionModule`]: adapts a closure into a module
//!   (the primitive behind the YAML binding loader);
//! - [`ModuleDescriptor`] / [`DiscoveredModule`] / [`DependencyInfo`]:
//!   the registry-facing descriptor types;
//! - [`validate_module`]: collect-all-errors interface validation.

mod descriptor;
mod function;
mod module;
mod validation;

pub use descriptor::{DependencyInfo, DiscoveredModule, ModuleDescriptor};
pub use function::{auto_module_id, normalize_result, FunctionModule, FunctionModuleBuilder};
pub use module::{ChunkSink, Module};
pub use validation::validate_module;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_module_is_a_valid_module() {
        let module = FunctionModule::builder("lib.check")
            .description("sanity")
            .handler(|_, _| Ok(serde_json::Value::Null))
            .build()
            .expect("builds");
        assert!(validate_module(&module).is_empty());
    }
}
