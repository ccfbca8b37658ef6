//! Module interface validation.
//!
//! Discovery validates every resolved module before registration and
//! collects *all* problems instead of stopping at the first, so a log
//! line shows the full picture.

use crate::Module;
use serde_json::Value;

/// Checks that a module satisfies the registrable interface contract.
///
/// Returns a list of human-readable problems; an empty list means the
/// module is valid. Checked:
///
/// - `description` is a non-empty string,
/// - `input_schema` / `output_schema` are object schemas,
/// - `version` is non-empty.
#[must_use]
pub fn validate_module(module: &dyn Module) -> Vec<String> {
    let mut errors = Vec::new();

    if module.description().trim().is_empty() {
        errors.push("missing or empty description".to_string());
    }

    if !is_object_schema(module.input_schema().json()) {
        errors.push("invalid input_schema: must be an object schema".to_string());
    }
    if !is_object_schema(module.output_schema().json()) {
        errors.push("invalid output_schema: must be an object schema".to_string());
    }

    if module.version().trim().is_empty() {
        errors.push("missing or empty version".to_string());
    }

    errors
}

fn is_object_schema(schema: &Value) -> bool {
    match schema {
        Value::Object(map) => {
            // Either explicitly typed as object, or untyped (permissive).
            match map.get("type") {
                None => true,
                Some(Value::String(name)) => name == "object",
                Some(Value::Array(names)) => names.iter().any(|n| n == "object"),
                Some(_) => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FunctionModule;
    use apcore_schema::ModuleSchema;
    use serde_json::json;

    #[test]
    fn valid_module_has_no_errors() {
        let module = FunctionModule::builder("ok.module")
            .description("does things")
            .handler(|_, _| Ok(serde_json::Value::Null))
            .build()
            .expect("builds");
        assert!(validate_module(&module).is_empty());
    }

    #[test]
    fn empty_description_collected() {
        let module = FunctionModule::builder("bad.module")
            .description("   ")
            .handler(|_, _| Ok(serde_json::Value::Null))
            .build()
            .expect("builds");
        let errors = validate_module(&module);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("description"));
    }

    #[test]
    fn non_object_schema_collected() {
        let module = FunctionModule::builder("bad.schema")
            .description("x")
            .input_schema(ModuleSchema::compile(json!({"type": "string"})).expect("compiles"))
            .handler(|_, _| Ok(serde_json::Value::Null))
            .build()
            .expect("builds");
        let errors = validate_module(&module);
        assert!(errors.iter().any(|e| e.contains("input_schema")));
    }

    #[test]
    fn all_errors_collected_together() {
        let module = FunctionModule::builder("very.bad")
            .description("")
            .version("")
            .input_schema(ModuleSchema::compile(json!({"type": "string"})).expect("compiles"))
            .handler(|_, _| Ok(serde_json::Value::Null))
            .build()
            .expect("builds");
        let errors = validate_module(&module);
        assert!(errors.len() >= 3, "collected: {errors:?}");
    }
}
