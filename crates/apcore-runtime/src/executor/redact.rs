//! Schema-driven redaction of sensitive fields.
//!
//! The executor redacts a copy of the validated inputs at step 5 and
//! stores it on `context.redacted_inputs`; logging middlewares read that
//! copy instead of the raw payload.

use apcore_types::{JsonMap, REDACTED_VALUE};
use serde_json::Value;

/// Returns a redacted deep copy of `data`.
///
/// Driven by the schema's `properties`:
///
/// - a property with `x-sensitive: true` has its value replaced by
///   `***REDACTED***` (null values stay null);
/// - nested object properties recurse;
/// - array items with `x-sensitive: true` redact each element; array
///   items with nested properties recurse into each object element.
///
/// Independent of the schema, any key starting with `_secret_` is
/// redacted. The original `data` is never mutated.
#[must_use]
pub fn redact_sensitive(data: &JsonMap, schema: &Value) -> JsonMap {
    let mut redacted = data.clone();
    redact_fields(&mut redacted, schema);
    redact_secret_prefix(&mut redacted);
    redacted
}

fn redact_fields(data: &mut JsonMap, schema: &Value) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };

    for (field_name, field_schema) in properties {
        let Some(value) = data.get_mut(field_name) else {
            continue;
        };

        if is_sensitive(field_schema) {
            if !value.is_null() {
                *value = Value::String(REDACTED_VALUE.to_string());
            }
            continue;
        }

        let field_type = field_schema.get("type").and_then(Value::as_str);

        if field_type == Some("object") && field_schema.get("properties").is_some() {
            if let Value::Object(nested) = value {
                redact_fields(nested, field_schema);
            }
            continue;
        }

        if field_type == Some("array") {
            let Some(items_schema) = field_schema.get("items") else {
                continue;
            };
            let Value::Array(items) = value else { continue };

            if is_sensitive(items_schema) {
                for item in items.iter_mut() {
                    if !item.is_null() {
                        *item = Value::String(REDACTED_VALUE.to_string());
                    }
                }
            } else if items_schema.get("type").and_then(Value::as_str) == Some("object")
                && items_schema.get("properties").is_some()
            {
                for item in items.iter_mut() {
                    if let Value::Object(nested) = item {
                        redact_fields(nested, items_schema);
                    }
                }
            }
        }
    }
}

fn redact_secret_prefix(data: &mut JsonMap) {
    for (key, value) in data.iter_mut() {
        if key.starts_with("_secret_") && !value.is_null() {
            *value = Value::String(REDACTED_VALUE.to_string());
        }
    }
}

fn is_sensitive(schema: &Value) -> bool {
    schema.get("x-sensitive").and_then(Value::as_bool) == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> JsonMap {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn sensitive_scalar_masked() {
        let schema = json!({
            "properties": {
                "password": {"type": "string", "x-sensitive": true},
                "username": {"type": "string"}
            }
        });
        let data = obj(json!({"password": "p@ss", "username": "u"}));
        let redacted = redact_sensitive(&data, &schema);
        assert_eq!(redacted["password"], REDACTED_VALUE);
        assert_eq!(redacted["username"], "u");
        // Original untouched.
        assert_eq!(data["password"], "p@ss");
    }

    #[test]
    fn null_values_stay_null() {
        let schema = json!({
            "properties": {"token": {"x-sensitive": true}}
        });
        let data = obj(json!({"token": null}));
        let redacted = redact_sensitive(&data, &schema);
        assert!(redacted["token"].is_null());
    }

    #[test]
    fn nested_objects_recurse() {
        let schema = json!({
            "properties": {
                "credentials": {
                    "type": "object",
                    "properties": {
                        "key": {"type": "string", "x-sensitive": true},
                        "label": {"type": "string"}
                    }
                }
            }
        });
        let data = obj(json!({"credentials": {"key": "sk-123", "label": "prod"}}));
        let redacted = redact_sensitive(&data, &schema);
        assert_eq!(redacted["credentials"]["key"], REDACTED_VALUE);
        assert_eq!(redacted["credentials"]["label"], "prod");
    }

    #[test]
    fn sensitive_array_items_masked() {
        let schema = json!({
            "properties": {
                "tokens": {"type": "array", "items": {"type": "string", "x-sensitive": true}}
            }
        });
        let data = obj(json!({"tokens": ["a", null, "b"]}));
        let redacted = redact_sensitive(&data, &schema);
        assert_eq!(
            redacted["tokens"],
            json!([REDACTED_VALUE, null, REDACTED_VALUE])
        );
    }

    #[test]
    fn object_array_items_recurse() {
        let schema = json!({
            "properties": {
                "accounts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"secret": {"x-sensitive": true}, "id": {}}
                    }
                }
            }
        });
        let data = obj(json!({"accounts": [{"secret": "x", "id": 1}, {"id": 2}]}));
        let redacted = redact_sensitive(&data, &schema);
        assert_eq!(redacted["accounts"][0]["secret"], REDACTED_VALUE);
        assert_eq!(redacted["accounts"][0]["id"], 1);
        assert_eq!(redacted["accounts"][1]["id"], 2);
    }

    #[test]
    fn secret_prefix_always_redacted() {
        let schema = json!({"properties": {}});
        let data = obj(json!({"_secret_api_key": "k", "normal": "v", "_secret_null": null}));
        let redacted = redact_sensitive(&data, &schema);
        assert_eq!(redacted["_secret_api_key"], REDACTED_VALUE);
        assert_eq!(redacted["normal"], "v");
        assert!(redacted["_secret_null"].is_null());
    }

    #[test]
    fn schema_without_properties_only_secret_prefix() {
        let data = obj(json!({"a": 1, "_secret_b": 2}));
        let redacted = redact_sensitive(&data, &json!({"type": "object"}));
        assert_eq!(redacted["a"], 1);
        assert_eq!(redacted["_secret_b"], REDACTED_VALUE);
    }

    #[test]
    fn idempotent() {
        let schema = json!({
            "properties": {
                "password": {"type": "string", "x-sensitive": true},
                "nested": {
                    "type": "object",
                    "properties": {"pin": {"x-sensitive": true}}
                }
            }
        });
        let data = obj(json!({
            "password": "p",
            "nested": {"pin": "1234"},
            "_secret_k": "v"
        }));
        let once = redact_sensitive(&data, &schema);
        let twice = redact_sensitive(&once, &schema);
        assert_eq!(once, twice);
    }
}
