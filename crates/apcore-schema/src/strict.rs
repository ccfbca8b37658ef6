//! Strict-mode conversion for JSON Schemas.
//!
//! Strict mode is the shape LLM function-calling endpoints expect: every
//! object closes over its properties (`additionalProperties: false`),
//! every property is required, and previously-optional properties become
//! nullable so callers can still express "absent".

use serde_json::{json, Map, Value};

/// Converts a JSON Schema into strict-mode form.
///
/// The input is never mutated. The transform:
///
/// 1. deep-copies the schema;
/// 2. removes all `x-*` extension keys and `default`s;
/// 3. for every object schema with `properties`: sets
///    `additionalProperties: false`, marks every property required
///    (sorted), and wraps previously-optional properties as nullable
///    (type-array form for primitives, `oneOf: [original, {type: null}]`
///    otherwise);
/// 4. recurses into nested properties, array `items`, composition
///    keywords, and `definitions`/`$defs`.
#[must_use]
pub fn to_strict(schema: &Value) -> Value {
    let mut result = schema.clone();
    strip_extensions(&mut result);
    convert_to_strict(&mut result);
    result
}

/// Replaces `description` with `x-llm-description` wherever both exist.
///
/// Applied by exporters before stripping extensions, so LLM-facing text
/// wins in exported schemas.
pub(crate) fn apply_llm_descriptions(node: &mut Value) {
    let Value::Object(map) = node else { return };

    if let Some(llm) = map.get("x-llm-description").cloned() {
        if map.contains_key("description") {
            map.insert("description".to_string(), llm);
        }
    }

    if let Some(Value::Object(props)) = map.get_mut("properties") {
        for prop in props.values_mut() {
            apply_llm_descriptions(prop);
        }
    }
    if let Some(items) = map.get_mut("items") {
        apply_llm_descriptions(items);
    }
    for keyword in ["oneOf", "anyOf", "allOf"] {
        if let Some(Value::Array(subs)) = map.get_mut(keyword) {
            for sub in subs {
                apply_llm_descriptions(sub);
            }
        }
    }
    for defs_key in ["definitions", "$defs"] {
        if let Some(Value::Object(defs)) = map.get_mut(defs_key) {
            for def in defs.values_mut() {
                apply_llm_descriptions(def);
            }
        }
    }
}

/// Removes all `x-*` keys and `default` keys recursively.
pub(crate) fn strip_extensions(node: &mut Value) {
    match node {
        Value::Object(map) => {
            map.retain(|key, _| !(key.starts_with("x-") || key == "default"));
            for value in map.values_mut() {
                strip_extensions(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_extensions(item);
            }
        }
        _ => {}
    }
}

fn convert_to_strict(node: &mut Value) {
    let Value::Object(map) = node else { return };

    let is_object_with_properties = map.get("type").and_then(Value::as_str) == Some("object")
        && map.contains_key("properties");

    if is_object_with_properties {
        map.insert("additionalProperties".to_string(), json!(false));

        let existing_required: Vec<String> = map
            .get("required")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut all_names: Vec<String> = Vec::new();
        if let Some(Value::Object(props)) = map.get_mut("properties") {
            all_names = props.keys().cloned().collect();
            for (name, prop) in props.iter_mut() {
                if existing_required.contains(name) {
                    continue;
                }
                make_nullable(prop);
            }
        }

        all_names.sort();
        map.insert("required".to_string(), json!(all_names));
    }

    if let Some(Value::Object(props)) = map.get_mut("properties") {
        for prop in props.values_mut() {
            convert_to_strict(prop);
        }
    }
    if let Some(items) = map.get_mut("items") {
        convert_to_strict(items);
    }
    for keyword in ["oneOf", "anyOf", "allOf"] {
        if let Some(Value::Array(subs)) = map.get_mut(keyword) {
            for sub in subs {
                convert_to_strict(sub);
            }
        }
    }
    for defs_key in ["definitions", "$defs"] {
        if let Some(Value::Object(defs)) = map.get_mut(defs_key) {
            for def in defs.values_mut() {
                convert_to_strict(def);
            }
        }
    }
}

fn make_nullable(prop: &mut Value) {
    let Value::Object(prop_map) = prop else { return };

    match prop_map.get_mut("type") {
        Some(Value::String(name)) => {
            let name = name.clone();
            prop_map.insert("type".to_string(), json!([name, "null"]));
        }
        Some(Value::Array(names)) => {
            if !names.iter().any(|n| n == "null") {
                names.push(json!("null"));
            }
        }
        _ => {
            // Pure composition or $ref target: wrap in oneOf with null.
            let original = Value::Object(std::mem::take(prop_map));
            let mut wrapper = Map::new();
            wrapper.insert(
                "oneOf".to_string(),
                json!([original, {"type": "null"}]),
            );
            *prop_map = wrapper;
        }
    }
}
