//! Runtime validator compiled from the supported JSON-Schema subset.
//!
//! A schema document is compiled once into a [`CompiledSchema`] tree;
//! validation then walks data and tree together, collecting structured
//! [`ValidationIssue`]s instead of failing fast.
//!
//! # Supported subset
//!
//! `type` (single or nullable array), `const`, `enum`, object
//! `properties`/`required`/`additionalProperties`, array `items` /
//! `uniqueItems` / `minItems` / `maxItems`, numeric bounds
//! (`minimum`, `maximum`, `exclusiveMinimum`, `exclusiveMaximum`,
//! `multipleOf`), string bounds (`minLength`, `maxLength`, `pattern`),
//! `oneOf`, `anyOf`, merged-object `allOf`, and pass-through `x-*`
//! extensions. `not` and `if/then/else` are rejected at compile time.
//!
//! # Coercion
//!
//! In coercion mode (the default) compatible primitives are accepted
//! across types: numeric strings for `integer`/`number`, `"true"`/
//! `"false"` for `boolean`, and whole floats for `integer`. Exact mode
//! requires the JSON type to match.

use apcore_types::{JsonMap, ModuleError, ValidationIssue, ValidationResult};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// How object schemas treat keys outside `properties`.
#[derive(Debug, Clone, Default)]
enum Additional {
    /// Unknown keys pass through unvalidated.
    #[default]
    Allow,
    /// Unknown keys are rejected (`additionalProperties: false`).
    Forbid,
    /// Unknown values validate against a schema.
    Schema(Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimType {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    Object,
    Array,
}

impl PrimType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    types: Option<Vec<PrimType>>,
    const_value: Option<Value>,
    enum_values: Option<Vec<Value>>,
    properties: Option<BTreeMap<String, Node>>,
    required: Vec<String>,
    additional: Additional,
    items: Option<Box<Node>>,
    unique_items: bool,
    min_items: Option<usize>,
    max_items: Option<usize>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    multiple_of: Option<f64>,
    one_of: Option<Vec<Node>>,
    any_of: Option<Vec<Node>>,
}

/// A schema compiled for repeated validation.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    root: Node,
}

impl CompiledSchema {
    /// Compiles a resolved JSON Schema document.
    ///
    /// # Errors
    ///
    /// `SCHEMA_PARSE_ERROR` for unsupported keywords, malformed
    /// constraints, or invalid `allOf` merges.
    pub fn compile(schema: &Value) -> Result<Self, ModuleError> {
        Ok(Self {
            root: compile_node(schema)?,
        })
    }

    /// A validator that accepts any value.
    #[must_use]
    pub fn any() -> Self {
        Self {
            root: Node::default(),
        }
    }

    /// Validates an object payload.
    #[must_use]
    pub fn validate_map(&self, data: &JsonMap, coerce: bool) -> ValidationResult {
        // Borrow the map as a Value without cloning the payload.
        let mut issues = Vec::new();
        validate_object_root(&self.root, data, coerce, &mut issues);
        if issues.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::failed(issues)
        }
    }

    /// Validates an arbitrary value.
    #[must_use]
    pub fn validate_value(&self, value: &Value, coerce: bool) -> ValidationResult {
        let mut issues = Vec::new();
        validate_node(&self.root, value, "", coerce, &mut issues);
        if issues.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::failed(issues)
        }
    }
}

/// Validator facade with a fixed coercion mode.
///
/// Mirrors the executor's two call sites: `validate` collects, the
/// `validate_input` / `validate_output` conveniences raise.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    coerce_types: bool,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self { coerce_types: true }
    }
}

impl SchemaValidator {
    /// Creates a validator; `coerce_types` enables lax primitive coercion.
    #[must_use]
    pub fn new(coerce_types: bool) -> Self {
        Self { coerce_types }
    }

    /// Validates and returns the collected result.
    #[must_use]
    pub fn validate(&self, data: &JsonMap, schema: &CompiledSchema) -> ValidationResult {
        schema.validate_map(data, self.coerce_types)
    }

    /// Validates input data; failure becomes a `SCHEMA_VALIDATION_ERROR`.
    ///
    /// # Errors
    ///
    /// Returns the structured validation error on failure.
    pub fn validate_input(
        &self,
        data: &JsonMap,
        schema: &CompiledSchema,
    ) -> Result<(), ModuleError> {
        let result = schema.validate_map(data, self.coerce_types);
        if result.valid {
            Ok(())
        } else {
            Err(result.into_error("Input validation failed"))
        }
    }

    /// Validates output data; failure becomes a `SCHEMA_VALIDATION_ERROR`.
    ///
    /// # Errors
    ///
    /// Returns the structured validation error on failure.
    pub fn validate_output(
        &self,
        data: &JsonMap,
        schema: &CompiledSchema,
    ) -> Result<(), ModuleError> {
        let result = schema.validate_map(data, self.coerce_types);
        if result.valid {
            Ok(())
        } else {
            Err(result.into_error("Output validation failed"))
        }
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

fn compile_node(schema: &Value) -> Result<Node, ModuleError> {
    let map = match schema {
        Value::Object(map) => map,
        Value::Null => return Ok(Node::default()),
        other => {
            return Err(ModuleError::schema_parse(format!(
                "schema must be a mapping, got {other}"
            )))
        }
    };

    if map.contains_key("not") {
        return Err(ModuleError::schema_parse("'not' keyword not supported"));
    }
    if map.contains_key("if") || map.contains_key("then") || map.contains_key("else") {
        return Err(ModuleError::schema_parse("if/then/else not supported"));
    }

    if let Some(all_of) = map.get("allOf") {
        let merged = merge_all_of(all_of)?;
        return compile_node(&merged);
    }

    let mut node = Node::default();

    match map.get("type") {
        None => {}
        Some(Value::String(name)) => {
            let prim = PrimType::parse(name).ok_or_else(|| {
                ModuleError::schema_parse(format!("unknown type '{name}'"))
            })?;
            node.types = Some(vec![prim]);
        }
        Some(Value::Array(names)) => {
            let mut types = Vec::with_capacity(names.len());
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    ModuleError::schema_parse("'type' array entries must be strings")
                })?;
                types.push(PrimType::parse(name).ok_or_else(|| {
                    ModuleError::schema_parse(format!("unknown type '{name}'"))
                })?);
            }
            node.types = Some(types);
        }
        Some(other) => {
            return Err(ModuleError::schema_parse(format!(
                "'type' must be a string or array, got {other}"
            )))
        }
    }

    node.const_value = map.get("const").cloned();
    if let Some(values) = map.get("enum") {
        let values = values
            .as_array()
            .ok_or_else(|| ModuleError::schema_parse("'enum' must be an array"))?;
        node.enum_values = Some(values.clone());
    }

    if let Some(props) = map.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| ModuleError::schema_parse("'properties' must be a mapping"))?;
        let mut compiled = BTreeMap::new();
        for (name, sub) in props {
            compiled.insert(name.clone(), compile_node(sub)?);
        }
        node.properties = Some(compiled);
    }

    if let Some(required) = map.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| ModuleError::schema_parse("'required' must be an array"))?;
        node.required = required
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ModuleError::schema_parse("'required' entries must be strings"))
            })
            .collect::<Result<_, _>>()?;
    }

    node.additional = match map.get("additionalProperties") {
        None | Some(Value::Bool(true)) => Additional::Allow,
        Some(Value::Bool(false)) => Additional::Forbid,
        Some(schema @ Value::Object(_)) => Additional::Schema(Box::new(compile_node(schema)?)),
        Some(other) => {
            return Err(ModuleError::schema_parse(format!(
                "'additionalProperties' must be a boolean or schema, got {other}"
            )))
        }
    };

    if let Some(items) = map.get("items") {
        node.items = Some(Box::new(compile_node(items)?));
    }
    node.unique_items = map
        .get("uniqueItems")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    node.min_items = get_usize(map, "minItems")?;
    node.max_items = get_usize(map, "maxItems")?;
    node.min_length = get_usize(map, "minLength")?;
    node.max_length = get_usize(map, "maxLength")?;

    if let Some(pattern) = map.get("pattern") {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| ModuleError::schema_parse("'pattern' must be a string"))?;
        node.pattern = Some(
            Regex::new(pattern)
                .map_err(|e| ModuleError::schema_parse(format!("invalid pattern: {e}")))?,
        );
    }

    node.minimum = get_f64(map, "minimum")?;
    node.maximum = get_f64(map, "maximum")?;
    node.exclusive_minimum = get_f64(map, "exclusiveMinimum")?;
    node.exclusive_maximum = get_f64(map, "exclusiveMaximum")?;
    node.multiple_of = get_f64(map, "multipleOf")?;

    if let Some(branches) = map.get("oneOf") {
        node.one_of = Some(compile_branches(branches, "oneOf")?);
    }
    if let Some(branches) = map.get("anyOf") {
        node.any_of = Some(compile_branches(branches, "anyOf")?);
    }

    Ok(node)
}

fn compile_branches(value: &Value, keyword: &str) -> Result<Vec<Node>, ModuleError> {
    let branches = value
        .as_array()
        .ok_or_else(|| ModuleError::schema_parse(format!("'{keyword}' must be an array")))?;
    branches.iter().map(compile_node).collect()
}

/// Merges `allOf` members into a single object schema.
///
/// Only object schemas merge; conflicting property types fail loading.
fn merge_all_of(all_of: &Value) -> Result<Value, ModuleError> {
    let members = all_of
        .as_array()
        .ok_or_else(|| ModuleError::schema_parse("'allOf' must be an array"))?;

    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    for member in members {
        let member = member
            .as_object()
            .ok_or_else(|| ModuleError::schema_parse("allOf members must be mappings"))?;
        let is_object = member.get("type").and_then(Value::as_str) == Some("object")
            || member.contains_key("properties");
        if !is_object {
            return Err(ModuleError::schema_parse(
                "allOf with non-object member not supported",
            ));
        }
        if let Some(props) = member.get("properties").and_then(Value::as_object) {
            for (name, sub) in props {
                if let Some(existing) = properties.get(name) {
                    let old = existing.get("type").and_then(Value::as_str);
                    let new = sub.get("type").and_then(Value::as_str);
                    if let (Some(old), Some(new)) = (old, new) {
                        if old != new {
                            return Err(ModuleError::schema_parse(format!(
                                "allOf conflict: property '{name}' has types '{old}' and '{new}'"
                            )));
                        }
                    }
                }
                properties.insert(name.clone(), sub.clone());
            }
        }
        if let Some(req) = member.get("required").and_then(Value::as_array) {
            for entry in req {
                if !required.contains(entry) {
                    required.push(entry.clone());
                }
            }
        }
    }

    Ok(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn get_usize(map: &JsonMap, key: &str) -> Result<Option<usize>, ModuleError> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|v| Some(v as usize))
            .ok_or_else(|| ModuleError::schema_parse(format!("'{key}' must be a non-negative integer"))),
    }
}

fn get_f64(map: &JsonMap, key: &str) -> Result<Option<f64>, ModuleError> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| ModuleError::schema_parse(format!("'{key}' must be a number"))),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_object_root(node: &Node, data: &JsonMap, coerce: bool, issues: &mut Vec<ValidationIssue>) {
    // Root payloads are always objects; run the object-facing checks
    // directly so we avoid materializing a Value clone of the inputs.
    if let Some(branches) = &node.one_of {
        let value = Value::Object(data.clone());
        check_one_of(branches, &value, "", coerce, issues);
        return;
    }
    if let Some(branches) = &node.any_of {
        let value = Value::Object(data.clone());
        check_any_of(branches, &value, "", coerce, issues);
        return;
    }
    if let Some(types) = &node.types {
        if !types.contains(&PrimType::Object) {
            issues.push(type_issue("", types, "object"));
            return;
        }
    }
    validate_object_fields(node, data, "", coerce, issues);
}

fn validate_node(
    node: &Node,
    value: &Value,
    path: &str,
    coerce: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(branches) = &node.one_of {
        check_one_of(branches, value, path, coerce, issues);
        return;
    }
    if let Some(branches) = &node.any_of {
        check_any_of(branches, value, path, coerce, issues);
        return;
    }

    if let Some(expected) = &node.const_value {
        if value != expected {
            issues.push(
                ValidationIssue::new(path, "const", "value does not match the declared constant")
                    .with_expected(expected.clone())
                    .with_actual(value.clone()),
            );
        }
        return;
    }
    if let Some(allowed) = &node.enum_values {
        if !allowed.contains(value) {
            issues.push(
                ValidationIssue::new(path, "enum", "value is not one of the allowed values")
                    .with_expected(Value::Array(allowed.clone()))
                    .with_actual(value.clone()),
            );
        }
        return;
    }

    if let Some(types) = &node.types {
        if !type_matches(types, value, coerce) {
            issues.push(type_issue(path, types, json_type_name(value)));
            return;
        }
    }

    match value {
        Value::Object(map) => validate_object_fields(node, map, path, coerce, issues),
        Value::Array(items) => validate_array(node, items, path, coerce, issues),
        Value::String(text) => validate_string(node, text, value, path, coerce, issues),
        Value::Number(_) => validate_number_facets(node, value, path, issues),
        _ => {}
    }
}

fn validate_object_fields(
    node: &Node,
    map: &JsonMap,
    path: &str,
    coerce: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    for name in &node.required {
        if !map.contains_key(name) {
            issues.push(ValidationIssue::new(
                join(path, name),
                "required",
                "field required",
            ));
        }
    }

    let empty = BTreeMap::new();
    let properties = node.properties.as_ref().unwrap_or(&empty);
    for (name, sub) in properties {
        if let Some(value) = map.get(name) {
            validate_node(sub, value, &join(path, name), coerce, issues);
        }
    }

    match &node.additional {
        Additional::Allow => {}
        Additional::Forbid => {
            for name in map.keys() {
                if !properties.contains_key(name) {
                    issues.push(ValidationIssue::new(
                        join(path, name),
                        "additionalProperties",
                        "unknown field not permitted",
                    ));
                }
            }
        }
        Additional::Schema(sub) => {
            for (name, value) in map {
                if !properties.contains_key(name) {
                    validate_node(sub, value, &join(path, name), coerce, issues);
                }
            }
        }
    }
}

fn validate_array(
    node: &Node,
    items: &[Value],
    path: &str,
    coerce: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(min) = node.min_items {
        if items.len() < min {
            issues.push(
                ValidationIssue::new(path, "minItems", format!("array has fewer than {min} items"))
                    .with_expected(json!(min))
                    .with_actual(json!(items.len())),
            );
        }
    }
    if let Some(max) = node.max_items {
        if items.len() > max {
            issues.push(
                ValidationIssue::new(path, "maxItems", format!("array has more than {max} items"))
                    .with_expected(json!(max))
                    .with_actual(json!(items.len())),
            );
        }
    }
    if node.unique_items {
        for (i, item) in items.iter().enumerate() {
            if items[..i].contains(item) {
                issues.push(
                    ValidationIssue::new(path, "uniqueItems", "array items must be unique")
                        .with_actual(item.clone()),
                );
                break;
            }
        }
    }
    if let Some(item_node) = &node.items {
        for (i, item) in items.iter().enumerate() {
            validate_node(item_node, item, &join(path, &i.to_string()), coerce, issues);
        }
    }
}

fn validate_string(
    node: &Node,
    text: &str,
    value: &Value,
    path: &str,
    _coerce: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    let chars = text.chars().count();
    if let Some(min) = node.min_length {
        if chars < min {
            issues.push(
                ValidationIssue::new(path, "minLength", format!("string shorter than {min}"))
                    .with_expected(json!(min))
                    .with_actual(json!(chars)),
            );
        }
    }
    if let Some(max) = node.max_length {
        if chars > max {
            issues.push(
                ValidationIssue::new(path, "maxLength", format!("string longer than {max}"))
                    .with_expected(json!(max))
                    .with_actual(json!(chars)),
            );
        }
    }
    if let Some(pattern) = &node.pattern {
        if !pattern.is_match(text) {
            issues.push(
                ValidationIssue::new(path, "pattern", "string does not match pattern")
                    .with_expected(json!(pattern.as_str()))
                    .with_actual(value.clone()),
            );
        }
    }
    // A numeric string validated against a numeric type in coercion mode
    // still honors the numeric bounds.
    if node.minimum.is_some()
        || node.maximum.is_some()
        || node.exclusive_minimum.is_some()
        || node.exclusive_maximum.is_some()
        || node.multiple_of.is_some()
    {
        if let Ok(parsed) = text.parse::<f64>() {
            check_numeric(node, parsed, value, path, issues);
        }
    }
}

fn validate_number_facets(node: &Node, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    if let Some(number) = value.as_f64() {
        check_numeric(node, number, value, path, issues);
    }
}

fn check_numeric(
    node: &Node,
    number: f64,
    value: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(min) = node.minimum {
        if number < min {
            issues.push(
                ValidationIssue::new(path, "minimum", format!("value is less than {min}"))
                    .with_expected(json!(min))
                    .with_actual(value.clone()),
            );
        }
    }
    if let Some(max) = node.maximum {
        if number > max {
            issues.push(
                ValidationIssue::new(path, "maximum", format!("value is greater than {max}"))
                    .with_expected(json!(max))
                    .with_actual(value.clone()),
            );
        }
    }
    if let Some(min) = node.exclusive_minimum {
        if number <= min {
            issues.push(
                ValidationIssue::new(
                    path,
                    "exclusiveMinimum",
                    format!("value must be greater than {min}"),
                )
                .with_expected(json!(min))
                .with_actual(value.clone()),
            );
        }
    }
    if let Some(max) = node.exclusive_maximum {
        if number >= max {
            issues.push(
                ValidationIssue::new(
                    path,
                    "exclusiveMaximum",
                    format!("value must be less than {max}"),
                )
                .with_expected(json!(max))
                .with_actual(value.clone()),
            );
        }
    }
    if let Some(step) = node.multiple_of {
        if step != 0.0 {
            let ratio = number / step;
            if (ratio - ratio.round()).abs() > 1e-9 {
                issues.push(
                    ValidationIssue::new(path, "multipleOf", format!("value is not a multiple of {step}"))
                        .with_expected(json!(step))
                        .with_actual(value.clone()),
                );
            }
        }
    }
}

fn check_one_of(
    branches: &[Node],
    value: &Value,
    path: &str,
    coerce: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    let matching = branches
        .iter()
        .filter(|branch| branch_matches(branch, value, coerce))
        .count();
    if matching != 1 {
        issues.push(
            ValidationIssue::new(
                path,
                "oneOf",
                format!("value must match exactly one alternative, matched {matching}"),
            )
            .with_actual(value.clone()),
        );
    }
}

fn check_any_of(
    branches: &[Node],
    value: &Value,
    path: &str,
    coerce: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    if !branches.iter().any(|branch| branch_matches(branch, value, coerce)) {
        issues.push(
            ValidationIssue::new(path, "anyOf", "value matches none of the alternatives")
                .with_actual(value.clone()),
        );
    }
}

fn branch_matches(branch: &Node, value: &Value, coerce: bool) -> bool {
    let mut sub_issues = Vec::new();
    validate_node(branch, value, "", coerce, &mut sub_issues);
    sub_issues.is_empty()
}

fn type_matches(types: &[PrimType], value: &Value, coerce: bool) -> bool {
    types.iter().any(|t| single_type_matches(*t, value, coerce))
}

fn single_type_matches(prim: PrimType, value: &Value, coerce: bool) -> bool {
    match prim {
        PrimType::String => value.is_string(),
        PrimType::Boolean => match value {
            Value::Bool(_) => true,
            Value::String(s) if coerce => s == "true" || s == "false",
            _ => false,
        },
        PrimType::Integer => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            Value::String(s) if coerce => s.parse::<i64>().is_ok(),
            _ => false,
        },
        PrimType::Number => match value {
            Value::Number(_) => true,
            Value::String(s) if coerce => s.parse::<f64>().is_ok(),
            _ => false,
        },
        PrimType::Null => value.is_null(),
        PrimType::Object => value.is_object(),
        PrimType::Array => value.is_array(),
    }
}

fn type_issue(path: &str, types: &[PrimType], actual: &str) -> ValidationIssue {
    let expected: Vec<&str> = types.iter().map(|t| t.name()).collect();
    let expected_text = expected.join(" | ");
    ValidationIssue::new(
        path,
        "type",
        format!("expected {expected_text}, got {actual}"),
    )
    .with_expected(json!(expected_text))
    .with_actual(json!(actual))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, segment: &str) -> String {
    format!("{path}/{segment}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(schema: Value) -> CompiledSchema {
        CompiledSchema::compile(&schema).expect("schema compiles")
    }

    fn obj(value: Value) -> JsonMap {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn required_and_type() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}},
            "required": ["name"]
        }));

        let result = schema.validate_map(&obj(json!({"age": "zero"})), true);
        assert!(!result.valid);
        let constraints: Vec<&str> =
            result.errors.iter().map(|e| e.constraint.as_str()).collect();
        assert!(constraints.contains(&"required"));
        assert!(constraints.contains(&"type"));

        let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"/name"));
        assert!(paths.contains(&"/age"));
    }

    #[test]
    fn coercion_mode_accepts_numeric_strings() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}}
        }));
        assert!(schema.validate_map(&obj(json!({"count": "123"})), true).valid);
        assert!(!schema.validate_map(&obj(json!({"count": "123"})), false).valid);
        assert!(!schema.validate_map(&obj(json!({"count": "12.5"})), true).valid);
    }

    #[test]
    fn integer_accepts_whole_floats() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"n": {"type": "integer"}}
        }));
        assert!(schema.validate_map(&obj(json!({"n": 3.0})), false).valid);
        assert!(!schema.validate_map(&obj(json!({"n": 3.5})), false).valid);
    }

    #[test]
    fn nullable_type_array() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"note": {"type": ["string", "null"]}}
        }));
        assert!(schema.validate_map(&obj(json!({"note": null})), true).valid);
        assert!(schema.validate_map(&obj(json!({"note": "x"})), true).valid);
        assert!(!schema.validate_map(&obj(json!({"note": 4})), true).valid);
    }

    #[test]
    fn const_and_enum() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "kind": {"const": "event"},
                "level": {"enum": ["low", "high"]}
            }
        }));
        assert!(schema
            .validate_map(&obj(json!({"kind": "event", "level": "low"})), true)
            .valid);

        let result = schema.validate_map(&obj(json!({"kind": "other", "level": "mid"})), true);
        let constraints: Vec<&str> =
            result.errors.iter().map(|e| e.constraint.as_str()).collect();
        assert!(constraints.contains(&"const"));
        assert!(constraints.contains(&"enum"));
    }

    #[test]
    fn string_bounds_and_pattern() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "minLength": 2, "maxLength": 4, "pattern": "^[a-z]+$"}
            }
        }));
        assert!(schema.validate_map(&obj(json!({"code": "abc"})), true).valid);
        assert!(!schema.validate_map(&obj(json!({"code": "a"})), true).valid);
        assert!(!schema.validate_map(&obj(json!({"code": "abcde"})), true).valid);
        assert!(!schema.validate_map(&obj(json!({"code": "AB"})), true).valid);
    }

    #[test]
    fn numeric_bounds() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "pct": {"type": "number", "minimum": 0, "maximum": 100},
                "step": {"type": "integer", "exclusiveMinimum": 0, "multipleOf": 5}
            }
        }));
        assert!(schema
            .validate_map(&obj(json!({"pct": 50, "step": 10})), true)
            .valid);

        let result = schema.validate_map(&obj(json!({"pct": 101, "step": 0})), true);
        let constraints: Vec<&str> =
            result.errors.iter().map(|e| e.constraint.as_str()).collect();
        assert!(constraints.contains(&"maximum"));
        assert!(constraints.contains(&"exclusiveMinimum"));

        let result = schema.validate_map(&obj(json!({"pct": 1, "step": 7})), true);
        assert!(result.errors.iter().any(|e| e.constraint == "multipleOf"));
    }

    #[test]
    fn array_items_and_uniqueness() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1,
                    "maxItems": 3,
                    "uniqueItems": true
                }
            }
        }));
        assert!(schema
            .validate_map(&obj(json!({"tags": ["a", "b"]})), true)
            .valid);

        let result = schema.validate_map(&obj(json!({"tags": ["a", "a"]})), true);
        assert!(result.errors.iter().any(|e| e.constraint == "uniqueItems"));

        let result = schema.validate_map(&obj(json!({"tags": []})), true);
        assert!(result.errors.iter().any(|e| e.constraint == "minItems"));

        let result = schema.validate_map(&obj(json!({"tags": ["a", 2]})), false);
        assert!(result
            .errors
            .iter()
            .any(|e| e.constraint == "type" && e.path == "/tags/1"));
    }

    #[test]
    fn additional_properties_false() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "additionalProperties": false
        }));
        let result = schema.validate_map(&obj(json!({"a": "x", "b": 1})), true);
        assert!(result
            .errors
            .iter()
            .any(|e| e.constraint == "additionalProperties" && e.path == "/b"));
    }

    #[test]
    fn additional_properties_schema() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "additionalProperties": {"type": "integer"}
        }));
        assert!(schema.validate_map(&obj(json!({"a": "x", "b": 2})), true).valid);
        let result = schema.validate_map(&obj(json!({"b": "nope"})), false);
        assert!(result.errors.iter().any(|e| e.path == "/b"));
    }

    #[test]
    fn nested_object_paths() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }
            }
        }));
        let result = schema.validate_map(&obj(json!({"user": {}})), true);
        assert_eq!(result.errors[0].path, "/user/name");
    }

    #[test]
    fn one_of_exactly_one() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "value": {"oneOf": [{"type": "string"}, {"type": "integer"}]}
            }
        }));
        assert!(schema.validate_map(&obj(json!({"value": "x"})), false).valid);
        assert!(schema.validate_map(&obj(json!({"value": 3})), false).valid);
        let result = schema.validate_map(&obj(json!({"value": true})), false);
        assert!(result.errors.iter().any(|e| e.constraint == "oneOf"));
    }

    #[test]
    fn any_of_at_least_one() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "value": {"anyOf": [{"type": "number"}, {"type": "integer"}]}
            }
        }));
        assert!(schema.validate_map(&obj(json!({"value": 3})), false).valid);
        let result = schema.validate_map(&obj(json!({"value": []})), false);
        assert!(result.errors.iter().any(|e| e.constraint == "anyOf"));
    }

    #[test]
    fn all_of_merges_objects() {
        let schema = compile(json!({
            "allOf": [
                {"type": "object", "properties": {"a": {"type": "string"}}, "required": ["a"]},
                {"type": "object", "properties": {"b": {"type": "integer"}}, "required": ["b"]}
            ]
        }));
        assert!(schema.validate_map(&obj(json!({"a": "x", "b": 1})), true).valid);
        let result = schema.validate_map(&obj(json!({"a": "x"})), true);
        assert!(result.errors.iter().any(|e| e.path == "/b"));
    }

    #[test]
    fn all_of_type_conflict_fails_compile() {
        let err = CompiledSchema::compile(&json!({
            "allOf": [
                {"type": "object", "properties": {"a": {"type": "string"}}},
                {"type": "object", "properties": {"a": {"type": "integer"}}}
            ]
        }))
        .expect_err("conflict");
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn all_of_non_object_fails_compile() {
        assert!(CompiledSchema::compile(&json!({
            "allOf": [{"type": "string"}]
        }))
        .is_err());
    }

    #[test]
    fn not_keyword_rejected() {
        use apcore_types::ErrorCode;
        let err = CompiledSchema::compile(&json!({"not": {"type": "string"}}))
            .expect_err("unsupported");
        assert_eq!(err.code(), "SCHEMA_PARSE_ERROR");
    }

    #[test]
    fn if_then_else_rejected() {
        assert!(CompiledSchema::compile(&json!({"if": {}, "then": {}})).is_err());
    }

    #[test]
    fn validator_facade_raises_on_input() {
        use apcore_types::ErrorCode;
        let schema = compile(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        }));
        let validator = SchemaValidator::default();
        let err = validator
            .validate_input(&JsonMap::new(), &schema)
            .expect_err("missing field");
        assert_eq!(err.code(), "SCHEMA_VALIDATION_ERROR");
    }

    #[test]
    fn unknown_keys_allowed_by_default() {
        let schema = compile(json!({
            "type": "object",
            "properties": {"a": {"type": "string"}}
        }));
        assert!(schema.validate_map(&obj(json!({"zzz": [1, 2]})), true).valid);
    }

    #[test]
    fn x_extensions_ignored_by_validation() {
        let schema = compile(json!({
            "type": "object",
            "properties": {
                "token": {"type": "string", "x-sensitive": true, "x-llm-description": "secret"}
            }
        }));
        assert!(schema.validate_map(&obj(json!({"token": "t"})), true).valid);
    }
}
