//! Shape normalization for JSON-Schema-like values.
//!
//! Route authors and bridges hand us arbitrary schema fragments. Nothing here
//! rejects input: unknown shapes degrade to `{"type":"string"}` (leaves) or
//! `{"type":"object","properties":{}}` (containers), so the catalog can always
//! be built.
//!
//! Flattening is one level deep: the children of an object-typed body property
//! are hoisted as `parent.child` keys. Grandchildren stay nested inside the
//! hoisted child schema.

use crate::route::ParameterSpec;
use serde_json::{json, Map, Value};

const KNOWN_TYPES: &[&str] = &[
    "string", "number", "integer", "boolean", "array", "object", "null",
];

pub fn string_schema() -> Value {
    json!({ "type": "string" })
}

pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Canonicalize a schema node and everything below it.
///
/// After this, every `array` carries `items` and every `object` carries
/// `properties`. Keys we do not rewrite (`description`, `enum`, `format`,
/// `example`, `default`, ...) are passed through untouched.
pub fn normalize(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return string_schema();
    };

    let ty = resolve_type(obj);
    let mut out = Map::with_capacity(obj.len() + 1);
    for (k, v) in obj {
        match k.as_str() {
            "type" | "items" | "properties" | "required" => {}
            _ => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    out.insert("type".into(), Value::String(ty.to_string()));

    match ty {
        "array" => {
            out.insert("items".into(), normalize_items(obj.get("items")));
        }
        "object" => {
            let props = match obj.get("properties") {
                Some(Value::Object(props)) => props
                    .iter()
                    .map(|(name, child)| (name.clone(), normalize(child)))
                    .collect(),
                _ => Map::new(),
            };
            out.insert("properties".into(), Value::Object(props));
            if let Some(required) = obj.get("required") {
                let names = required_names(required);
                if !names.is_empty() {
                    out.insert("required".into(), json!(names));
                }
            }
        }
        _ => {
            // Leaves keep whatever `required` they had; it carries no shape.
            if let Some(required) = obj.get("required") {
                out.insert("required".into(), required.clone());
            }
        }
    }

    Value::Object(out)
}

fn resolve_type(obj: &Map<String, Value>) -> &'static str {
    let declared = match obj.get("type") {
        Some(Value::String(s)) => Some(s.as_str()),
        // `["string", "null"]` style unions collapse to the first concrete type.
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .or_else(|| types.iter().filter_map(Value::as_str).next()),
        _ => None,
    };

    if let Some(found) = declared.and_then(|d| KNOWN_TYPES.iter().copied().find(|k| *k == d)) {
        return found;
    }
    if declared.is_none() {
        if obj.contains_key("properties") {
            return "object";
        }
        if obj.contains_key("items") {
            return "array";
        }
    }
    "string"
}

fn normalize_items(items: Option<&Value>) -> Value {
    match items {
        Some(v @ Value::Object(_)) => normalize(v),
        // Tuple form: the first positional schema stands in for all items.
        Some(Value::Array(tuple)) => match tuple.first() {
            Some(v @ Value::Object(_)) => normalize(v),
            _ => string_schema(),
        },
        _ => string_schema(),
    }
}

fn required_names(required: &Value) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    if let Value::Array(items) = required {
        for name in items.iter().filter_map(Value::as_str) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// True for an object schema with at least one declared property.
///
/// Only such bodies are flattened; anything else travels as a single `body`
/// argument.
pub fn is_structured_object(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object")
        && schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|p| !p.is_empty())
}

/// `required` of a normalized object schema.
pub fn required_of(schema: &Value) -> Vec<String> {
    schema.get("required").map(required_names).unwrap_or_default()
}

/// Join key for a hoisted child argument.
pub fn dotted_key(parent: &str, child: &str) -> String {
    format!("{parent}.{child}")
}

/// Flat tool input schema under construction.
#[derive(Debug, Clone, Default)]
pub struct FlatSchema {
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl FlatSchema {
    pub fn insert(&mut self, name: impl Into<String>, schema: Value, required: bool) {
        let name = name.into();
        if required {
            self.mark_required(&name);
        }
        self.properties.insert(name, schema);
    }

    pub fn mark_required(&mut self, name: &str) {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Final `{"type":"object", ...}` value, normalized once more.
    pub fn into_schema(self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), json!("object"));
        out.insert("properties".into(), Value::Object(self.properties));
        if !self.required.is_empty() {
            out.insert("required".into(), json!(self.required));
        }
        normalize(&Value::Object(out))
    }
}

/// Merge a route body schema into the flat target.
///
/// Structured object bodies are de-nested one level. Any other body becomes a
/// single `body` property, required when `body_required` is set.
pub fn flatten_object_properties(body_schema: &Value, body_required: bool, target: &mut FlatSchema) {
    let body = normalize(body_schema);
    if !is_structured_object(&body) {
        target.insert("body", body, body_required);
        return;
    }

    let top_required = required_of(&body);
    let Some(props) = body.get("properties").and_then(Value::as_object) else {
        return;
    };

    for (name, prop) in props {
        if is_structured_object(prop) {
            let child_required = required_of(prop);
            if let Some(children) = prop.get("properties").and_then(Value::as_object) {
                for (child, child_schema) in children {
                    let key = dotted_key(name, child);
                    let required = child_required.iter().any(|r| r == child);
                    target.insert(key, child_schema.clone(), required);
                }
            }
        } else {
            let required = top_required.iter().any(|r| r == name);
            target.insert(name.clone(), prop.clone(), required);
        }
    }
}

/// Normalized schema for one query/header/path parameter.
pub fn extract_parameter_schema(spec: &ParameterSpec) -> Value {
    let mut schema = spec
        .schema
        .as_ref()
        .map(normalize)
        .unwrap_or_else(string_schema);
    if let (Some(desc), Some(obj)) = (&spec.description, schema.as_object_mut()) {
        obj.entry("description")
            .or_insert_with(|| Value::String(desc.clone()));
    }
    schema
}

/// Short type label for a response schema, e.g. `array of object`.
pub fn type_label(schema: &Value) -> String {
    let normalized = normalize(schema);
    let ty = normalized
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("string");
    if ty == "array" {
        let inner = normalized
            .get("items")
            .and_then(|i| i.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("string");
        return format!("array of {inner}");
    }
    ty.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::ParamLocation;

    fn every_array_has_items(v: &Value) -> bool {
        match v {
            Value::Object(obj) => {
                if obj.get("type").and_then(Value::as_str) == Some("array")
                    && !obj.get("items").is_some_and(Value::is_object)
                {
                    return false;
                }
                obj.values().all(every_array_has_items)
            }
            Value::Array(items) => items.iter().all(every_array_has_items),
            _ => true,
        }
    }

    fn samples() -> Vec<Value> {
        vec![
            json!(null),
            json!("string"),
            json!({}),
            json!({"type": "array"}),
            json!({"type": "array", "items": "nope"}),
            json!({"type": "array", "items": [{"type": "integer"}]}),
            json!({"type": ["string", "null"], "format": "date-time"}),
            json!({"type": "object", "properties": []}),
            json!({"properties": {"tags": {"type": "array"}}, "required": ["tags", 4, "tags"]}),
            json!({
                "type": "object",
                "properties": {
                    "order": {
                        "type": "object",
                        "properties": {
                            "lines": {"type": "array", "items": {"type": "object"}},
                            "note": {"description": "free text", "example": "hi"}
                        }
                    }
                }
            }),
            json!({"type": "weird", "enum": ["a", "b"]}),
        ]
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in samples() {
            let once = normalize(&s);
            assert_eq!(normalize(&once), once, "not idempotent for {s}");
        }
    }

    #[test]
    fn normalized_arrays_always_have_items() {
        for s in samples() {
            assert!(every_array_has_items(&normalize(&s)), "missing items in {s}");
        }
    }

    /// Every nesting of the given wrappers around a leaf, up to `depth` levels.
    fn nested_shapes(depth: usize) -> Vec<Value> {
        let leaves = vec![
            json!({}),
            json!({"type": "array"}),
            json!({"type": ["integer", "null"]}),
            json!({"type": "object"}),
        ];
        let wrappers: [fn(Value) -> Value; 5] = [
            |inner| json!({"type": "array", "items": inner}),
            |inner| json!({"type": "object", "properties": {"child": inner, "bare": {"type": "array"}}}),
            |inner| json!({"properties": {"list": {"type": "array", "items": inner}}, "required": ["list"]}),
            |inner| json!({"type": ["array", "null"], "items": inner}),
            |inner| json!({"type": "array", "items": [inner]}),
        ];

        let mut level = leaves;
        let mut all = level.clone();
        for _ in 0..depth {
            level = level
                .iter()
                .flat_map(|inner| wrappers.iter().map(move |wrap| wrap(inner.clone())))
                .collect();
            all.extend(level.iter().cloned());
        }
        all
    }

    #[test]
    fn generated_nested_shapes_normalize_idempotently() {
        let shapes = nested_shapes(3);
        assert!(shapes.len() > 500);
        for s in shapes {
            let once = normalize(&s);
            assert_eq!(normalize(&once), once, "not idempotent for {s}");
            assert!(every_array_has_items(&once), "missing items in {s}");
        }
    }

    #[test]
    fn array_without_items_deep_inside_objects_gets_string_items() {
        let s = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "rows": {"type": "array", "items": {"properties": {"cells": {"type": "array"}}}}
                }
            }
        });
        let n = normalize(&s);
        assert_eq!(
            n["items"]["properties"]["rows"]["items"]["properties"]["cells"]["items"],
            json!({"type": "string"})
        );
    }

    #[test]
    fn objects_gain_empty_properties_and_leaves_default_to_string() {
        assert_eq!(
            normalize(&json!({"type": "object"})),
            json!({"type": "object", "properties": {}})
        );
        assert_eq!(normalize(&json!({"description": "x"})), json!({"type": "string", "description": "x"}));
        assert_eq!(normalize(&json!(42)), json!({"type": "string"}));
    }

    #[test]
    fn descriptive_fields_pass_through() {
        let s = json!({"type": "string", "enum": ["a"], "format": "email", "example": "a@b.c"});
        assert_eq!(normalize(&s), s);
    }

    #[test]
    fn flatten_hoists_children_with_dotted_keys() {
        let body = json!({
            "type": "object",
            "required": ["product", "note"],
            "properties": {
                "product": {
                    "type": "object",
                    "required": ["id"],
                    "properties": {
                        "id": {"type": "string"},
                        "qty": {"type": "integer"}
                    }
                },
                "note": {"type": "string"},
                "tags": {"type": "array"}
            }
        });
        let mut flat = FlatSchema::default();
        flatten_object_properties(&body, false, &mut flat);

        assert_eq!(flat.properties["product.id"], json!({"type": "string"}));
        assert_eq!(flat.properties["product.qty"], json!({"type": "integer"}));
        assert!(!flat.contains("product"));
        assert_eq!(flat.properties["tags"], json!({"type": "array", "items": {"type": "string"}}));
        let mut required = flat.required.clone();
        required.sort();
        assert_eq!(required, vec!["note".to_string(), "product.id".to_string()]);
    }

    #[test]
    fn flatten_keeps_grandchildren_nested() {
        let body = json!({
            "type": "object",
            "properties": {
                "a": {"type": "object", "properties": {"b": {"type": "object", "properties": {"c": {"type": "array"}}}}}
            }
        });
        let mut flat = FlatSchema::default();
        flatten_object_properties(&body, false, &mut flat);
        let hoisted = &flat.properties["a.b"];
        assert_eq!(hoisted["properties"]["c"]["items"], json!({"type": "string"}));
    }

    #[test]
    fn non_object_body_becomes_single_body_property() {
        let mut flat = FlatSchema::default();
        flatten_object_properties(&json!({"type": "array", "items": {"type": "integer"}}), true, &mut flat);
        assert_eq!(flat.properties["body"], json!({"type": "array", "items": {"type": "integer"}}));
        assert_eq!(flat.required, vec!["body".to_string()]);
    }

    #[test]
    fn parameter_schema_defaults_to_string() {
        let spec = ParameterSpec {
            name: "id".into(),
            location: ParamLocation::Path,
            required: true,
            schema: None,
            description: Some("user id".into()),
        };
        assert_eq!(
            extract_parameter_schema(&spec),
            json!({"type": "string", "description": "user id"})
        );
    }

    #[test]
    fn type_label_describes_arrays() {
        assert_eq!(type_label(&json!({"type": "array", "items": {"type": "object"}})), "array of object");
        assert_eq!(type_label(&json!({"type": "object"})), "object");
    }
}
