//! Composition helpers shared by the type builders

use serde_json::{json, Map, Value};

use crate::alias::{def_ref_value, split_def_ref, ID_REFERENCE};
use crate::shape::ref_of;

// =============================================================================
// Composite definitions
// =============================================================================

/// A type definition assembled from several resolved fragments.
///
/// Property and `$defs` unions are last-writer-wins; `allOf` constraints
/// are concatenated in merge order.
#[derive(Debug, Clone)]
pub struct Composite {
    properties: Map<String, Value>,
    definitions: Map<String, Value>,
    constraints: Vec<Value>,
    extra: Map<String, Value>,
}

impl Composite {
    /// An empty `{"type": "object"}` definition
    pub fn object() -> Self {
        Self {
            properties: Map::new(),
            definitions: Map::new(),
            constraints: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Union in `source`'s properties; later merges win on key collision
    pub fn merge_properties(&mut self, source: &Value) -> &mut Self {
        if let Some(properties) = source.get("properties").and_then(Value::as_object) {
            for (name, shape) in properties {
                self.properties.insert(name.clone(), shape.clone());
            }
        }
        self
    }

    /// Union in `source`'s `$defs`
    pub fn merge_definitions(&mut self, source: &Value) -> &mut Self {
        if let Some(defs) = source.get("$defs").and_then(Value::as_object) {
            for (name, definition) in defs {
                self.definitions.insert(name.clone(), definition.clone());
            }
        }
        self
    }

    /// Append `source`'s `allOf` members, dropping references back to `owner`
    pub fn merge_constraints(&mut self, source: &Value, owner: &str) -> &mut Self {
        if let Some(members) = source.get("allOf").and_then(Value::as_array) {
            self.constraints.extend(
                members
                    .iter()
                    .filter(|m| !is_self_reference(m, owner))
                    .cloned(),
            );
        }
        self
    }

    /// Set one property, replacing whatever was merged under that name
    pub fn set_property(&mut self, name: &str, shape: Value) -> &mut Self {
        self.properties.insert(name.to_owned(), shape);
        self
    }

    /// Set any other top-level keyword
    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.extra.insert(key.to_owned(), value);
        self
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), json!("object"));
        map.insert("properties".into(), Value::Object(self.properties));
        if !self.constraints.is_empty() {
            map.insert("allOf".into(), Value::Array(self.constraints));
        }
        map.extend(self.extra);
        if !self.definitions.is_empty() {
            map.insert("$defs".into(), Value::Object(self.definitions));
        }
        Value::Object(map)
    }
}

/// Does `constraint` reference the type definition `owner` itself?
pub fn is_self_reference(constraint: &Value, owner: &str) -> bool {
    ref_of(constraint)
        .and_then(split_def_ref)
        .map(|(name, _)| name == owner)
        .unwrap_or(false)
}

// =============================================================================
// Shapes
// =============================================================================

/// `{"$ref": "#/$defs/<name>"}`
pub fn type_ref(name: &str) -> Value {
    def_ref_value(name)
}

/// `{"anyOf": [members..., id-reference]}`
pub fn alternatives(members: impl IntoIterator<Item = Value>) -> Value {
    let mut members: Vec<Value> = members.into_iter().collect();
    members.push(def_ref_value(ID_REFERENCE));
    json!({ "anyOf": members })
}

/// `{"type": "array", "items": items}`
pub fn array_of(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

/// `@type` shape requiring two co-occurring tags
pub fn two_tag_type(first: &str, second: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "allOf": [
            { "contains": { "const": first } },
            { "contains": { "const": second } }
        ]
    })
}

/// `@type` shape accepting exactly one tag
pub fn single_tag_type(tag: &str) -> Value {
    json!({ "type": "string", "const": tag })
}

// =============================================================================
// In-place edits
// =============================================================================

/// `properties` of an object definition, created if absent.
/// `None` when the definition is not an object.
pub fn properties_mut(schema: &mut Value) -> Option<&mut Map<String, Value>> {
    let map = schema.as_object_mut()?;
    let properties = map
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if !properties.is_object() {
        *properties = Value::Object(Map::new());
    }
    properties.as_object_mut()
}

/// Replace (or add) one property of an object definition
pub fn set_property(schema: &mut Value, name: &str, shape: Value) {
    if let Some(properties) = properties_mut(schema) {
        properties.insert(name.to_owned(), shape);
    }
}

/// Replace an existing property only; returns whether it existed
pub fn replace_property(schema: &mut Value, name: &str, shape: Value) -> bool {
    match schema.get_mut("properties").and_then(|p| p.get_mut(name)) {
        Some(slot) => {
            *slot = shape;
            true
        }
        None => false,
    }
}

/// Only the document root declares `$schema`
pub fn strip_schema_key(schema: &mut Value) {
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
    }
}

/// Remove the `@context` property and every `@context` requirement.
/// `@context` belongs on the graph envelope, never on a node.
pub fn strip_context(schema: &mut Value) {
    strip_context_at(schema);
    for key in ["allOf", "anyOf"] {
        if let Some(members) = schema.get_mut(key).and_then(Value::as_array_mut) {
            for member in members {
                strip_context_at(member);
            }
        }
    }
}

fn strip_context_at(schema: &mut Value) {
    let Some(map) = schema.as_object_mut() else {
        return;
    };
    if let Some(properties) = map.get_mut("properties").and_then(Value::as_object_mut) {
        properties.remove("@context");
    }
    let emptied = match map.get_mut("required").and_then(Value::as_array_mut) {
        Some(required) => {
            required.retain(|r| r != "@context");
            required.is_empty()
        }
        None => false,
    };
    if emptied {
        map.remove("required");
    }
}

/// Make sure nodes of this type may carry an `@id`. A definition whose root
/// is a disjunction of object variants gets it on each object variant.
pub fn ensure_identifier(schema: &mut Value) {
    let variants_only = schema.get("properties").is_none()
        && schema.get("type").and_then(Value::as_str) != Some("object")
        && schema
            .get("anyOf")
            .and_then(Value::as_array)
            .map(|variants| variants.iter().any(is_object_variant))
            .unwrap_or(false);

    if !variants_only {
        add_identifier(schema);
        return;
    }
    if let Some(variants) = schema.get_mut("anyOf").and_then(Value::as_array_mut) {
        for variant in variants.iter_mut().filter(|v| is_object_variant(&**v)) {
            add_identifier(variant);
        }
    }
}

fn is_object_variant(variant: &Value) -> bool {
    variant.get("type").and_then(Value::as_str) == Some("object")
}

fn add_identifier(schema: &mut Value) {
    if let Some(properties) = properties_mut(schema) {
        properties
            .entry("@id")
            .or_insert_with(|| json!({ "type": "string" }));
    }
}

/// Applied to every builder's output
pub fn finalize(schema: &mut Value) {
    strip_schema_key(schema);
    strip_context(schema);
    ensure_identifier(schema);
}
