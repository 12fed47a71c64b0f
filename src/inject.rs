//! Reference-Alternative Injector
//!
//! Flattened JSON-LD documents refer to related nodes by `{"@id": ...}`
//! instead of nesting them. Wherever a property expects a typed node, the
//! bare-identifier shape is added as one more acceptable alternative so the
//! same schema accepts both document styles.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::alias::{def_ref, split_def_ref, ID_REFERENCE};
use crate::shape::{bare_ref, keyword, ref_of, Combinator, Keyword};

/// What a property's value shape looks like, as far as injection cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyShape {
    /// `{"$ref": "#/$defs/<type>"}` (siblings allowed)
    TypeRef,
    /// `anyOf` / `oneOf` over sub-shapes
    Disjunction {
        kind: Combinator,
        has_type_ref: bool,
        has_id_ref: bool,
    },
    /// Array whose `items` may hold a type reference
    ArrayOf,
    /// Scalars, inline objects, everything else
    Other,
}

/// Adds id-reference alternatives to one type definition
pub struct Injector<F> {
    is_type: F,
    augmented: usize,
    /// Nested `$defs` names in scope, innermost last. `true` marks an entry
    /// that only redirects to a type definition.
    scopes: Vec<BTreeMap<String, bool>>,
}

impl<F: Fn(&str) -> bool> Injector<F> {
    /// `is_type` decides whether a root-level definition name is a type definition
    pub fn new(is_type: F) -> Self {
        Self {
            is_type,
            augmented: 0,
            scopes: Vec::new(),
        }
    }

    /// Walk a type definition, augmenting every relationship property.
    /// Returns how many value shapes were augmented.
    pub fn inject(&mut self, definition: &mut Value) -> usize {
        let before = self.augmented;
        self.walk(definition);
        self.augmented - before
    }

    fn is_type_ref(&self, value: &Value) -> bool {
        ref_of(value)
            .and_then(split_def_ref)
            .map(|(name, tail)| tail.is_empty() && self.names_type(name))
            .unwrap_or(false)
    }

    /// A nested definition shadows root names; redirects still count as types
    fn names_type(&self, name: &str) -> bool {
        match self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            Some(is_redirect) => *is_redirect,
            None => (self.is_type)(name),
        }
    }

    fn scope_of(&self, map: &Map<String, Value>) -> Option<BTreeMap<String, bool>> {
        let defs = map
            .iter()
            .filter(|(key, _)| keyword(key) == Keyword::Definitions)
            .find_map(|(_, value)| value.as_object())?;
        let mut scope: BTreeMap<String, bool> = defs.keys().map(|name| (name.clone(), false)).collect();
        // a redirect may point at another redirect in the same container
        loop {
            let mut changed = false;
            for (name, definition) in defs {
                if scope[name] {
                    continue;
                }
                let redirects = definition
                    .as_object()
                    .and_then(bare_ref)
                    .and_then(split_def_ref)
                    .map(|(target, tail)| {
                        tail.is_empty()
                            && target != name.as_str()
                            && match scope.get(target) {
                                Some(is_redirect) => *is_redirect,
                                None => self.names_type(target),
                            }
                    })
                    .unwrap_or(false);
                if redirects {
                    scope.insert(name.clone(), true);
                    changed = true;
                }
            }
            if !changed {
                return Some(scope);
            }
        }
    }

    fn classify(&self, prop: &Value) -> PropertyShape {
        if self.is_type_ref(prop) {
            return PropertyShape::TypeRef;
        }
        for kind in [Combinator::AnyOf, Combinator::OneOf] {
            if let Some(members) = prop.get(kind.key()).and_then(Value::as_array) {
                return PropertyShape::Disjunction {
                    kind,
                    has_type_ref: members.iter().any(|m| self.is_type_ref(m)),
                    has_id_ref: members.iter().any(is_id_ref),
                };
            }
        }
        if prop.get("items").map(Value::is_object).unwrap_or(false) {
            return PropertyShape::ArrayOf;
        }
        PropertyShape::Other
    }

    /// Add the bare-identifier alternative to a single property value shape
    fn augment(&mut self, prop: &mut Value) {
        match self.classify(prop) {
            PropertyShape::TypeRef => {
                let original = prop.take();
                *prop = json!({ "anyOf": [original, id_ref()] });
                self.augmented += 1;
            }
            PropertyShape::Disjunction {
                kind: Combinator::AnyOf,
                has_type_ref,
                has_id_ref,
            } => {
                let Some(members) = prop.get_mut("anyOf").and_then(Value::as_array_mut) else {
                    return;
                };
                if has_type_ref {
                    if !has_id_ref {
                        members.push(id_ref());
                        self.augmented += 1;
                    }
                } else {
                    for member in members.iter_mut() {
                        self.augment(member);
                    }
                }
            }
            PropertyShape::Disjunction {
                kind,
                has_type_ref,
                has_id_ref,
            } => {
                let Some(map) = prop.as_object_mut() else {
                    return;
                };
                if has_type_ref {
                    // oneOf would reject a node matching both a type and the bare shape
                    let Some(Value::Array(mut members)) = map.remove(kind.key()) else {
                        return;
                    };
                    if !has_id_ref {
                        members.push(id_ref());
                    }
                    map.insert("anyOf".into(), Value::Array(members));
                    self.augmented += 1;
                } else if let Some(Value::Array(members)) = map.get_mut(kind.key()) {
                    for member in members.iter_mut() {
                        self.augment(member);
                    }
                }
            }
            PropertyShape::ArrayOf => {
                if let Some(items) = prop.get_mut("items") {
                    self.augment(items);
                }
            }
            PropertyShape::Other => {}
        }
    }

    /// Visit every schema position below `schema`
    fn walk(&mut self, schema: &mut Value) {
        match schema {
            Value::Object(map) => self.walk_schema(map),
            Value::Array(items) => {
                for item in items {
                    self.walk(item);
                }
            }
            _ => {}
        }
    }

    fn walk_schema(&mut self, map: &mut Map<String, Value>) {
        let scope = self.scope_of(map);
        let scoped = scope.is_some();
        if let Some(scope) = scope {
            self.scopes.push(scope);
        }
        self.walk_entries(map);
        if scoped {
            self.scopes.pop();
        }
    }

    fn walk_entries(&mut self, map: &mut Map<String, Value>) {
        for (key, value) in map.iter_mut() {
            match keyword(key) {
                Keyword::Reference | Keyword::Literal => {}
                Keyword::Properties => {
                    let Value::Object(entries) = value else { continue };
                    for (name, prop) in entries.iter_mut() {
                        // @id, @type and @context are JSON-LD keywords, never relationships
                        if name.starts_with('@') {
                            continue;
                        }
                        if key == "properties" {
                            self.augment(prop);
                        }
                        self.walk(prop);
                    }
                }
                Keyword::Subschema => {
                    if key == "items" {
                        self.augment(value);
                    }
                    self.walk(value);
                }
                Keyword::Definitions => {
                    let Value::Object(entries) = value else { continue };
                    for definition in entries.values_mut() {
                        self.walk(definition);
                    }
                }
                Keyword::SubschemaList => self.walk(value),
            }
        }
    }
}

fn id_ref() -> Value {
    json!({ "$ref": def_ref(ID_REFERENCE) })
}

fn is_id_ref(value: &Value) -> bool {
    ref_of(value)
        .and_then(split_def_ref)
        .map(|(name, tail)| name == ID_REFERENCE && tail.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inject(mut schema: Value) -> Value {
        Injector::new(|name: &str| name.starts_with("type-")).inject(&mut schema);
        schema
    }

    #[test]
    fn test_direct_type_ref_is_wrapped() {
        let schema = inject(json!({"properties": {"rel": {"$ref": "#/$defs/type-B"}}}));
        assert_eq!(
            schema["properties"]["rel"],
            json!({"anyOf": [{"$ref": "#/$defs/type-B"}, {"$ref": "#/$defs/id-reference"}]})
        );
    }

    #[test]
    fn test_array_items_are_wrapped() {
        let schema = inject(json!({
            "properties": {"creators": {"type": "array", "items": {"$ref": "#/$defs/type-Person"}}}
        }));
        assert_eq!(
            schema["properties"]["creators"]["items"]["anyOf"][1],
            json!({"$ref": "#/$defs/id-reference"})
        );
    }

    #[test]
    fn test_existing_alternative_is_not_doubled() {
        let original = json!({
            "properties": {
                "publisher": {"anyOf": [
                    {"$ref": "#/$defs/type-Person"},
                    {"$ref": "#/$defs/id-reference"}
                ]}
            }
        });
        assert_eq!(inject(original.clone()), original);
    }

    #[test]
    fn test_anyof_with_type_ref_gains_alternative() {
        let schema = inject(json!({
            "properties": {"about": {"anyOf": [{"type": "string"}, {"$ref": "#/$defs/type-Thing"}]}}
        }));
        let members = schema["properties"]["about"]["anyOf"].as_array().unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[2], json!({"$ref": "#/$defs/id-reference"}));
    }

    #[test]
    fn test_oneof_with_type_ref_becomes_anyof() {
        let schema = inject(json!({
            "properties": {"agent": {"oneOf": [{"$ref": "#/$defs/type-Person"}, {"type": "string"}]}}
        }));
        let agent = &schema["properties"]["agent"];
        assert!(agent.get("oneOf").is_none());
        assert_eq!(agent["anyOf"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_disjunction_without_type_refs_is_recursed() {
        let schema = inject(json!({
            "properties": {
                "coverage": {"anyOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"$ref": "#/$defs/type-Place"}}
                ]}
            }
        }));
        assert_eq!(
            schema["properties"]["coverage"]["anyOf"][1]["items"]["anyOf"][1],
            json!({"$ref": "#/$defs/id-reference"})
        );
    }

    #[test]
    fn test_nested_and_keyword_properties() {
        let schema = inject(json!({
            "properties": {
                "@type": {"$ref": "#/$defs/type-Tag"},
                "step": {"type": "array", "items": {
                    "type": "object",
                    "properties": {"tool": {"$ref": "#/$defs/type-Tool"}}
                }}
            },
            "allOf": [{"properties": {"funder": {"$ref": "#/$defs/type-MonetaryGrant"}}}],
            "$defs": {"helper": {"properties": {"who": {"$ref": "#/$defs/type-Person"}}}}
        }));
        assert_eq!(schema["properties"]["@type"], json!({"$ref": "#/$defs/type-Tag"}));
        assert!(schema["properties"]["step"]["items"]["properties"]["tool"]["anyOf"].is_array());
        assert!(schema["allOf"][0]["properties"]["funder"]["anyOf"].is_array());
        assert!(schema["$defs"]["helper"]["properties"]["who"]["anyOf"].is_array());
    }

    #[test]
    fn test_local_redirects_count_as_type_refs() {
        let schema = inject(json!({
            "properties": {"object": {"type": "array", "items": {"$ref": "#/$defs/Variable"}}},
            "$defs": {
                "Variable": {"$ref": "#/$defs/type-InstanceVariable"},
                "Alias": {"$ref": "#/$defs/Variable"},
                "instrument": {
                    "properties": {
                        "id": {"$ref": "#/$defs/instrumentId"},
                        "alias": {"$ref": "#/$defs/Alias"},
                        "calibration": {"$ref": "#/$defs/calibration"}
                    },
                    "$defs": {
                        "instrumentId": {"$ref": "#/$defs/type-Identifier"},
                        "calibration": {"type": "object"}
                    }
                }
            }
        }));
        assert_eq!(
            schema["properties"]["object"]["items"],
            json!({"anyOf": [{"$ref": "#/$defs/Variable"}, {"$ref": "#/$defs/id-reference"}]})
        );
        let instrument = &schema["$defs"]["instrument"]["properties"];
        assert!(instrument["id"]["anyOf"].is_array());
        assert!(instrument["alias"]["anyOf"].is_array());
        assert_eq!(instrument["calibration"], json!({"$ref": "#/$defs/calibration"}));
        // redirect entries themselves are not properties
        assert_eq!(schema["$defs"]["Variable"], json!({"$ref": "#/$defs/type-InstanceVariable"}));
    }

    #[test]
    fn test_nested_definition_shadows_type_name() {
        let schema = inject(json!({
            "properties": {"a": {"$ref": "#/$defs/type-A"}},
            "$defs": {"type-A": {"type": "string"}}
        }));
        assert_eq!(schema["properties"]["a"], json!({"$ref": "#/$defs/type-A"}));
    }

    #[test]
    fn test_injection_is_idempotent() {
        let once = inject(json!({
            "properties": {
                "a": {"$ref": "#/$defs/type-A"},
                "b": {"items": {"$ref": "#/$defs/type-B"}},
                "c": {"oneOf": [{"$ref": "#/$defs/type-C"}]}
            }
        }));
        assert_eq!(inject(once.clone()), once);
    }
}
