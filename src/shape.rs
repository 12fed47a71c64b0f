//! Schema Node Shapes
//!
//! Closed classification of schema nodes and keywords. Every tree transform
//! in the pipeline (resolve, flatten, inject, promote) matches exhaustively
//! on these variants instead of probing raw JSON.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::alias::{def_ref, split_def_ref};

// =============================================================================
// Keywords
// =============================================================================

/// How a schema keyword holds its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `$ref`
    Reference,
    /// `$defs` / `definitions` - named sub-definitions
    Definitions,
    /// `properties`, `patternProperties`, `dependentSchemas` - name -> schema
    Properties,
    /// A single sub-schema (`items`, `not`, `if`, ...). Legacy tuple `items` may be a list.
    Subschema,
    /// Logical combinators and `prefixItems` - a list of sub-schemas
    SubschemaList,
    /// Anything else (`type`, `const`, `enum`, `description`, ...) - never walked
    Literal,
}

/// Classify a keyword by name
pub fn keyword(name: &str) -> Keyword {
    match name {
        "$ref" => Keyword::Reference,
        "$defs" | "definitions" => Keyword::Definitions,
        "properties" | "patternProperties" | "dependentSchemas" => Keyword::Properties,
        "items" | "additionalItems" | "additionalProperties" | "unevaluatedItems"
        | "unevaluatedProperties" | "propertyNames" | "contains" | "not" | "if" | "then"
        | "else" => Keyword::Subschema,
        "allOf" | "anyOf" | "oneOf" | "prefixItems" => Keyword::SubschemaList,
        _ => Keyword::Literal,
    }
}

/// Logical combinator keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    AllOf,
    AnyOf,
    OneOf,
}

impl Combinator {
    pub fn key(&self) -> &'static str {
        match self {
            Self::AllOf => "allOf",
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
        }
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// Shape of a node in schema position
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// Exactly `{"$ref": "..."}` and nothing else
    Reference(&'a str),
    /// Any other object schema
    Schema(&'a Map<String, Value>),
    /// `true` / `false` schemas and stray scalars or arrays
    Literal(&'a Value),
}

/// Classify a node in schema position
pub fn classify(value: &Value) -> Node<'_> {
    match value {
        Value::Object(map) => match bare_ref(map) {
            Some(target) => Node::Reference(target),
            None => Node::Schema(map),
        },
        other => Node::Literal(other),
    }
}

/// The target of an object that is exactly `{"$ref": "..."}`
pub fn bare_ref(map: &Map<String, Value>) -> Option<&str> {
    if map.len() == 1 {
        map.get("$ref").and_then(Value::as_str)
    } else {
        None
    }
}

/// The `$ref` of a node, with or without siblings
pub fn ref_of(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

// =============================================================================
// Traversal
// =============================================================================

/// Every direct sub-schema of a schema object, in key order
pub fn subschemas_mut(map: &mut Map<String, Value>) -> Vec<&mut Value> {
    let mut out = Vec::new();
    for (key, value) in map.iter_mut() {
        match keyword(key) {
            Keyword::Reference | Keyword::Literal => {}
            Keyword::Definitions | Keyword::Properties => {
                if let Value::Object(entries) = value {
                    out.extend(entries.values_mut());
                }
            }
            Keyword::Subschema => match value {
                Value::Array(items) => out.extend(items.iter_mut()),
                other => out.push(other),
            },
            Keyword::SubschemaList => {
                if let Value::Array(items) = value {
                    out.extend(items.iter_mut());
                }
            }
        }
    }
    out
}

/// Rewrite `#/$defs/<old>` references according to `mapping` (old -> new name).
///
/// Sub-path references (`#/$defs/<old>/properties/x`) keep their tail. A
/// sub-tree that declares its own `$defs` entry for a name shadows that name:
/// references inside it are left alone. Returns the number of references
/// rewritten.
pub fn rewrite_refs(value: &mut Value, mapping: &BTreeMap<String, String>) -> usize {
    if mapping.is_empty() {
        return 0;
    }
    let map = match value {
        Value::Object(map) => map,
        Value::Array(items) => {
            return items.iter_mut().map(|item| rewrite_refs(item, mapping)).sum();
        }
        _ => return 0,
    };

    let shadowed: Vec<&String> = match map.get("$defs").and_then(Value::as_object) {
        Some(defs) => mapping.keys().filter(|name| defs.contains_key(*name)).collect(),
        None => Vec::new(),
    };
    let scoped;
    let mapping = if shadowed.is_empty() {
        mapping
    } else {
        scoped = mapping
            .iter()
            .filter(|(name, _)| !shadowed.contains(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>();
        &scoped
    };

    let mut rewritten = 0;
    if let Some(Value::String(reference)) = map.get_mut("$ref") {
        if let Some((name, tail)) = split_def_ref(reference) {
            if let Some(target) = mapping.get(name) {
                *reference = format!("{}{}", def_ref(target), tail);
                rewritten += 1;
            }
        }
    }

    for child in subschemas_mut(map) {
        rewritten += rewrite_refs(child, mapping);
    }
    rewritten
}

/// Collect every `$ref` string anywhere in a document, in document order
pub fn collect_refs(value: &Value) -> Vec<&str> {
    let mut refs = Vec::new();
    collect_refs_into(value, &mut refs);
    refs
}

fn collect_refs_into<'a>(value: &'a Value, refs: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                refs.push(reference);
            }
            for child in map.values() {
                collect_refs_into(child, refs);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs_into(item, refs);
            }
        }
        _ => {}
    }
}
