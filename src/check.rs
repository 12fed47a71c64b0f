//! Post-build self-check
//!
//! Looks up every reference in the finished artifact against its `$defs`
//! namespace and optionally compiles the artifact as a draft 2020-12 schema.
//! Findings are diagnostics, never errors; whether they fail the run is the
//! caller's policy.

use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::alias::{split_def_ref, FragmentRef};
use crate::diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics};

const ROOT_SUBJECT: &str = "<root>";

/// Report dangling `#/$defs/...` and surviving cross-file references.
/// Returns the number of unresolved references found.
pub fn check_references(schema: &Value, diagnostics: &mut Diagnostics) -> usize {
    let empty = Map::new();
    let namespace = schema
        .get("$defs")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut findings: BTreeSet<(String, String, bool)> = BTreeSet::new();
    let mut scope: Vec<&Map<String, Value>> = Vec::new();

    if let Value::Object(root) = schema {
        for (key, value) in root {
            if key == "$defs" {
                continue;
            }
            walk(value, ROOT_SUBJECT, namespace, &mut scope, &mut findings);
        }
    }
    for (name, definition) in namespace {
        walk(definition, name, namespace, &mut scope, &mut findings);
    }

    for (subject, reference, external) in &findings {
        if *external {
            diagnostics.push(DiagnosticItem::new(
                subject.as_str(),
                DiagnosticCode::ExternalReference,
                format!("cross-file reference '{}' survived resolution", reference),
            ));
        } else {
            diagnostics.dangling(subject, reference);
        }
    }

    if findings.is_empty() {
        tracing::info!("all internal references resolved");
    }
    findings.len()
}

fn walk<'a>(
    value: &'a Value,
    subject: &str,
    namespace: &Map<String, Value>,
    scope: &mut Vec<&'a Map<String, Value>>,
    findings: &mut BTreeSet<(String, String, bool)>,
) {
    match value {
        Value::Object(map) => {
            let local = map.get("$defs").and_then(Value::as_object);
            if let Some(local) = local {
                scope.push(local);
            }

            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if let Some(external) = classify_unresolved(reference, namespace, scope) {
                    findings.insert((subject.to_owned(), reference.to_owned(), external));
                }
            }
            for child in map.values() {
                walk(child, subject, namespace, scope, findings);
            }

            if local.is_some() {
                scope.pop();
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, subject, namespace, scope, findings);
            }
        }
        _ => {}
    }
}

/// `None` when the reference resolves; `Some(true)` for a surviving
/// cross-file reference, `Some(false)` for a dangling internal one
fn classify_unresolved(
    reference: &str,
    namespace: &Map<String, Value>,
    scope: &[&Map<String, Value>],
) -> Option<bool> {
    if let Some((name, _tail)) = split_def_ref(reference) {
        // sub-paths into an existing definition, or a name still owned by an
        // enclosing nested $defs, are left to the validator
        if namespace.contains_key(name) || scope.iter().any(|defs| defs.contains_key(name)) {
            return None;
        }
        return Some(false);
    }
    if FragmentRef::parse(reference).is_some() {
        return Some(true);
    }
    None
}

/// Compile the artifact with `jsonschema` (draft 2020-12). Records a
/// diagnostic and returns false when it does not compile.
pub fn compile_check(schema: &Value, diagnostics: &mut Diagnostics) -> bool {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft202012)
        .compile(schema)
        .map(|_| ())
        .map_err(|e| e.to_string());

    match compiled {
        Ok(()) => {
            tracing::debug!("artifact compiles as draft 2020-12");
            true
        }
        Err(message) => {
            diagnostics.push(DiagnosticItem::new(
                ROOT_SUBJECT,
                DiagnosticCode::SchemaCompile,
                format!("artifact does not compile: {}", message),
            ));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolved_references_pass() {
        let schema = json!({
            "then": {"$ref": "#/$defs/type-A"},
            "$defs": {
                "type-A": {"properties": {"b": {"$ref": "#/$defs/type-B"}}},
                "type-B": {"properties": {"x": {"$ref": "#/$defs/type-A/properties/b"}}}
            }
        });
        let mut diags = Diagnostics::new();
        assert_eq!(check_references(&schema, &mut diags), 0);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_dangling_and_external_references() {
        let schema = json!({
            "$defs": {
                "type-A": {"properties": {
                    "b": {"$ref": "#/$defs/type-Missing"},
                    "c": {"$ref": "../x/xSchema.json"},
                    "d": {"$ref": "#/$defs/type-Missing"}
                }}
            }
        });
        let mut diags = Diagnostics::new();
        assert_eq!(check_references(&schema, &mut diags), 2);
        assert_eq!(diags.with_code(DiagnosticCode::DanglingReference).count(), 1);
        assert_eq!(diags.with_code(DiagnosticCode::ExternalReference).count(), 1);
        assert_eq!(diags.unresolved_reference_count(), 2);
        assert_eq!(diags.all()[0].subject, "type-A");
    }

    #[test]
    fn test_names_owned_by_nested_defs_are_tolerated() {
        let schema = json!({
            "$defs": {
                "type-A": {"properties": {
                    "inlined": {
                        "$defs": {"Local": {"type": "string"}},
                        "properties": {"v": {"$ref": "#/$defs/Local"}}
                    },
                    "outside": {"$ref": "#/$defs/Local"}
                }}
            }
        });
        let mut diags = Diagnostics::new();
        assert_eq!(check_references(&schema, &mut diags), 1);
    }

    #[test]
    fn test_compile_check() {
        let mut diags = Diagnostics::new();
        assert!(compile_check(&json!({"type": "object", "$defs": {"a": {"type": "string"}}}), &mut diags));
        assert!(!compile_check(&json!({"type": 12}), &mut diags));
        assert_eq!(diags.with_code(DiagnosticCode::SchemaCompile).count(), 1);
    }
}
