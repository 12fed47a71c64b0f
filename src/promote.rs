//! Definition Promoter
//!
//! Hoists the `$defs` a type definition owns into the shared root namespace
//! under qualified names (`<owner>--<local>`), rewriting references as it
//! goes. Promoted definitions can own `$defs` of their own, so promotion runs
//! as passes over a worklist until no root definition owns any.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::alias::split_def_ref;
use crate::error::{BuildError, Result};
use crate::shape::{bare_ref, rewrite_refs};

/// Separator between owner and local name in a promoted definition's name
pub const QUALIFIER: &str = "--";

/// Old local name -> new root-level name, built per owner
pub type PromotionMapping = BTreeMap<String, String>;

/// What a promotion run did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionSummary {
    /// Passes over the worklist (0 when nothing owned nested definitions)
    pub passes: usize,
    /// Definitions hoisted to the root namespace
    pub promoted: usize,
    /// Nested redirects to existing root definitions, dropped instead of hoisted
    pub redirected: usize,
}

/// Qualified root-level name for `local` owned by `owner`
pub fn qualified_name(owner: &str, local: &str) -> String {
    format!("{owner}{QUALIFIER}{local}")
}

/// Promote every nested definition in `namespace` to the root.
///
/// Fails with [`BuildError::PromotionCollision`] if a qualified name is
/// already taken.
pub fn promote_definitions(namespace: &mut Map<String, Value>) -> Result<PromotionSummary> {
    let budget = nested_containers(namespace);
    let mut summary = PromotionSummary::default();
    let mut steps = 0usize;

    let mut pending: Vec<String> = owners(namespace, namespace.keys());
    while !pending.is_empty() {
        summary.passes += 1;
        let mut next = Vec::new();
        let mut promoted_this_pass = 0;

        for owner in pending {
            steps += 1;
            assert!(
                steps <= budget,
                "promotion did not converge: {steps} containers processed, only {budget} existed"
            );

            let (mapping, hoisted, redirected) = promote_owner(namespace, &owner)?;
            summary.redirected += redirected;
            promoted_this_pass += hoisted.len();
            tracing::debug!(owner = %owner, ?mapping, "promoted nested definitions");
            next.extend(owners(namespace, hoisted.iter()));
        }

        summary.promoted += promoted_this_pass;
        tracing::info!(
            pass = summary.passes,
            promoted = promoted_this_pass,
            "promotion pass complete"
        );
        if promoted_this_pass == 0 {
            break;
        }
        pending = next;
    }

    Ok(summary)
}

/// Promote one owner's `$defs`. Returns the mapping applied, the names of
/// newly created root definitions, and how many redirects were dropped.
fn promote_owner(
    namespace: &mut Map<String, Value>,
    owner: &str,
) -> Result<(PromotionMapping, Vec<String>, usize)> {
    let Some(nested) = namespace
        .get_mut(owner)
        .and_then(Value::as_object_mut)
        .and_then(|map| map.remove("$defs"))
    else {
        return Ok((PromotionMapping::new(), Vec::new(), 0));
    };
    let Value::Object(nested) = nested else {
        return Ok((PromotionMapping::new(), Vec::new(), 0));
    };

    let mut mapping = PromotionMapping::new();
    let mut hoisted: Vec<(String, Value)> = Vec::new();
    let mut redirected = 0;

    for (local, definition) in nested.iter() {
        if let Some(target) = root_redirect(definition, &nested, namespace) {
            mapping.insert(local.clone(), target);
            redirected += 1;
            continue;
        }
        let qualified = qualified_name(owner, local);
        if namespace.contains_key(&qualified) {
            return Err(BuildError::PromotionCollision { name: qualified });
        }
        mapping.insert(local.clone(), qualified.clone());
        hoisted.push((qualified, definition.clone()));
    }

    if let Some(owner_def) = namespace.get_mut(owner) {
        rewrite_refs(owner_def, &mapping);
    }
    let mut names = Vec::with_capacity(hoisted.len());
    for (qualified, mut definition) in hoisted {
        rewrite_refs(&mut definition, &mapping);
        namespace.insert(qualified.clone(), definition);
        names.push(qualified);
    }
    Ok((mapping, names, redirected))
}

/// A nested definition that is only `{"$ref": "#/$defs/<root>"}`, where
/// `<root>` is an existing root definition and not a sibling
fn root_redirect(
    definition: &Value,
    siblings: &Map<String, Value>,
    namespace: &Map<String, Value>,
) -> Option<String> {
    let target = definition.as_object().and_then(bare_ref)?;
    match split_def_ref(target) {
        Some((name, "")) if !siblings.contains_key(name) && namespace.contains_key(name) => {
            Some(name.to_owned())
        }
        _ => None,
    }
}

/// Names among `candidates` whose definitions own a `$defs` container
fn owners<'a>(namespace: &Map<String, Value>, candidates: impl Iterator<Item = &'a String>) -> Vec<String> {
    candidates
        .filter(|name| owns_definitions(namespace.get(name.as_str())))
        .cloned()
        .collect()
}

fn owns_definitions(definition: Option<&Value>) -> bool {
    definition
        .and_then(|d| d.get("$defs"))
        .map(Value::is_object)
        .unwrap_or(false)
}

/// Upper bound on owner containers promotion can ever visit: every root
/// definition's `$defs`, and recursively the `$defs` of what they hold.
fn nested_containers(namespace: &Map<String, Value>) -> usize {
    fn count(definition: &Value) -> usize {
        match definition.get("$defs").and_then(Value::as_object) {
            Some(nested) => 1 + nested.values().map(count).sum::<usize>(),
            None => 0,
        }
    }
    namespace.values().map(count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn namespace(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_helper_is_promoted_and_references_rewritten() {
        let mut defs = namespace(json!({
            "C": {
                "properties": {
                    "a": {"$ref": "#/$defs/helper"},
                    "b": {"items": {"$ref": "#/$defs/helper"}}
                },
                "$defs": {"helper": {"type": "string"}}
            }
        }));

        let summary = promote_definitions(&mut defs).unwrap();

        assert_eq!(summary.promoted, 1);
        assert!(defs["C"].get("$defs").is_none());
        assert_eq!(defs["C--helper"], json!({"type": "string"}));
        assert_eq!(defs["C"]["properties"]["a"]["$ref"], "#/$defs/C--helper");
        assert_eq!(defs["C"]["properties"]["b"]["items"]["$ref"], "#/$defs/C--helper");
    }

    #[test]
    fn test_redirect_to_root_type_is_not_promoted() {
        let mut defs = namespace(json!({
            "type-Person": {"type": "object"},
            "type-Dataset": {
                "properties": {"creator": {"$ref": "#/$defs/Person"}},
                "$defs": {"Person": {"$ref": "#/$defs/type-Person"}}
            }
        }));

        let summary = promote_definitions(&mut defs).unwrap();

        assert_eq!(summary.redirected, 1);
        assert_eq!(summary.promoted, 0);
        assert!(!defs.contains_key("type-Dataset--Person"));
        assert_eq!(defs["type-Dataset"]["properties"]["creator"]["$ref"], "#/$defs/type-Person");
    }

    #[test]
    fn test_nested_definitions_take_multiple_passes() {
        let mut defs = namespace(json!({
            "type-Dataset": {
                "properties": {"gen": {"$ref": "#/$defs/activity"}},
                "$defs": {
                    "activity": {
                        "properties": {
                            "tool": {"$ref": "#/$defs/instrument"},
                            "sibling": {"$ref": "#/$defs/note"}
                        },
                        "$defs": {"instrument": {"type": "object"}}
                    },
                    "note": {"type": "string"}
                }
            }
        }));

        let summary = promote_definitions(&mut defs).unwrap();

        assert_eq!(summary.passes, 2);
        assert_eq!(summary.promoted, 3);
        let activity = &defs["type-Dataset--activity"];
        assert!(activity.get("$defs").is_none());
        assert_eq!(activity["properties"]["tool"]["$ref"], "#/$defs/type-Dataset--activity--instrument");
        assert_eq!(activity["properties"]["sibling"]["$ref"], "#/$defs/type-Dataset--note");
        assert!(defs.contains_key("type-Dataset--activity--instrument"));
        assert!(defs.values().all(|d| d.get("$defs").is_none()));
    }

    #[test]
    fn test_subpath_references_keep_their_tail() {
        let mut defs = namespace(json!({
            "C": {
                "properties": {"x": {"$ref": "#/$defs/helper/properties/name"}},
                "$defs": {"helper": {"properties": {"name": {"type": "string"}}}}
            }
        }));
        promote_definitions(&mut defs).unwrap();
        assert_eq!(defs["C"]["properties"]["x"]["$ref"], "#/$defs/C--helper/properties/name");
    }

    #[test]
    fn test_collision_is_an_error() {
        let mut defs = namespace(json!({
            "C--helper": {"type": "integer"},
            "C": {"$defs": {"helper": {"type": "string"}}}
        }));
        let err = promote_definitions(&mut defs).unwrap_err();
        assert!(matches!(err, BuildError::PromotionCollision { name } if name == "C--helper"));
    }

    #[test]
    fn test_nothing_to_promote() {
        let mut defs = namespace(json!({"type-A": {"type": "object"}}));
        let summary = promote_definitions(&mut defs).unwrap();
        assert_eq!(summary, PromotionSummary::default());
    }
}
