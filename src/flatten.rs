//! Local-Redirect Flattener
//!
//! After resolution a fragment often keeps `$defs` entries like
//! `"Person": {"$ref": "#/$defs/type-Person"}`. These are removed and every
//! `#/$defs/Person` reference is pointed straight at the canonical type.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::alias::split_def_ref;
use crate::shape::{bare_ref, rewrite_refs};

/// Remove local definitions that only redirect to a canonical type, and
/// rewrite references to them. Returns the number of redirects removed.
///
/// `is_type` decides whether a root-level name is a canonical type definition.
pub fn flatten_local_redirects(schema: &mut Value, is_type: impl Fn(&str) -> bool) -> usize {
    let Some(defs) = schema.get_mut("$defs").and_then(Value::as_object_mut) else {
        return 0;
    };

    let redirects: BTreeMap<String, String> = defs
        .iter()
        .filter_map(|(name, definition)| {
            let target = definition.as_object().and_then(bare_ref)?;
            match split_def_ref(target) {
                Some((canonical, "")) if canonical != name.as_str() && is_type(canonical) => {
                    Some((name.clone(), canonical.to_owned()))
                }
                _ => None,
            }
        })
        .collect();

    if redirects.is_empty() {
        return 0;
    }

    for name in redirects.keys() {
        defs.remove(name);
    }
    let now_empty = defs.is_empty();
    if now_empty {
        if let Some(map) = schema.as_object_mut() {
            map.remove("$defs");
        }
    }

    rewrite_refs(schema, &redirects);
    redirects.len()
}
