//! Reference Resolver
//!
//! Depth-first walk over a fragment that removes cross-file references:
//! a reference to a known reusable building block becomes a reference to its
//! canonical type definition, anything else is loaded and inlined in place.
//! Inlining is bounded; past the bound the raw reference is left as-is and
//! a diagnostic is recorded.

use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

use crate::alias::{def_ref, def_ref_value, AliasTable, FragmentRef};
use crate::diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics};
use crate::error::Result;
use crate::shape::{bare_ref, classify, keyword, Keyword, Node};
use crate::store::FragmentStore;

/// Default bound on nested fragment inlinings
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// How one entry of a `$defs` container is handled
#[derive(Debug, Clone, PartialEq, Eq)]
enum DefinitionEntry {
    /// Bare reference to an aliased fragment: becomes a canonical type reference
    AliasRedirect(String),
    /// Bare reference to an unaliased fragment: inlined
    Inlinable(String),
    /// Already local content: walked
    Local,
}

/// Resolves cross-file references against a [`FragmentStore`] and an [`AliasTable`]
pub struct Resolver<'a> {
    store: &'a mut FragmentStore,
    aliases: &'a AliasTable,
    diagnostics: &'a mut Diagnostics,
    max_depth: usize,
    subject: String,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a mut FragmentStore,
        aliases: &'a AliasTable,
        diagnostics: &'a mut Diagnostics,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            aliases,
            diagnostics,
            max_depth,
            subject: String::from("<fragment>"),
        }
    }

    /// Name diagnostics after the type definition being built
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Resolve every cross-file reference in `fragment`, relative to `base_dir`
    pub fn resolve(&mut self, mut fragment: Value, base_dir: &Path) -> Result<Value> {
        self.resolve_node(&mut fragment, base_dir, 0)?;
        Ok(fragment)
    }

    fn resolve_node(&mut self, node: &mut Value, base: &Path, depth: usize) -> Result<()> {
        let target = match classify(node) {
            Node::Reference(target) => target.to_owned(),
            Node::Schema(_) => {
                if let Value::Object(map) = node {
                    self.resolve_schema(map, base, depth)?;
                }
                return Ok(());
            }
            Node::Literal(_) => return Ok(()),
        };

        if let Some(replacement) = self.resolve_reference(&target, base, depth)? {
            *node = replacement;
        }
        Ok(())
    }

    fn resolve_schema(&mut self, map: &mut Map<String, Value>, base: &Path, depth: usize) -> Result<()> {
        // already resolved against its own directory; kept out of the walk below
        let inlined = self.resolve_sibling_ref(map, base, depth)?;

        for (key, value) in map.iter_mut() {
            match keyword(key) {
                Keyword::Reference | Keyword::Literal => {}
                Keyword::Definitions => {
                    if let Value::Object(defs) = value {
                        for definition in defs.values_mut() {
                            self.resolve_definition(definition, base, depth)?;
                        }
                    }
                }
                Keyword::Properties => {
                    if let Value::Object(entries) = value {
                        for entry in entries.values_mut() {
                            self.resolve_node(entry, base, depth)?;
                        }
                    }
                }
                Keyword::Subschema => match value {
                    Value::Array(items) => {
                        for item in items {
                            self.resolve_node(item, base, depth)?;
                        }
                    }
                    other => self.resolve_node(other, base, depth)?,
                },
                Keyword::SubschemaList => {
                    if let Value::Array(items) = value {
                        for item in items {
                            self.resolve_node(item, base, depth)?;
                        }
                    }
                }
            }
        }

        if let Some(inlined) = inlined {
            match map.get_mut("allOf") {
                Some(Value::Array(members)) => members.insert(0, inlined),
                _ => {
                    map.insert("allOf".into(), Value::Array(vec![inlined]));
                }
            }
        }
        Ok(())
    }

    /// A `$ref` that sits next to other keywords. Aliased targets are rewritten
    /// in place; anything else is removed and returned, fully resolved, to be
    /// added as an extra `allOf` member.
    fn resolve_sibling_ref(
        &mut self,
        map: &mut Map<String, Value>,
        base: &Path,
        depth: usize,
    ) -> Result<Option<Value>> {
        let Some(target) = map.get("$ref").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(None);
        };
        let Some(fragment) = FragmentRef::parse(&target) else {
            return Ok(None);
        };

        if let Some(canonical) = self.aliases.lookup(&fragment) {
            map.insert("$ref".into(), Value::String(def_ref(canonical)));
            return Ok(None);
        }

        let inlined = self.inline(&fragment, &target, base, depth)?;
        if inlined.is_some() {
            map.remove("$ref");
        }
        Ok(inlined)
    }

    fn classify_definition(&self, definition: &Value) -> DefinitionEntry {
        let Node::Reference(target) = classify(definition) else {
            return DefinitionEntry::Local;
        };
        match FragmentRef::parse(target) {
            Some(fragment) => match self.aliases.lookup(&fragment) {
                Some(canonical) => DefinitionEntry::AliasRedirect(canonical.to_owned()),
                None => DefinitionEntry::Inlinable(target.to_owned()),
            },
            None => DefinitionEntry::Local,
        }
    }

    fn resolve_definition(&mut self, definition: &mut Value, base: &Path, depth: usize) -> Result<()> {
        match self.classify_definition(definition) {
            DefinitionEntry::AliasRedirect(canonical) => {
                *definition = def_ref_value(&canonical);
            }
            DefinitionEntry::Inlinable(target) => {
                if let Some(fragment) = FragmentRef::parse(&target) {
                    if let Some(inlined) = self.inline(&fragment, &target, base, depth)? {
                        *definition = inlined;
                    }
                }
            }
            DefinitionEntry::Local => self.resolve_node(definition, base, depth)?,
        }
        Ok(())
    }

    /// Replacement for a bare reference, or `None` to leave it untouched
    fn resolve_reference(&mut self, target: &str, base: &Path, depth: usize) -> Result<Option<Value>> {
        let Some(fragment) = FragmentRef::parse(target) else {
            return Ok(None);
        };

        if let Some(canonical) = self.aliases.lookup(&fragment) {
            tracing::debug!(reference = target, canonical, "alias hit");
            return Ok(Some(def_ref_value(canonical)));
        }

        self.inline(&fragment, target, base, depth)
    }

    /// Load and recursively resolve a fragment (or a pointer into one)
    fn inline(
        &mut self,
        fragment: &FragmentRef<'_>,
        target: &str,
        base: &Path,
        depth: usize,
    ) -> Result<Option<Value>> {
        if depth >= self.max_depth {
            self.diagnostics.depth_exceeded(&self.subject, target, self.max_depth);
            return Ok(None);
        }

        let path = normalize(&base.join(fragment.file));
        if !path.is_file() {
            self.diagnostics.missing_target(&self.subject, target, &path);
            return Ok(None);
        }

        let loaded = self.store.load_path(&path)?;
        self.diagnostics.push(DiagnosticItem::new(
            self.subject.as_str(),
            DiagnosticCode::AliasMiss,
            format!("no alias for '{}', inlined", fragment.file_name()),
        ));

        let mut content = match fragment.pointer {
            None => loaded,
            Some(pointer) => match loaded.pointer(pointer) {
                Some(found) => found.clone(),
                None => {
                    self.diagnostics.push(
                        DiagnosticItem::new(
                            self.subject.as_str(),
                            DiagnosticCode::MissingPointer,
                            format!("pointer '{}' not found in '{}'", pointer, fragment.file),
                        )
                        .with_context(format!("$ref: {}", target)),
                    );
                    return Ok(None);
                }
            },
        };

        if let Some(map) = content.as_object_mut() {
            map.remove("$schema");
        }

        let child_base = path.parent().unwrap_or(base).to_path_buf();
        self.resolve_node(&mut content, &child_base, depth + 1)?;
        Ok(Some(content))
    }
}

/// Fold `.` and `..` components lexically, so a path through a directory
/// that does not exist still names its target
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Convenience: a bare `{"$ref": ...}` whose target is a cross-file fragment
pub fn is_bare_fragment_ref(value: &Value) -> bool {
    value
        .as_object()
        .and_then(bare_ref)
        .map(|target| FragmentRef::parse(target).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn tree(files: &[(&str, Value)]) -> (tempfile::TempDir, FragmentStore) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, serde_json::to_string(content).unwrap()).unwrap();
        }
        let store = FragmentStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn aliases() -> AliasTable {
        AliasTable::new().with_fragment("b", "type-B")
    }

    #[test]
    fn test_alias_hit_becomes_type_reference() {
        let (_dir, mut store) = tree(&[("b/bSchema.json", json!({"type": "object"}))]);
        let aliases = aliases();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({"properties": {"rel": {"$ref": "../b/bSchema.json"}}});
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(resolved["properties"]["rel"], json!({"$ref": "#/$defs/type-B"}));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_alias_miss_inlines_recursively() {
        let (_dir, mut store) = tree(&[
            ("c/cSchema.json", json!({"type": "object", "properties": {"b": {"$ref": "../b/bSchema.json"}}})),
            ("b/bSchema.json", json!({})),
        ]);
        let aliases = aliases();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({"anyOf": [{"$ref": "../c/cSchema.json"}, {"type": "string"}]});
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(
            resolved["anyOf"][0],
            json!({"type": "object", "properties": {"b": {"$ref": "#/$defs/type-B"}}})
        );
        assert_eq!(diags.with_code(DiagnosticCode::AliasMiss).count(), 1);
    }

    #[test]
    fn test_definitions_are_classified_per_entry() {
        let (_dir, mut store) = tree(&[
            ("b/bSchema.json", json!({})),
            ("d/dSchema.json", json!({"type": "string", "format": "uri"})),
        ]);
        let aliases = aliases();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({
            "$defs": {
                "B": {"$ref": "../b/bSchema.json"},
                "D": {"$ref": "../d/dSchema.json"},
                "local": {"items": {"$ref": "#/$defs/B"}}
            }
        });
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(resolved["$defs"]["B"], json!({"$ref": "#/$defs/type-B"}));
        assert_eq!(resolved["$defs"]["D"], json!({"type": "string", "format": "uri"}));
        assert_eq!(resolved["$defs"]["local"], json!({"items": {"$ref": "#/$defs/B"}}));
    }

    #[test]
    fn test_cycle_stops_at_depth_bound() {
        let (_dir, mut store) = tree(&[
            ("x/xSchema.json", json!({"properties": {"y": {"$ref": "../y/ySchema.json"}}})),
            ("y/ySchema.json", json!({"properties": {"x": {"$ref": "../x/xSchema.json"}}})),
        ]);
        let aliases = AliasTable::new();
        let mut diags = Diagnostics::new();
        let base = store.root().join("x");

        let fragment = json!({"$ref": "xSchema.json"});
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, 3)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(
            resolved["properties"]["y"]["properties"]["x"]["properties"]["y"],
            json!({"$ref": "../y/ySchema.json"})
        );
        assert_eq!(diags.with_code(DiagnosticCode::DepthExceeded).count(), 1);
    }

    #[test]
    fn test_missing_target_and_pointer_are_degraded() {
        let (_dir, mut store) = tree(&[("p/pSchema.json", json!({"$defs": {"Q": {"type": "integer"}}}))]);
        let aliases = AliasTable::new();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({
            "properties": {
                "gone": {"$ref": "../nowhere/nowhereSchema.json"},
                "q": {"$ref": "../p/pSchema.json#/$defs/Q"},
                "r": {"$ref": "../p/pSchema.json#/$defs/R"}
            }
        });
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(resolved["properties"]["gone"], json!({"$ref": "../nowhere/nowhereSchema.json"}));
        assert_eq!(resolved["properties"]["q"], json!({"type": "integer"}));
        assert_eq!(resolved["properties"]["r"], json!({"$ref": "../p/pSchema.json#/$defs/R"}));
        assert_eq!(diags.with_code(DiagnosticCode::MissingReferenceTarget).count(), 1);
        assert_eq!(diags.with_code(DiagnosticCode::MissingPointer).count(), 1);
    }

    #[test]
    fn test_sibling_ref() {
        let (_dir, mut store) = tree(&[("e/eSchema.json", json!({"type": "string"})), ("b/bSchema.json", json!({}))]);
        let aliases = aliases();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({
            "properties": {
                "b": {"$ref": "../b/bSchema.json", "description": "aliased"},
                "e": {"$ref": "../e/eSchema.json", "description": "inlined"}
            }
        });
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(resolved["properties"]["b"]["$ref"], "#/$defs/type-B");
        assert_eq!(
            resolved["properties"]["e"],
            json!({"description": "inlined", "allOf": [{"type": "string"}]})
        );
    }

    #[test]
    fn test_sibling_ref_content_resolves_against_its_own_directory() {
        let (_dir, mut store) = tree(&[
            ("deep/e/eSchema.json", json!({"$ref": "../w/wSchema.json"})),
            ("w/wSchema.json", json!({"type": "integer"})),
        ]);
        let aliases = AliasTable::new();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({"properties": {"e": {"$ref": "../deep/e/eSchema.json", "description": "d"}}});
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        // deep/w does not exist; the root-level w/ must not be picked up instead
        assert_eq!(
            resolved["properties"]["e"],
            json!({"description": "d", "allOf": [{"$ref": "../w/wSchema.json"}]})
        );
        assert_eq!(diags.with_code(DiagnosticCode::MissingReferenceTarget).count(), 1);
    }

    #[test]
    fn test_sibling_ref_missing_nested_target_is_reported_once() {
        let (_dir, mut store) = tree(&[("e/eSchema.json", json!({"$ref": "../nowhere/nowhereSchema.json"}))]);
        let aliases = AliasTable::new();
        let mut diags = Diagnostics::new();
        let base = store.root().join("a");

        let fragment = json!({"properties": {"e": {"$ref": "../e/eSchema.json", "description": "d"}}});
        let resolved = Resolver::new(&mut store, &aliases, &mut diags, DEFAULT_MAX_DEPTH)
            .resolve(fragment, &base)
            .unwrap();

        assert_eq!(
            resolved["properties"]["e"]["allOf"],
            json!([{"$ref": "../nowhere/nowhereSchema.json"}])
        );
        assert_eq!(diags.with_code(DiagnosticCode::MissingReferenceTarget).count(), 1);
        let missing = diags.with_code(DiagnosticCode::MissingReferenceTarget).next().unwrap();
        assert!(!missing.context[0].contains(".."), "{:?}", missing.context);
    }

    #[test]
    fn test_normalize_folds_parent_components() {
        assert_eq!(normalize(Path::new("/r/a/../b/./c.json")), PathBuf::from("/r/b/c.json"));
        assert_eq!(normalize(Path::new("/r/a/../../../x")), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("../a/../../b")), PathBuf::from("../../b"));
    }

    #[test]
    fn test_is_bare_fragment_ref() {
        assert!(is_bare_fragment_ref(&json!({"$ref": "xSchema.json"})));
        assert!(!is_bare_fragment_ref(&json!({"$ref": "#/$defs/x"})));
        assert!(!is_bare_fragment_ref(&json!({"$ref": "xSchema.json", "title": "t"})));
    }
}
