//! Type Builders
//!
//! One builder per named concept. A builder loads and resolves one or more
//! fragments through a [`BuildContext`], composes them, and applies its
//! concept-specific edits. [`build_types`] runs a list of builders and
//! finalizes every output the same way.

pub mod cdif;
pub mod compose;

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

use crate::alias::AliasTable;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::flatten::flatten_local_redirects;
use crate::resolve::Resolver;
use crate::store::FragmentStore;

/// Signature of a type builder
pub type BuildFn = fn(&mut BuildContext<'_>) -> Result<Value>;

/// A named type definition and the procedure that produces it
#[derive(Clone, Copy)]
pub struct TypeBuilder {
    pub name: &'static str,
    pub build: BuildFn,
}

impl TypeBuilder {
    pub const fn new(name: &'static str, build: BuildFn) -> Self {
        Self { name, build }
    }
}

impl std::fmt::Debug for TypeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeBuilder").field("name", &self.name).finish()
    }
}

/// Everything a builder may touch: the fragment store, the alias table, and
/// the run's diagnostics
pub struct BuildContext<'a> {
    store: &'a mut FragmentStore,
    aliases: &'a AliasTable,
    diagnostics: &'a mut Diagnostics,
    type_names: &'a BTreeSet<String>,
    max_depth: usize,
    subject: String,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        store: &'a mut FragmentStore,
        aliases: &'a AliasTable,
        diagnostics: &'a mut Diagnostics,
        type_names: &'a BTreeSet<String>,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            aliases,
            diagnostics,
            type_names,
            max_depth,
            subject: String::new(),
        }
    }

    /// Name of the type definition currently being built
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Is `name` one of the type definitions this run produces?
    pub fn is_type(&self, name: &str) -> bool {
        self.type_names.contains(name)
    }

    /// Does a fragment exist at `rel_path`?
    pub fn exists(&self, rel_path: &str) -> bool {
        self.store.exists(rel_path)
    }

    /// Load a fragment as-is, minus its `$schema` declaration
    pub fn raw(&mut self, rel_path: &str) -> Result<Value> {
        let mut fragment = self.store.load(rel_path)?;
        compose::strip_schema_key(&mut fragment);
        Ok(fragment)
    }

    /// Load a fragment and resolve its cross-file references relative to
    /// the fragment's own directory
    pub fn resolved(&mut self, rel_path: &str) -> Result<Value> {
        let fragment = self.raw(rel_path)?;
        let base = match Path::new(rel_path).parent() {
            Some(dir) => self.store.root().join(dir),
            None => self.store.root().to_path_buf(),
        };
        Resolver::new(&mut *self.store, self.aliases, &mut *self.diagnostics, self.max_depth)
            .with_subject(self.subject.as_str())
            .resolve(fragment, &base)
    }

    /// Collapse local `$defs` redirects onto canonical type definitions
    pub fn flatten(&self, schema: &mut Value) -> usize {
        flatten_local_redirects(schema, |name| self.is_type(name))
    }
}

/// Run every builder in order and finalize each output. Fatal errors from
/// any builder abort the whole run.
pub fn build_types(
    builders: &[TypeBuilder],
    store: &mut FragmentStore,
    aliases: &AliasTable,
    diagnostics: &mut Diagnostics,
    max_depth: usize,
) -> Result<Map<String, Value>> {
    let type_names: BTreeSet<String> = builders.iter().map(|b| b.name.to_owned()).collect();
    let mut ctx = BuildContext::new(store, aliases, diagnostics, &type_names, max_depth);
    let mut definitions = Map::new();

    for builder in builders {
        ctx.subject = builder.name.to_owned();
        let mut definition = (builder.build)(&mut ctx)?;
        compose::finalize(&mut definition);
        tracing::info!(name = builder.name, "built type definition");
        definitions.insert(builder.name.to_owned(), definition);
    }

    Ok(definitions)
}
