//! Alias Table and reference-string helpers
//!
//! Maps a building block's externally visible name (its file name or short
//! alias) to the canonical type definition that represents it. The table is
//! plain data owned by a [`crate::pipeline::Profile`], so several schema
//! variants can be built in one process without sharing state.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Prefix of every reference into the shared root namespace
pub const DEFS_PREFIX: &str = "#/$defs/";

/// Name of the bare-identifier shape (`{"@id": <string>}` only)
pub const ID_REFERENCE: &str = "id-reference";

/// Suffix that marks a file reference as a building-block fragment
const FRAGMENT_SUFFIX: &str = "Schema.json";

/// `#/$defs/<name>`
pub fn def_ref(name: &str) -> String {
    format!("{}{}", DEFS_PREFIX, name)
}

/// `{"$ref": "#/$defs/<name>"}`
pub fn def_ref_value(name: &str) -> Value {
    json!({ "$ref": def_ref(name) })
}

/// Split a root-namespace reference into its definition name and the
/// remaining pointer path (empty when the reference names the definition itself).
///
/// `#/$defs/type-Action/properties/x` -> `("type-Action", "/properties/x")`
pub fn split_def_ref(reference: &str) -> Option<(&str, &str)> {
    let rest = reference.strip_prefix(DEFS_PREFIX)?;
    let (name, tail) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    if name.is_empty() {
        None
    } else {
        Some((name, tail))
    }
}

// =============================================================================
// Fragment references
// =============================================================================

/// A parsed cross-file reference to a building-block fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRef<'a> {
    /// Relative file part, e.g. `../person/personSchema.json`
    pub file: &'a str,
    /// JSON pointer after `#`, if any (without the `#`)
    pub pointer: Option<&'a str>,
}

impl<'a> FragmentRef<'a> {
    /// Parse a `$ref` value. Returns `None` for local (`#...`) references and
    /// for files that are not building-block fragments.
    pub fn parse(reference: &'a str) -> Option<Self> {
        if reference.starts_with('#') {
            return None;
        }
        let (file, pointer) = match reference.split_once('#') {
            Some((file, pointer)) => (file, Some(pointer).filter(|p| !p.is_empty() && *p != "/")),
            None => (reference, None),
        };
        if !file.ends_with(FRAGMENT_SUFFIX) {
            return None;
        }
        Some(Self { file, pointer })
    }

    /// Base file name, e.g. `personSchema.json`
    pub fn file_name(&self) -> &'a str {
        self.file.rsplit('/').next().unwrap_or(self.file)
    }

    /// Short alias, e.g. `person`
    pub fn short_alias(&self) -> &'a str {
        let name = self.file_name();
        name.strip_suffix(FRAGMENT_SUFFIX).unwrap_or(name)
    }
}

/// True when `reference` points at a building-block fragment file
pub fn is_fragment_ref(reference: &str) -> bool {
    FragmentRef::parse(reference).is_some()
}

// =============================================================================
// Alias Table
// =============================================================================

/// Fixed alias -> canonical type name table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single alias
    pub fn insert(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.entries.insert(alias.into(), canonical.into());
    }

    /// Register a fragment under both its short alias and its file name
    pub fn with_fragment(mut self, short: &str, canonical: &str) -> Self {
        self.insert(short, canonical);
        self.insert(format!("{}{}", short, FRAGMENT_SUFFIX), canonical);
        self
    }

    /// Canonical type for a fragment reference (file name first, then short alias)
    pub fn lookup(&self, fragment: &FragmentRef<'_>) -> Option<&str> {
        self.entries
            .get(fragment.file_name())
            .or_else(|| self.entries.get(fragment.short_alias()))
            .map(String::as_str)
    }

    /// Canonical type for a raw name
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(String::as_str)
    }

    /// Every canonical type name an alias can produce
    pub fn canonical_names(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Alias table of the CDIF building blocks
    pub fn cdif() -> Self {
        Self::new()
            .with_fragment("person", "type-Person")
            .with_fragment("organization", "type-Organization")
            .with_fragment("identifier", "type-Identifier")
            .with_fragment("definedTerm", "type-DefinedTerm")
            .with_fragment("labeledLink", "type-CreativeWork")
            .with_fragment("dataDownload", "type-DataDownload")
            .with_fragment("webAPI", "type-WebAPI")
            .with_fragment("action", "type-Action")
            .with_fragment("spatialExtent", "type-Place")
            .with_fragment("temporalExtent", "type-ProperInterval")
            .with_fragment("funder", "type-MonetaryGrant")
            .with_fragment("agentInRole", "type-Role")
            .with_fragment("variableMeasured", "type-InstanceVariable")
            .with_fragment("cdifCatalogRecord", "type-CatalogRecord")
            .with_fragment("additionalProperty", "type-PropertyValue")
            .with_fragment("generatedBy", "type-Activity")
            .with_fragment("cdifProv", "type-Activity")
            // derivedFrom is a Dataset property, not a dispatch type of its own
            .with_fragment("derivedFrom", "type-Dataset")
            .with_fragment("qualityMeasure", "type-QualityMeasurement")
            .with_fragment("cdifDataCube", "type-StructuredDataSet")
            .with_fragment("cdifTabularData", "type-TabularTextDataSet")
            .with_fragment("cdifLongData", "type-LongStructureDataSet")
            .with_fragment("cdiVariableMeasured", "type-InstanceVariable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_ref() {
        let r = FragmentRef::parse("../person/personSchema.json").unwrap();
        assert_eq!(r.file_name(), "personSchema.json");
        assert_eq!(r.short_alias(), "person");
        assert_eq!(r.pointer, None);

        let r = FragmentRef::parse("instrumentSchema.json#/$defs/Identifier").unwrap();
        assert_eq!(r.file, "instrumentSchema.json");
        assert_eq!(r.pointer, Some("/$defs/Identifier"));

        assert!(FragmentRef::parse("#/$defs/type-Person").is_none());
        assert!(FragmentRef::parse("https://schema.org/geo.json").is_none());
    }

    #[test]
    fn test_split_def_ref() {
        assert_eq!(split_def_ref("#/$defs/type-Person"), Some(("type-Person", "")));
        assert_eq!(
            split_def_ref("#/$defs/type-Action/properties/x"),
            Some(("type-Action", "/properties/x"))
        );
        assert_eq!(split_def_ref("#/properties/x"), None);
        assert_eq!(split_def_ref("#/$defs/"), None);
    }

    #[test]
    fn test_lookup_by_file_name_or_short_alias() {
        let mut table = AliasTable::new();
        table.insert("instrument", "type-Instrument");
        let table = table.with_fragment("person", "type-Person");

        let person = FragmentRef::parse("../person/personSchema.json").unwrap();
        assert_eq!(table.lookup(&person), Some("type-Person"));

        let instrument = FragmentRef::parse("instrumentSchema.json").unwrap();
        assert_eq!(table.lookup(&instrument), Some("type-Instrument"));

        let other = FragmentRef::parse("otherSchema.json").unwrap();
        assert_eq!(table.lookup(&other), None);
    }

    #[test]
    fn test_cdif_table() {
        let table = AliasTable::cdif();
        assert_eq!(table.get("cdifProvSchema.json"), Some("type-Activity"));
        assert!(table.canonical_names().contains("type-StructuredDataSet"));
        assert_eq!(table.len(), 46);
    }
}
