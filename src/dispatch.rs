//! Dispatch Assembler
//!
//! Builds the root of the artifact: a discriminated union over `@type`
//! (one `if/then/else` branch per registered tag) wrapped in the three
//! accepted document shapes, plus the bare-identifier definition.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::alias::{def_ref_value, ID_REFERENCE};

pub const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

pub const ROOT_OBJECT: &str = "root-object";
pub const ROOT_ARRAY: &str = "root-array";
pub const ROOT_GRAPH: &str = "root-graph";

/// Names of the structural definitions added next to the type definitions
pub const ENVELOPE_DEFINITIONS: [&str; 4] = [ROOT_OBJECT, ROOT_ARRAY, ROOT_GRAPH, ID_REFERENCE];

/// One `(type tag, definition name)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEntry {
    pub tag: String,
    pub definition: String,
}

/// Ordered dispatch entries. Specific building blocks come before the
/// composite wrappers that include them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: impl Into<String>, definition: impl Into<String>) -> Self {
        self.entries.push(DispatchEntry {
            tag: tag.into(),
            definition: definition.into(),
        });
        self
    }

    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Definition name registered for `tag`, if any
    pub fn definition_for(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| e.definition.as_str())
    }

    /// The CDIF dispatch table: every tag maps to `type-<local name>`
    pub fn cdif() -> Self {
        const TAGS: [&str; 24] = [
            "cdi:StructuredDataSet",
            "cdi:TabularTextDataSet",
            "cdi:LongStructureDataSet",
            "cdi:InstanceVariable",
            "cdi:Identifier",
            "dcat:CatalogRecord",
            "schema:Dataset",
            "schema:Person",
            "schema:Organization",
            "schema:PropertyValue",
            "schema:DefinedTerm",
            "schema:CreativeWork",
            "schema:DataDownload",
            "schema:MediaObject",
            "schema:WebAPI",
            "schema:Action",
            "schema:HowTo",
            "schema:Place",
            "time:ProperInterval",
            "schema:MonetaryGrant",
            "schema:Role",
            "prov:Activity",
            "dqv:QualityMeasurement",
            "schema:Claim",
        ];
        TAGS.iter().fold(Self::new(), |table, tag| {
            let local = tag.split_once(':').map(|(_, local)| local).unwrap_or(tag);
            table.with(*tag, format!("type-{local}"))
        })
    }
}

/// Namespace prefixes a `root-graph` document's `@context` must declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPrefixes {
    pub prefixes: Vec<(String, String)>,
    pub required: Vec<String>,
}

impl ContextPrefixes {
    pub fn cdif() -> Self {
        let prefixes = [
            ("schema", "http://schema.org/"),
            ("dcterms", "http://purl.org/dc/terms/"),
            ("geosparql", "http://www.opengis.net/ont/geosparql#"),
            ("spdx", "http://spdx.org/rdf/terms#"),
            ("cdi", "http://ddialliance.org/Specification/DDI-CDI/1.0/RDF/"),
            ("csvw", "http://www.w3.org/ns/csvw#"),
            ("prov", "http://www.w3.org/ns/prov#"),
            ("dcat", "http://www.w3.org/ns/dcat#"),
            ("dqv", "http://www.w3.org/ns/dqv#"),
            ("time", "http://www.w3.org/2006/time#"),
        ];
        Self {
            prefixes: prefixes
                .iter()
                .map(|(p, iri)| (p.to_string(), iri.to_string()))
                .collect(),
            required: vec!["schema".into(), "dcterms".into()],
        }
    }

    /// Schema for the `@context` object
    pub fn to_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .prefixes
            .iter()
            .map(|(prefix, iri)| (prefix.clone(), json!({ "const": iri })))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "additionalProperties": true
        })
    }
}

/// `@type` equals `tag`, or is an array containing it
pub fn type_condition(tag: &str) -> Value {
    json!({
        "properties": {
            "@type": {
                "anyOf": [
                    { "const": tag },
                    { "type": "array", "contains": { "const": tag } }
                ]
            }
        }
    })
}

/// If the node carries the entry's tag it must satisfy the entry's
/// definition; otherwise the branch fails
pub fn dispatch_branch(entry: &DispatchEntry) -> Value {
    json!({
        "if": type_condition(&entry.tag),
        "then": def_ref_value(&entry.definition),
        "else": false
    })
}

pub fn root_object(table: &DispatchTable) -> Value {
    let branches: Vec<Value> = table.entries().iter().map(dispatch_branch).collect();
    json!({
        "type": "object",
        "required": ["@type"],
        "$comment": "Dispatch each graph node to its type-specific schema by @type value.",
        "anyOf": branches
    })
}

pub fn root_array() -> Value {
    json!({
        "type": "array",
        "items": def_ref_value(ROOT_OBJECT)
    })
}

pub fn root_graph(context: &ContextPrefixes) -> Value {
    json!({
        "type": "object",
        "required": ["@context", "@graph"],
        "properties": {
            "@context": context.to_schema(),
            "@graph": def_ref_value(ROOT_ARRAY)
        }
    })
}

/// `{"@id": "<string>"}` and nothing else
pub fn id_reference() -> Value {
    json!({
        "type": "object",
        "required": ["@id"],
        "properties": {
            "@id": { "type": "string" }
        },
        "additionalProperties": false
    })
}

/// Title and description placed on the root schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    pub title: String,
    pub description: String,
}

/// Assemble the root schema from the final definitions namespace
pub fn assemble(
    mut definitions: Map<String, Value>,
    table: &DispatchTable,
    context: &ContextPrefixes,
    metadata: &RootMetadata,
) -> Value {
    definitions.insert(ROOT_OBJECT.into(), root_object(table));
    definitions.insert(ROOT_ARRAY.into(), root_array());
    definitions.insert(ROOT_GRAPH.into(), root_graph(context));
    definitions.insert(ID_REFERENCE.into(), id_reference());

    tracing::info!(
        branches = table.len(),
        definitions = definitions.len(),
        "assembled dispatch schema"
    );

    json!({
        "$schema": JSON_SCHEMA_DIALECT,
        "title": metadata.title,
        "description": metadata.description,
        "if": { "type": "object" },
        "then": {
            "anyOf": [def_ref_value(ROOT_GRAPH), def_ref_value(ROOT_OBJECT)]
        },
        "else": def_ref_value(ROOT_ARRAY),
        "$defs": definitions
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdif_table_order_and_names() {
        let table = DispatchTable::cdif();
        assert_eq!(table.len(), 24);
        assert_eq!(table.entries()[0].tag, "cdi:StructuredDataSet");
        assert_eq!(table.entries()[0].definition, "type-StructuredDataSet");
        assert_eq!(table.definition_for("schema:Claim"), Some("type-Claim"));
        assert_eq!(table.definition_for("time:ProperInterval"), Some("type-ProperInterval"));
        assert_eq!(table.definition_for("schema:Thing"), None);
    }

    #[test]
    fn test_branch_shape() {
        let entry = DispatchEntry {
            tag: "schema:Person".into(),
            definition: "type-Person".into(),
        };
        let branch = dispatch_branch(&entry);
        assert_eq!(branch["then"], json!({"$ref": "#/$defs/type-Person"}));
        assert_eq!(branch["else"], json!(false));
        assert_eq!(
            branch["if"]["properties"]["@type"]["anyOf"][1]["contains"]["const"],
            "schema:Person"
        );
    }

    #[test]
    fn test_assemble_adds_envelopes() {
        let table = DispatchTable::new().with("ex:A", "type-A");
        let mut defs = Map::new();
        defs.insert("type-A".into(), json!({"type": "object"}));
        let meta = RootMetadata {
            title: "t".into(),
            description: "d".into(),
        };

        let schema = assemble(defs, &table, &ContextPrefixes::cdif(), &meta);

        assert_eq!(schema["$schema"], JSON_SCHEMA_DIALECT);
        for name in ENVELOPE_DEFINITIONS {
            assert!(schema["$defs"].get(name).is_some(), "missing {name}");
        }
        assert_eq!(schema["$defs"]["root-object"]["anyOf"].as_array().unwrap().len(), 1);
        assert_eq!(
            schema["$defs"]["root-graph"]["properties"]["@context"]["required"],
            json!(["schema", "dcterms"])
        );
        assert_eq!(schema["else"], json!({"$ref": "#/$defs/root-array"}));
    }
}
