//! The CDIF type catalogue
//!
//! Builders for the 24 type definitions of the CDIF flattened graph schema,
//! in the order they are built. Fragment paths are relative to the
//! building-block `_sources` directory.

use serde_json::{json, Value};

use super::compose::{
    alternatives, array_of, is_self_reference, replace_property, set_property, single_tag_type,
    strip_context, two_tag_type, type_ref, Composite,
};
use super::{BuildContext, TypeBuilder};
use crate::alias::{def_ref_value, ID_REFERENCE};
use crate::error::{BuildError, Result};

const PERSON: &str = "schemaorgProperties/person/personSchema.json";
const ORGANIZATION: &str = "schemaorgProperties/organization/organizationSchema.json";
const IDENTIFIER: &str = "schemaorgProperties/identifier/identifierSchema.json";
const DEFINED_TERM: &str = "schemaorgProperties/definedTerm/definedTermSchema.json";
const LABELED_LINK: &str = "schemaorgProperties/labeledLink/labeledLinkSchema.json";
const DATA_DOWNLOAD: &str = "schemaorgProperties/dataDownload/dataDownloadSchema.json";
const WEB_API: &str = "schemaorgProperties/webAPI/webAPISchema.json";
const ACTION: &str = "schemaorgProperties/action/actionSchema.json";
const SPATIAL_EXTENT: &str = "schemaorgProperties/spatialExtent/spatialExtentSchema.json";
const TEMPORAL_EXTENT: &str = "schemaorgProperties/temporalExtent/temporalExtentSchema.json";
const FUNDER: &str = "schemaorgProperties/funder/funderSchema.json";
const AGENT_IN_ROLE: &str = "schemaorgProperties/agentInRole/agentInRoleSchema.json";
const ADDITIONAL_PROPERTY: &str = "schemaorgProperties/additionalProperty/additionalPropertySchema.json";
const VARIABLE_MEASURED: &str = "schemaorgProperties/variableMeasured/variableMeasuredSchema.json";
const GENERATED_BY: &str = "provProperties/generatedBy/generatedBySchema.json";
const QUALITY_MEASURE: &str = "qualityProperties/qualityMeasure/qualityMeasureSchema.json";
const CDIF_PROV: &str = "cdifProperties/cdifProv/cdifProvSchema.json";
const CDI_VARIABLE_MEASURED: &str = "cdifProperties/cdifVariableMeasured/cdiVariableMeasuredSchema.json";
const CATALOG_RECORD: &str = "cdifProperties/cdifCatalogRecord/cdifCatalogRecordSchema.json";
const MANDATORY: &str = "cdifProperties/cdifMandatory/cdifMandatorySchema.json";
const OPTIONAL: &str = "cdifProperties/cdifOptional/cdifOptionalSchema.json";
const DATA_CUBE: &str = "cdifProperties/cdifDataCube/cdifDataCubeSchema.json";
const TABULAR_DATA: &str = "cdifProperties/cdifTabularData/cdifTabularDataSchema.json";
const LONG_DATA: &str = "cdifProperties/cdifLongData/cdifLongDataSchema.json";
const PHYSICAL_MAPPING: &str = "cdifProperties/cdifPhysicalMapping/cdifPhysicalMappingSchema.json";
const DATA_DESCRIPTION: &str = "profiles/cdifProfiles/CDIFDataDescription/CDIFDataDescriptionSchema.json";
const DATA_DESCRIPTION_LEGACY: &str = "profiles/CDIFDataDescription/CDIFDataDescriptionSchema.json";

/// Every CDIF builder, in build order
pub fn builders() -> Vec<TypeBuilder> {
    vec![
        TypeBuilder::new("type-Person", person),
        TypeBuilder::new("type-Organization", organization),
        TypeBuilder::new("type-Identifier", identifier),
        TypeBuilder::new("type-DefinedTerm", defined_term),
        TypeBuilder::new("type-CreativeWork", creative_work),
        TypeBuilder::new("type-DataDownload", data_download),
        TypeBuilder::new("type-MediaObject", media_object),
        TypeBuilder::new("type-WebAPI", web_api),
        TypeBuilder::new("type-Action", action),
        TypeBuilder::new("type-Place", place),
        TypeBuilder::new("type-ProperInterval", proper_interval),
        TypeBuilder::new("type-MonetaryGrant", monetary_grant),
        TypeBuilder::new("type-Role", role),
        TypeBuilder::new("type-Activity", activity),
        TypeBuilder::new("type-HowTo", how_to),
        TypeBuilder::new("type-Claim", claim),
        TypeBuilder::new("type-QualityMeasurement", quality_measurement),
        TypeBuilder::new("type-PropertyValue", property_value),
        TypeBuilder::new("type-InstanceVariable", instance_variable),
        TypeBuilder::new("type-CatalogRecord", catalog_record),
        TypeBuilder::new("type-Dataset", dataset),
        TypeBuilder::new("type-StructuredDataSet", structured_data_set),
        TypeBuilder::new("type-TabularTextDataSet", tabular_text_data_set),
        TypeBuilder::new("type-LongStructureDataSet", long_structure_data_set),
    ]
}

/// One fragment, resolved and flattened, no edits
fn single(ctx: &mut BuildContext<'_>, path: &str) -> Result<Value> {
    let mut schema = ctx.resolved(path)?;
    if !schema.is_object() {
        return Err(BuildError::InvalidFragment {
            path: path.to_owned(),
            reason: "fragment root is not an object".into(),
        });
    }
    ctx.flatten(&mut schema);
    Ok(schema)
}

fn id_reference() -> Value {
    def_ref_value(ID_REFERENCE)
}

// =============================================================================
// Single-fragment types
// =============================================================================

fn person(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, PERSON)
}

fn organization(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, ORGANIZATION)
}

fn defined_term(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, DEFINED_TERM)
}

fn creative_work(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, LABELED_LINK)
}

fn place(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, SPATIAL_EXTENT)
}

fn monetary_grant(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, FUNDER)
}

fn role(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, AGENT_IN_ROLE)
}

fn quality_measurement(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, QUALITY_MEASURE)
}

fn property_value(ctx: &mut BuildContext<'_>) -> Result<Value> {
    single(ctx, ADDITIONAL_PROPERTY)
}

// =============================================================================
// Single-fragment types with edits
// =============================================================================

/// Identifiers are typed both as a property value and a CDI identifier
fn identifier(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let mut schema = single(ctx, IDENTIFIER)?;
    set_property(&mut schema, "@type", two_tag_type("schema:PropertyValue", "cdi:Identifier"));
    Ok(schema)
}

/// Downloads may be archives listing their component files
fn data_download(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let mut schema = single(ctx, DATA_DOWNLOAD)?;
    set_property(
        &mut schema,
        "schema:hasPart",
        json!({
            "type": "array",
            "description": "Component files in an archive distribution.",
            "items": {
                "anyOf": [type_ref("type-MediaObject"), id_reference()]
            }
        }),
    );
    if schema.pointer("/properties/schema:description").is_none() {
        set_property(&mut schema, "schema:description", json!({ "type": "string" }));
    }
    Ok(schema)
}

fn web_api(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let mut schema = single(ctx, WEB_API)?;
    if let Some(action) = schema.pointer_mut("/properties/schema:potentialAction") {
        if let Some(items) = action.get_mut("items") {
            let original = items.take();
            *items = json!({ "anyOf": [original, id_reference()] });
        }
    }
    Ok(schema)
}

/// Actions keep their private `$defs` for promotion; the measured-variable
/// helper becomes a redirect to the canonical type
fn action(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let mut schema = ctx.resolved(ACTION)?;
    if let Some(defs) = schema.get_mut("$defs").and_then(Value::as_object_mut) {
        if defs.contains_key("VariableMeasured") {
            defs.insert("VariableMeasured".into(), type_ref("type-InstanceVariable"));
        }
    }
    Ok(schema)
}

/// Temporal extents are a disjunction of object variants and a string.
/// `@id` and `@context` handling happens per variant when finalized.
fn proper_interval(ctx: &mut BuildContext<'_>) -> Result<Value> {
    ctx.resolved(TEMPORAL_EXTENT)
}

fn catalog_record(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let mut schema = single(ctx, CATALOG_RECORD)?;
    set_property(&mut schema, "@type", single_tag_type("dcat:CatalogRecord"));
    Ok(schema)
}

// =============================================================================
// Composed types
// =============================================================================

/// The provenance extension when present, layered over the minimal
/// generatedBy activity
fn activity(ctx: &mut BuildContext<'_>) -> Result<Value> {
    if !ctx.exists(CDIF_PROV) {
        return single(ctx, GENERATED_BY);
    }

    let base = ctx.resolved(GENERATED_BY)?;
    let mut schema = single(ctx, CDIF_PROV)?;
    let owner = ctx.subject().to_owned();

    let mut properties = base
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let mut remaining = Vec::new();
    let members = match schema.as_object_mut().and_then(|map| map.remove("allOf")) {
        Some(Value::Array(members)) => members,
        _ => Vec::new(),
    };
    for member in members {
        match member.get("properties").and_then(Value::as_object) {
            Some(extension) => properties.extend(extension.clone()),
            None if is_self_reference(&member, &owner) => {}
            None => remaining.push(member),
        }
    }
    if let Some(own) = schema.get("properties").and_then(Value::as_object) {
        for (name, shape) in own {
            properties.entry(name.clone()).or_insert_with(|| shape.clone());
        }
    }

    if let Some(map) = schema.as_object_mut() {
        map.insert("properties".into(), Value::Object(properties));
        if !remaining.is_empty() {
            map.insert("allOf".into(), Value::Array(remaining));
        }
    }
    Ok(schema)
}

/// The measured-variable base merged with its CDI extension
fn instance_variable(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let cdi = ctx.resolved(CDI_VARIABLE_MEASURED)?;
    let base = ctx.resolved(VARIABLE_MEASURED)?;
    let owner = ctx.subject().to_owned();

    let mut composite = Composite::object();
    composite
        .merge_properties(&base)
        .merge_properties(&cdi)
        .merge_definitions(&base)
        .merge_definitions(&cdi)
        .merge_constraints(&base, &owner)
        .merge_constraints(&cdi, &owner);

    let mut schema = composite.into_value();
    ctx.flatten(&mut schema);
    Ok(schema)
}

/// Mandatory and optional dataset properties, with every relationship
/// rewritten to an explicit union for flattened graphs
fn dataset(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let mandatory = ctx.resolved(MANDATORY)?;
    let optional = ctx.resolved(OPTIONAL)?;
    let description_path = if ctx.exists(DATA_DESCRIPTION) {
        DATA_DESCRIPTION
    } else {
        DATA_DESCRIPTION_LEGACY
    };
    let data_description = ctx.resolved(description_path)?;
    let owner = ctx.subject().to_owned();

    let mut composite = Composite::object();
    composite
        .merge_properties(&mandatory)
        .merge_properties(&optional)
        .merge_definitions(&mandatory)
        .merge_definitions(&optional)
        .merge_constraints(&mandatory, &owner);

    let mut schema = composite.into_value();
    strip_context(&mut schema);
    ctx.flatten(&mut schema);

    if let Some(subject_of) = schema.pointer("/properties/schema:subjectOf").cloned() {
        if subject_of.get("$ref").is_some() {
            replace_property(&mut schema, "schema:subjectOf", alternatives([subject_of]));
        }
    }

    let mut distribution = array_of(alternatives([
        type_ref("type-DataDownload"),
        type_ref("type-WebAPI"),
        type_ref("type-StructuredDataSet"),
        type_ref("type-TabularTextDataSet"),
        type_ref("type-LongStructureDataSet"),
    ]));
    if let Some(text) = data_description
        .pointer("/properties/schema:distribution/description")
        .cloned()
    {
        distribution["description"] = text;
    }
    replace_property(&mut schema, "schema:distribution", distribution);

    let agents = || [type_ref("type-Person"), type_ref("type-Organization")];
    let string = || json!({ "type": "string" });

    replace_property(
        &mut schema,
        "schema:creator",
        json!({
            "type": "object",
            "properties": {
                "@list": array_of(alternatives(agents()))
            }
        }),
    );
    replace_property(
        &mut schema,
        "schema:contributor",
        array_of(alternatives([
            type_ref("type-Person"),
            type_ref("type-Organization"),
            type_ref("type-Role"),
        ])),
    );
    replace_property(&mut schema, "schema:publisher", alternatives(agents()));
    replace_property(&mut schema, "schema:provider", array_of(alternatives(agents())));

    for (name, target) in [
        ("schema:funding", "type-MonetaryGrant"),
        ("schema:variableMeasured", "type-InstanceVariable"),
        ("schema:spatialCoverage", "type-Place"),
        ("prov:wasGeneratedBy", "type-Activity"),
        ("dqv:hasQualityMeasurement", "type-QualityMeasurement"),
    ] {
        replace_property(&mut schema, name, array_of(alternatives([type_ref(target)])));
    }

    replace_property(
        &mut schema,
        "schema:temporalCoverage",
        array_of(alternatives([type_ref("type-ProperInterval"), string()])),
    );
    replace_property(
        &mut schema,
        "schema:identifier",
        alternatives([type_ref("type-Identifier"), string()]),
    );
    replace_property(
        &mut schema,
        "schema:sameAs",
        array_of(alternatives([type_ref("type-Identifier"), string()])),
    );
    replace_property(
        &mut schema,
        "schema:additionalType",
        array_of(alternatives([string(), type_ref("type-DefinedTerm")])),
    );
    replace_property(
        &mut schema,
        "schema:keywords",
        array_of(alternatives([type_ref("type-DefinedTerm"), string()])),
    );
    for name in [
        "prov:wasDerivedFrom",
        "schema:conditionsOfAccess",
        "schema:license",
        "schema:publishingPrinciples",
    ] {
        replace_property(
            &mut schema,
            name,
            array_of(alternatives([string(), type_ref("type-CreativeWork")])),
        );
    }

    Ok(schema)
}

/// How a composite data set inlines the physical mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhysicalMapping {
    /// Mapping items carry a `cdi:locator` into the structured payload
    WithLocator,
    Plain,
}

/// A download that is also a CDI data set: the download's properties, the
/// extension's properties, and an `@type` requiring both tags
fn data_set(
    ctx: &mut BuildContext<'_>,
    extension_path: &str,
    tag: &str,
    mapping: PhysicalMapping,
) -> Result<Value> {
    let download = ctx.resolved(DATA_DOWNLOAD)?;
    let extension = ctx.resolved(extension_path)?;
    let physical_mapping = ctx.resolved(PHYSICAL_MAPPING)?;

    let items = match mapping {
        PhysicalMapping::WithLocator => json!({
            "allOf": [
                physical_mapping,
                {
                    "type": "object",
                    "properties": {
                        "cdi:locator": {
                            "type": "string",
                            "description": "String that can be used by software to locate values of the variable in this physical dataset."
                        }
                    }
                }
            ]
        }),
        PhysicalMapping::Plain => physical_mapping,
    };

    let mut composite = Composite::object();
    composite
        .merge_properties(&download)
        .merge_properties(&extension)
        .set_property("@type", two_tag_type("schema:DataDownload", tag))
        .set_property(
            "cdi:hasPhysicalMapping",
            json!({
                "type": "array",
                "description": "Links variables to their physical representation in this dataset.",
                "items": items
            }),
        )
        .set("required", json!(["schema:contentUrl", "@type"]))
        .merge_definitions(&download);
    if extension_path == TABULAR_DATA {
        if let Some(one_of) = extension.get("oneOf") {
            composite.set("oneOf", one_of.clone());
        }
    }

    let mut schema = composite.into_value();
    ctx.flatten(&mut schema);
    Ok(schema)
}

fn structured_data_set(ctx: &mut BuildContext<'_>) -> Result<Value> {
    data_set(ctx, DATA_CUBE, "cdi:StructuredDataSet", PhysicalMapping::WithLocator)
}

/// Carries the delimited/fixed-width `oneOf` of the tabular extension
fn tabular_text_data_set(ctx: &mut BuildContext<'_>) -> Result<Value> {
    data_set(ctx, TABULAR_DATA, "cdi:TabularTextDataSet", PhysicalMapping::Plain)
}

fn long_structure_data_set(ctx: &mut BuildContext<'_>) -> Result<Value> {
    data_set(ctx, LONG_DATA, "cdi:LongStructureDataSet", PhysicalMapping::Plain)
}

// =============================================================================
// Hand-authored types
// =============================================================================

/// A component file inside an archive download. Never independently
/// accessible, so never tagged as a download itself.
fn media_object(ctx: &mut BuildContext<'_>) -> Result<Value> {
    let physical_mapping = ctx.resolved(PHYSICAL_MAPPING)?;

    Ok(json!({
        "type": "object",
        "description": "A component file within an archive distribution. Typed as schema:MediaObject (not DataDownload, since not independently accessible). May optionally include CDIF data description extensions (tabular data or data cube properties).",
        "properties": {
            "@id": {
                "type": "string",
                "description": "Identifier for this file, typically a hash-based anchor."
            },
            "@type": {
                "type": "array",
                "items": { "type": "string" },
                "contains": { "const": "schema:MediaObject" },
                "not": { "contains": { "const": "schema:DataDownload" } },
                "minItems": 1
            },
            "schema:name": {
                "type": "string",
                "description": "Filename of the component file within the archive."
            },
            "schema:description": { "type": "string" },
            "schema:encodingFormat": {
                "type": "array",
                "items": { "type": "string" }
            },
            "schema:size": {
                "type": "object",
                "properties": {
                    "@type": { "type": "string", "const": "schema:QuantitativeValue" },
                    "schema:value": { "type": "number" },
                    "schema:unitText": { "type": "string" }
                }
            },
            "schema:about": {
                "type": "array",
                "description": "For metadata sidecar files, references the data file this metadata describes.",
                "items": id_reference()
            },
            "spdx:checksum": {
                "type": "object",
                "properties": {
                    "spdx:algorithm": { "type": "string" },
                    "spdx:checksumValue": { "type": "string" }
                }
            },
            "cdi:arrayBase": { "type": "integer" },
            "csvw:commentPrefix": { "type": "string" },
            "csvw:delimiter": { "type": "string" },
            "csvw:header": { "type": "boolean" },
            "csvw:headerRowCount": { "type": "integer", "minimum": 0, "default": 1 },
            "cdi:isDelimited": { "type": "boolean" },
            "cdi:isFixedWidth": { "type": "boolean" },
            "csvw:lineTerminators": {
                "type": "string",
                "enum": ["CRLF", "LF", "\r\n", "\n"]
            },
            "csvw:quoteChar": { "type": "string", "default": "\"" },
            "csvw:skipBlankRows": { "type": "boolean", "default": false },
            "csvw:skipColumns": { "type": "integer", "default": 0 },
            "csvw:skipInitialSpace": { "type": "boolean", "default": true },
            "csvw:skipRows": { "type": "integer", "default": 0 },
            "countRows": { "type": "integer" },
            "countColumns": { "type": "integer" },
            "cdi:hasPhysicalMapping": {
                "type": "array",
                "description": "Links variables to their physical representation. Present when this component has tabular or structured data description.",
                "items": {
                    "allOf": [
                        physical_mapping,
                        {
                            "type": "object",
                            "properties": {
                                "cdi:locator": {
                                    "type": "string",
                                    "description": "String to locate values of the variable in a structured dataset."
                                }
                            }
                        }
                    ]
                }
            }
        },
        "required": ["@type", "schema:name", "schema:encodingFormat"]
    }))
}

fn how_to(_ctx: &mut BuildContext<'_>) -> Result<Value> {
    Ok(json!({
        "type": "object",
        "description": "A methodology or protocol described as a HowTo with optional steps.",
        "properties": {
            "@id": { "type": "string" },
            "@type": single_tag_type("schema:HowTo"),
            "schema:name": {
                "type": "string",
                "description": "Name of the methodology or protocol"
            },
            "schema:description": {
                "type": "string",
                "description": "Description of the methodology"
            },
            "schema:url": {
                "type": "string",
                "format": "uri",
                "description": "URL to a published methodology or protocol document"
            },
            "schema:step": {
                "type": "array",
                "description": "Ordered steps in this methodology",
                "items": {
                    "type": "object",
                    "properties": {
                        "@type": single_tag_type("schema:HowToStep"),
                        "schema:name": {
                            "type": "string",
                            "description": "Name of this step"
                        },
                        "schema:description": {
                            "type": "string",
                            "description": "Description of what this step involves"
                        },
                        "schema:url": { "type": "string", "format": "uri" },
                        "schema:position": {
                            "type": "integer",
                            "description": "Ordinal position of this step"
                        }
                    },
                    "required": ["@type", "schema:name"]
                }
            }
        },
        "required": ["@type"],
        "anyOf": [
            { "required": ["schema:name"] },
            { "required": ["schema:url"] }
        ]
    }))
}

fn claim(_ctx: &mut BuildContext<'_>) -> Result<Value> {
    Ok(json!({
        "type": "object",
        "description": "A statement or assertion, such as a quality claim about a dataset.",
        "properties": {
            "@id": { "type": "string" },
            "@type": single_tag_type("schema:Claim"),
            "schema:claimReviewed": {
                "type": "string",
                "description": "The claim being reviewed or asserted"
            },
            "schema:author": {
                "description": "Author of this claim",
                "anyOf": [type_ref("type-Person"), type_ref("type-Organization"), id_reference()]
            },
            "schema:datePublished": {
                "type": "string",
                "description": "ISO8601 date when this claim was published"
            },
            "schema:appearance": {
                "description": "Where this claim appears",
                "anyOf": [{ "type": "string" }, type_ref("type-CreativeWork"), id_reference()]
            }
        },
        "required": ["@type", "schema:claimReviewed"]
    }))
}
