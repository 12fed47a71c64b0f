//! Build pipeline
//!
//! Runs the stages once, left to right: build every type definition, inject
//! bare-identifier alternatives, promote nested definitions, assemble the
//! dispatch root, then self-check the result. Also home to the build report
//! and the drift check against a previously written artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::alias::AliasTable;
use crate::check::{check_references, compile_check};
use crate::checksum::Checksum;
use crate::diagnostics::Diagnostics;
use crate::dispatch::{assemble, ContextPrefixes, DispatchTable, RootMetadata};
use crate::error::{BuildError, Result};
use crate::inject::Injector;
use crate::promote::{promote_definitions, PromotionSummary};
use crate::resolve::DEFAULT_MAX_DEPTH;
use crate::store::FragmentStore;
use crate::types::{build_types, cdif, TypeBuilder};

// =============================================================================
// Profile
// =============================================================================

/// Everything that defines one schema variant. Profiles are plain values, so
/// several can be built in one process without sharing state.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub metadata: RootMetadata,
    pub aliases: AliasTable,
    pub builders: Vec<TypeBuilder>,
    pub dispatch: DispatchTable,
    pub context: ContextPrefixes,
}

impl Profile {
    /// The CDIF flattened JSON-LD graph schema
    pub fn cdif() -> Self {
        Self {
            name: "cdif".into(),
            metadata: RootMetadata {
                title: "CDIF Flattened JSON-LD Graph Schema".into(),
                description: "JSON Schema for validating flattened JSON-LD graphs containing CDIF metadata. \
                    Accepts either a single graph node (object), an array of nodes, or a \
                    JSON-LD document with @context and @graph. Each node is dispatched by \
                    @type to the appropriate type-specific sub-schema. Generated from CDIF \
                    building block source schemas."
                    .into(),
            },
            aliases: AliasTable::cdif(),
            builders: cdif::builders(),
            dispatch: DispatchTable::cdif(),
            context: ContextPrefixes::cdif(),
        }
    }

    /// Names of the type definitions this profile produces
    pub fn type_names(&self) -> BTreeSet<String> {
        self.builders.iter().map(|b| b.name.to_owned()).collect()
    }
}

// =============================================================================
// Options
// =============================================================================

/// What to do when the self-check finds references that point nowhere
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Write the artifact and report the findings
    #[default]
    Warn,
    /// Fail the run before anything is written
    Deny,
}

/// Artifact serialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Four-space indented
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub max_depth: usize,
    pub unresolved: UnresolvedPolicy,
    pub compile_check: bool,
    pub format: OutputFormat,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            unresolved: UnresolvedPolicy::Warn,
            compile_check: true,
            format: OutputFormat::Pretty,
        }
    }
}

// =============================================================================
// Build
// =============================================================================

/// Counts describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub type_count: usize,
    pub dispatch_count: usize,
    pub fragments_loaded: usize,
    pub alternatives_added: usize,
    pub promotion: PromotionSummary,
}

/// The assembled artifact and everything learned while building it
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub schema: Value,
    /// Serialized artifact, exactly as it is written
    pub text: String,
    pub checksum: Checksum,
    pub diagnostics: Diagnostics,
    pub summary: BuildSummary,
}

/// Build the profile's schema from the building blocks under `bb_dir`
pub fn build(profile: &Profile, bb_dir: &Path, options: &BuildOptions) -> Result<BuildOutput> {
    let mut store = FragmentStore::open(bb_dir)?;
    tracing::info!(source = %store.root().display(), profile = %profile.name, "building graph schema");

    let mut diagnostics = Diagnostics::new();
    let mut definitions = build_types(
        &profile.builders,
        &mut store,
        &profile.aliases,
        &mut diagnostics,
        options.max_depth,
    )?;

    let type_names = profile.type_names();
    let alternatives_added = inject_alternatives(&mut definitions, &type_names);
    tracing::info!(added = alternatives_added, "added bare-identifier alternatives");

    let promotion = promote_definitions(&mut definitions)?;
    let type_count = definitions.len();

    let schema = assemble(definitions, &profile.dispatch, &profile.context, &profile.metadata);

    let unresolved = check_references(&schema, &mut diagnostics);
    if options.compile_check {
        compile_check(&schema, &mut diagnostics);
    }
    if unresolved > 0 && options.unresolved == UnresolvedPolicy::Deny {
        return Err(BuildError::UnresolvedReferences { count: unresolved });
    }

    let text = serialize(&schema, options.format)?;
    let checksum = Checksum::from_text(&text);

    Ok(BuildOutput {
        schema,
        text,
        checksum,
        diagnostics,
        summary: BuildSummary {
            type_count,
            dispatch_count: profile.dispatch.len(),
            fragments_loaded: store.cached_count(),
            alternatives_added,
            promotion,
        },
    })
}

/// Inject alternatives into every type definition (not into helpers)
fn inject_alternatives(definitions: &mut Map<String, Value>, type_names: &BTreeSet<String>) -> usize {
    let mut injector = Injector::new(|name: &str| type_names.contains(name));
    definitions
        .iter_mut()
        .filter(|(name, _)| type_names.contains(name.as_str()))
        .map(|(_, definition)| injector.inject(definition))
        .sum()
}

/// Serialize the artifact. Pretty output uses a four-space indent.
pub fn serialize(schema: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Compact => Ok(serde_json::to_string(schema)?),
        OutputFormat::Pretty => {
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            schema.serialize(&mut serializer)?;
            String::from_utf8(buf).map_err(|e| BuildError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
        }
    }
}

/// Write the serialized artifact, creating parent directories as needed
pub fn write_artifact(output: &BuildOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &output.text)?;
    tracing::info!(path = %path.display(), checksum = %output.checksum, "wrote artifact");
    Ok(())
}

// =============================================================================
// Report
// =============================================================================

/// Machine-readable record of one build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub generated_at: DateTime<Utc>,
    pub profile: String,
    pub source_dir: PathBuf,
    pub source_digest: Checksum,
    pub output_path: PathBuf,
    pub artifact_checksum: Checksum,
    pub summary: BuildSummary,
    pub diagnostics: Diagnostics,
}

impl BuildReport {
    pub fn new(profile: &Profile, bb_dir: &Path, output_path: &Path, output: &BuildOutput) -> Result<Self> {
        Ok(Self {
            generated_at: Utc::now(),
            profile: profile.name.clone(),
            source_dir: bb_dir.to_path_buf(),
            source_digest: Checksum::from_source_tree(bb_dir)?,
            output_path: output_path.to_path_buf(),
            artifact_checksum: output.checksum.clone(),
            summary: output.summary.clone(),
            diagnostics: output.diagnostics.clone(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// =============================================================================
// Drift
// =============================================================================

/// Outcome of comparing a fresh build with the artifact on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftStatus {
    UpToDate,
    /// No artifact exists at the path yet
    Missing,
    /// Line diff, `-` for the stored artifact and `+` for the fresh build
    Drifted { diff: String, changed_lines: usize },
}

impl DriftStatus {
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate)
    }
}

/// Compare `output` with the artifact stored at `path`. Nothing is written.
pub fn check_drift(output: &BuildOutput, path: &Path) -> Result<DriftStatus> {
    let stored = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DriftStatus::Missing),
        Err(e) => return Err(e.into()),
    };
    if output.checksum.verify(&stored) {
        return Ok(DriftStatus::UpToDate);
    }

    let diff = TextDiff::from_lines(&stored, &output.text);
    let mut rendered = String::new();
    let mut changed_lines = 0;
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        changed_lines += 1;
        rendered.push_str(sign);
        rendered.push_str(change.value());
        if change.missing_newline() {
            rendered.push('\n');
        }
    }

    Ok(DriftStatus::Drifted {
        diff: rendered,
        changed_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pretty_uses_four_space_indent() {
        let text = serialize(&json!({"a": {"b": 1}}), OutputFormat::Pretty).unwrap();
        assert_eq!(text, "{\n    \"a\": {\n        \"b\": 1\n    }\n}");
        let compact = serialize(&json!({"a": [1, 2]}), OutputFormat::Compact).unwrap();
        assert_eq!(compact, "{\"a\":[1,2]}");
    }

    #[test]
    fn test_non_ascii_is_written_verbatim() {
        let text = serialize(&json!({"t": "Zürich"}), OutputFormat::Compact).unwrap();
        assert!(text.contains("Zürich"));
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(serde_json::to_string(&UnresolvedPolicy::Deny).unwrap(), "\"deny\"");
        let format: OutputFormat = serde_json::from_str("\"compact\"").unwrap();
        assert_eq!(format, OutputFormat::Compact);
    }

    #[test]
    fn test_inject_skips_helper_definitions() {
        let mut defs = Map::new();
        defs.insert("type-A".into(), json!({"properties": {"b": {"$ref": "#/$defs/type-B"}}}));
        defs.insert("helper".into(), json!({"properties": {"b": {"$ref": "#/$defs/type-B"}}}));
        let names: BTreeSet<String> = ["type-A", "type-B"].iter().map(|s| s.to_string()).collect();

        assert_eq!(inject_alternatives(&mut defs, &names), 1);
        assert!(defs["type-A"]["properties"]["b"]["anyOf"].is_array());
        assert!(defs["helper"]["properties"]["b"].get("anyOf").is_none());
    }

    #[test]
    fn test_nested_definitions_keep_alternatives_through_promotion() {
        let mut defs = Map::new();
        defs.insert(
            "type-A".into(),
            json!({
                "properties": {"part": {"$ref": "#/$defs/Part"}},
                "$defs": {
                    "Part": {"properties": {"b": {"$ref": "#/$defs/B"}}},
                    "B": {"$ref": "#/$defs/type-B"}
                }
            }),
        );
        defs.insert("type-B".into(), json!({"type": "object"}));
        let names: BTreeSet<String> = ["type-A", "type-B"].iter().map(|s| s.to_string()).collect();

        assert_eq!(inject_alternatives(&mut defs, &names), 1);
        promote_definitions(&mut defs).unwrap();
        assert_eq!(
            defs["type-A--Part"]["properties"]["b"],
            json!({"anyOf": [{"$ref": "#/$defs/type-B"}, {"$ref": "#/$defs/id-reference"}]})
        );
        // promoted helpers are not type definitions themselves
        assert_eq!(defs["type-A"]["properties"]["part"], json!({"$ref": "#/$defs/type-A--Part"}));
    }

    fn output_with_text(text: &str) -> BuildOutput {
        BuildOutput {
            schema: Value::Null,
            text: text.to_owned(),
            checksum: Checksum::from_text(text),
            diagnostics: Diagnostics::new(),
            summary: BuildSummary::default(),
        }
    }

    #[test]
    fn test_drift_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let output = output_with_text("{\n    \"a\": 1\n}");

        assert_eq!(check_drift(&output, &path).unwrap(), DriftStatus::Missing);

        fs::write(&path, &output.text).unwrap();
        assert!(check_drift(&output, &path).unwrap().is_up_to_date());

        fs::write(&path, "{\n    \"a\": 2\n}").unwrap();
        match check_drift(&output, &path).unwrap() {
            DriftStatus::Drifted { diff, changed_lines } => {
                assert_eq!(changed_lines, 2);
                assert!(diff.contains("-    \"a\": 2"));
                assert!(diff.contains("+    \"a\": 1"));
            }
            other => panic!("expected drift, got {:?}", other),
        }
    }
}
