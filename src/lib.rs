//! CDIF Graph Schema Builder
//!
//! Composes the CDIF building-block JSON Schema fragments into one
//! self-contained JSON Schema (draft 2020-12) that validates flattened
//! JSON-LD graphs, dispatching each node on its `@type`.
//!
//! ## Pipeline
//!
//! ```text
//! _sources/ ──▶ FragmentStore ──▶ Resolver ──▶ type builders
//!                                                  │
//!               artifact ◀── self-check ◀── assemble ◀── promote ◀── inject
//! ```
//!
//! - **Resolution**: cross-fragment `$ref`s are inlined or rewritten to
//!   canonical definitions, bounded by a depth limit
//! - **Type builders**: one table-driven builder per type definition
//! - **Injection**: object-valued references also accept `{"@id": ...}`
//! - **Promotion**: nested `$defs` are hoisted into the root namespace
//! - **Dispatch**: `@type`-conditional root over object, array, and graph
//!   document forms
//!
//! ## Example
//!
//! ```no_run
//! use cdif_graph_schema::{build, write_artifact, BuildOptions, Profile};
//! use std::path::Path;
//!
//! let output = build(&Profile::cdif(), Path::new("metadataBuildingBlocks/_sources"), &BuildOptions::default())?;
//! write_artifact(&output, Path::new("CDIF-graph-schema-2026.json"))?;
//! println!("{}", output.diagnostics.format_summary());
//! # Ok::<(), cdif_graph_schema::BuildError>(())
//! ```

pub mod alias;
pub mod check;
pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod flatten;
pub mod inject;
pub mod pipeline;
pub mod promote;
pub mod resolve;
pub mod shape;
pub mod store;
pub mod types;

pub use alias::{AliasTable, FragmentRef};
pub use checksum::Checksum;
pub use config::BuildConfig;
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use dispatch::{ContextPrefixes, DispatchTable, RootMetadata};
pub use error::{BuildError, Result};
pub use pipeline::{
    build, check_drift, serialize, write_artifact, BuildOptions, BuildOutput, BuildReport,
    BuildSummary, DriftStatus, OutputFormat, Profile, UnresolvedPolicy,
};
pub use promote::PromotionSummary;
pub use store::FragmentStore;
pub use types::TypeBuilder;
