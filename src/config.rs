//! Configuration for graph schema builds
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (graph-schema.toml)
//! - Environment variables (GRAPH_SCHEMA__*)
//!
//! ## Example config file (graph-schema.toml):
//! ```toml
//! [source]
//! bb_dir = "../metadataBuildingBlocks/_sources"
//!
//! [output]
//! path = "CDIF-graph-schema-2026.json"
//! format = "pretty"
//! report = "build/graph-schema-report.json"
//!
//! [resolution]
//! max_depth = 20
//! unresolved = "warn"
//! compile_check = true
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pipeline::{BuildOptions, OutputFormat, UnresolvedPolicy};
use crate::resolve::DEFAULT_MAX_DEPTH;

/// Environment variable naming the building-block `_sources` directory
pub const BB_DIR_ENV: &str = "CDIF_BB_DIR";

/// Main configuration for a build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Where the building blocks live
    #[serde(default)]
    pub source: SourceConfig,

    /// Artifact settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Reference resolution and self-check settings
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Building-block `_sources` directory. Discovered when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bb_dir: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where the artifact is written
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Output format (pretty or compact)
    #[serde(default)]
    pub format: OutputFormat,

    /// Optional JSON build report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
}

/// Resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Bound on nested fragment inlinings
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// What unresolved references in the artifact do to the run
    #[serde(default)]
    pub unresolved: UnresolvedPolicy,

    /// Compile the artifact with a JSON Schema validator after building
    #[serde(default = "default_true")]
    pub compile_check: bool,
}

// Default value functions
fn default_output_path() -> PathBuf {
    PathBuf::from("CDIF-graph-schema-2026.json")
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            format: OutputFormat::Pretty,
            report: None,
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            unresolved: UnresolvedPolicy::Warn,
            compile_check: true,
        }
    }
}

impl BuildConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "graph-schema.toml",
            ".graph-schema.toml",
            "config/graph-schema.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("org", "cdif", "graph-schema") {
            let xdg_config = config_dir.config_dir().join("graph-schema.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // GRAPH_SCHEMA__RESOLUTION__MAX_DEPTH=30 and friends
        builder = builder.add_source(
            Environment::with_prefix("GRAPH_SCHEMA")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Pipeline options derived from this configuration
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            max_depth: self.resolution.max_depth,
            unresolved: self.resolution.unresolved,
            compile_check: self.resolution.compile_check,
            format: self.output.format,
        }
    }

    /// The building-block directory: the configured one, else `CDIF_BB_DIR`,
    /// else the first conventional location that exists
    pub fn bb_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.source.bb_dir {
            return Some(dir.clone());
        }
        find_bb_dir(std::env::var_os(BB_DIR_ENV).map(PathBuf::from), Path::new("."))
    }
}

/// Conventional locations of the building-block `_sources` directory,
/// relative to `base`
pub fn candidate_dirs(base: &Path) -> Vec<PathBuf> {
    vec![
        base.join("BuildingBlockSubmodule").join("_sources"),
        base.join("..").join("metadataBuildingBlocks").join("_sources"),
    ]
}

/// First existing directory among `from_env` and the candidates under `base`
pub fn find_bb_dir(from_env: Option<PathBuf>, base: &Path) -> Option<PathBuf> {
    from_env
        .into_iter()
        .chain(candidate_dirs(base))
        .find(|dir| dir.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BuildConfig::default();
        assert_eq!(config.resolution.max_depth, 20);
        assert_eq!(config.resolution.unresolved, UnresolvedPolicy::Warn);
        assert_eq!(config.output.path, PathBuf::from("CDIF-graph-schema-2026.json"));
        assert!(config.source.bb_dir.is_none());
    }

    #[test]
    fn test_serialize_config() {
        let config = BuildConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[output]"));
        assert!(toml_str.contains("[resolution]"));
        assert!(toml_str.contains("unresolved = \"warn\""));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[resolution]\nmax_depth = 7\nunresolved = \"deny\"\n\n[output]\nformat = \"compact\"\n",
        )
        .unwrap();

        let config = BuildConfig::load_from(Some(&path)).unwrap();
        let options = config.build_options();
        assert_eq!(options.max_depth, 7);
        assert_eq!(options.unresolved, UnresolvedPolicy::Deny);
        assert_eq!(options.format, OutputFormat::Compact);
        assert!(options.compile_check);
    }

    #[test]
    fn test_find_bb_dir_prefers_env_then_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let submodule = dir.path().join("BuildingBlockSubmodule").join("_sources");
        std::fs::create_dir_all(&submodule).unwrap();

        assert_eq!(find_bb_dir(None, dir.path()), Some(submodule.clone()));

        let explicit = dir.path().join("elsewhere");
        std::fs::create_dir_all(&explicit).unwrap();
        assert_eq!(find_bb_dir(Some(explicit.clone()), dir.path()), Some(explicit));

        let missing = dir.path().join("missing");
        assert_eq!(find_bb_dir(Some(missing), dir.path()), Some(submodule));
    }
}
