//! Error types for graph schema composition
//!
//! Only fatal conditions live here. Degraded resolution and post-build
//! findings are collected as [`crate::diagnostics::Diagnostics`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for composition operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Fatal composition errors. Any of these aborts the run before an artifact is written.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Fragment not found: {path}")]
    FragmentNotFound { path: PathBuf },

    #[error("Failed to parse fragment {path}: {source}")]
    FragmentParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid fragment {path}: {reason}")]
    InvalidFragment { path: String, reason: String },

    #[error("Building block source directory not found: {0}")]
    SourceDirNotFound(PathBuf),

    #[error("Promoted definition name '{name}' collides with an existing definition")]
    PromotionCollision { name: String },

    #[error("{count} unresolved reference(s) remain in the generated schema")]
    UnresolvedReferences { count: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
