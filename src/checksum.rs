//! Checksum utilities for artifact idempotence and source bundle digests

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::Result;

/// SHA256 checksum of a generated artifact or a set of source fragments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn from_text(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Digest every `*.json` fragment under `root`.
    ///
    /// Files are visited in sorted path order and each contributes its
    /// relative path and contents, so the digest only changes when the
    /// fragment set does.
    pub fn from_source_tree(root: &Path) -> Result<Self> {
        let mut hasher = Sha256::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(fs::read(entry.path())?);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        self.0 == Self::from_text(content).0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
