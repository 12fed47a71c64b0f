//! Fragment Store
//!
//! Loads building-block fragments from the source tree and memoizes them by
//! canonical absolute path. Every load hands out a deep copy, so callers may
//! mutate what they receive without affecting the cache or each other.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// Memoizing, copy-on-read fragment loader rooted at a building-block directory
#[derive(Debug)]
pub struct FragmentStore {
    root: PathBuf,
    cache: HashMap<PathBuf, Value>,
}

impl FragmentStore {
    /// Open a store over `root`. Fails if the directory does not exist.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = fs::canonicalize(root)
            .map_err(|_| BuildError::SourceDirNotFound(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(BuildError::SourceDirNotFound(root));
        }
        Ok(Self {
            root,
            cache: HashMap::new(),
        })
    }

    /// Canonical root of the building-block tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Does a fragment exist at `rel_path` (relative to the root)?
    pub fn exists(&self, rel_path: &str) -> bool {
        self.root.join(rel_path).is_file()
    }

    /// Load a fragment by path relative to the store root
    pub fn load(&mut self, rel_path: &str) -> Result<Value> {
        let path = self.root.join(rel_path);
        self.load_path(&path)
    }

    /// Load a fragment by absolute (or cwd-relative) path
    pub fn load_path(&mut self, path: &Path) -> Result<Value> {
        let key = fs::canonicalize(path).map_err(|_| BuildError::FragmentNotFound {
            path: path.to_path_buf(),
        })?;

        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let fragment = read_fragment(&key)?;
        tracing::debug!(path = %key.display(), "loaded fragment");
        self.cache.insert(key, fragment.clone());
        Ok(fragment)
    }

    /// Number of distinct fragments loaded so far
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// Read and parse one fragment file, tolerating a UTF-8 byte order mark
fn read_fragment(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BuildError::FragmentNotFound {
            path: path.to_path_buf(),
        },
        _ => BuildError::Io(e),
    })?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    serde_json::from_str(content).map_err(|source| BuildError::FragmentParse {
        path: path.to_path_buf(),
        source,
    })
}
