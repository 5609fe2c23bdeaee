//! Content-hash caches.
//!
//! ```text
//! schema_versions.json   file name        -> TableVersion (artifacts: schema documents)
//! store_versions.json    <file>_<md5>     -> TableVersion (artifacts: store files)
//! ```

use crate::source::ContentDigest;
use crate::CompileError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use store::write_atomic;

pub const SCHEMA_CACHE_FILE: &str = "schema_versions.json";
pub const STORE_CACHE_FILE: &str = "store_versions.json";

/// What a previous run produced from one workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableVersion {
    pub hash: String,
    pub size: u64,
    /// Sheets compiled, parallel to `artifacts`.
    #[serde(default)]
    pub sheets: Vec<String>,
    /// Generated file names.
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl TableVersion {
    pub fn new(digest: &ContentDigest, sheets: Vec<String>, artifacts: Vec<String>) -> Self {
        Self {
            hash: digest.md5.clone(),
            size: digest.size,
            sheets,
            artifacts,
        }
    }

    pub fn matches(&self, digest: &ContentDigest) -> bool {
        self.hash == digest.md5 && self.size == digest.size
    }

    /// `true` if every artifact still exists in `dir`.
    pub fn artifacts_exist(&self, dir: &Path) -> bool {
        self.artifacts.iter().all(|a| dir.join(a).is_file())
    }
}

/// Table identity -> [`TableVersion`], persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentCache {
    entries: BTreeMap<String, TableVersion>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a cache file. A missing or empty file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(CompileError::io(path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(&text).map_err(|e| CompileError::Persist {
            what: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CompileError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| CompileError::Persist {
            what: path.display().to_string(),
            detail: e.to_string(),
        })?;
        write_atomic(path, &bytes).map_err(|e| CompileError::io(path, e))
    }

    pub fn get(&self, key: &str) -> Option<&TableVersion> {
        self.entries.get(key)
    }

    /// The entry under `key` if it was produced from exactly these bytes.
    pub fn fresh(&self, key: &str, digest: &ContentDigest) -> Option<&TableVersion> {
        self.get(key).filter(|v| v.matches(digest))
    }

    pub fn insert(&mut self, key: impl Into<String>, version: TableVersion) {
        self.entries.insert(key.into(), version);
    }

    pub fn remove(&mut self, key: &str) -> Option<TableVersion> {
        self.entries.remove(key)
    }

    /// Drops store-cache entries of `file_name` for other contents.
    pub fn retain_current(&mut self, file_name: &str, digest: &ContentDigest) {
        let current = store_cache_key(file_name, digest);
        let prefix = format!("{file_name}_");
        self.entries.retain(|key, _| {
            let stale = key != &current
                && key
                    .strip_prefix(&prefix)
                    .is_some_and(|rest| rest.len() == 32 && rest.bytes().all(|b| b.is_ascii_hexdigit()));
            !stale
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Store-cache key of a workbook's contents.
pub fn store_cache_key(file_name: &str, digest: &ContentDigest) -> String {
    format!("{file_name}_{}", digest.md5)
}
