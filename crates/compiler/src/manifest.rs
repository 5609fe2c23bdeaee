//! Version manifest: which store file backs which message.
//!
//! ```text
//! {"CellList":[{"MsgName":"confpbItemsItems","FileName":"Items_Items_<md5><len>.db",
//!               "TableName":"Items","SheetName":"Items"}]}
//! ```
//!
//! Entries are kept sorted by message name so equal inputs give a
//! byte-identical file.

use crate::CompileError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use store::write_atomic;

/// Fixed name of the manifest inside the store directory.
pub const MANIFEST_FILE: &str = "version.txt";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "MsgName")]
    pub message_name: String,
    #[serde(rename = "FileName")]
    pub store_file: String,
    #[serde(rename = "TableName")]
    pub table: String,
    #[serde(rename = "SheetName")]
    pub sheet: String,
}

impl ManifestEntry {
    pub fn new(table: &str, sheet: &str, store_file: impl Into<String>) -> Self {
        Self {
            message_name: schema::message_name(table, sheet),
            store_file: store_file.into(),
            table: table.to_string(),
            sheet: sheet.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(rename = "CellList")]
    entries: Vec<ManifestEntry>,
}

impl VersionManifest {
    pub fn new(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn lookup(&self, message_name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.message_name == message_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CompileError> {
        serde_json::to_vec(self).map_err(|e| CompileError::Persist {
            what: MANIFEST_FILE.to_string(),
            detail: e.to_string(),
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CompileError> {
        serde_json::from_slice(bytes).map_err(|e| CompileError::Persist {
            what: MANIFEST_FILE.to_string(),
            detail: e.to_string(),
        })
    }

    /// Atomically replaces `path` with this manifest.
    pub fn save(&self, path: &Path) -> Result<(), CompileError> {
        write_atomic(path, &self.to_json()?).map_err(|e| CompileError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let bytes = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
        Self::from_json(&bytes)
    }
}
