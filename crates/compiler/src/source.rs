//! Workbook discovery and content digests.

use crate::CompileError;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// One workbook to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// File name without directories, e.g. `Items.xlsx`.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Source {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Table name: the file name without its extension.
    pub fn table(&self) -> String {
        schema::table_base_name(&self.file_name)
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::of(&self.bytes)
    }
}

/// Hex MD5 of some bytes plus their length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    pub md5: String,
    pub size: u64,
}

impl ContentDigest {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        Self {
            md5: format!("{:x}", hasher.finalize()),
            size: bytes.len() as u64,
        }
    }

    /// `<md5><size>`, the suffix of content-named store files.
    pub fn tag(&self) -> String {
        format!("{}{}", self.md5, self.size)
    }
}

/// `true` for paths the compiler should read: `*.xlsx` files that are
/// neither office lock files (`~$...`) nor archive metadata (`__MACOSX/`).
pub fn is_workbook_path(path: &str) -> bool {
    if path.split(['/', '\\']).any(|p| p == "__MACOSX") {
        return false;
    }
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    !name.starts_with("~$") && name.len() > 5 && name.to_ascii_lowercase().ends_with(".xlsx")
}

/// Reads every workbook directly inside `dir`, sorted by file name.
pub fn discover(dir: &Path) -> Result<Vec<Source>, CompileError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CompileError::io(dir, e))?;
    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CompileError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() || !is_workbook_path(&name) {
            debug!(file = %name, "skipping non-workbook file");
            continue;
        }
        let bytes = std::fs::read(&path).map_err(|e| CompileError::io(&path, e))?;
        sources.push(Source::new(name, bytes));
    }
    sources.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(sources)
}

/// Workbooks of an unpacked archive. Directory components are dropped; if
/// two entries share a file name the first (in path order) wins.
pub fn from_archive(files: &BTreeMap<String, Vec<u8>>) -> Vec<Source> {
    let mut by_name: BTreeMap<String, Source> = BTreeMap::new();
    for (path, bytes) in files {
        if !is_workbook_path(path) {
            continue;
        }
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path).to_string();
        if by_name.contains_key(&name) {
            warn!(path = %path, "duplicate workbook name in archive, ignoring");
            continue;
        }
        by_name.insert(name.clone(), Source::new(name, bytes.clone()));
    }
    by_name.into_values().collect()
}
