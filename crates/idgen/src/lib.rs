//! # IdGen - Stable Field-Id Allocator
//!
//! Hands out the wire identifiers used in generated schema documents. Once a
//! `(namespace, name)` pair has an id it keeps it for as long as the state
//! file is reused, which is what lets old binary records stay readable after
//! a regeneration.
//!
//! ## Allocation rule
//!
//! A name not seen before gets `max(ids in its namespace) + 1`, starting at 1.
//! Protobuf's reserved range `19000..=19999` is skipped.
//!
//! ## File format
//!
//! The state is a TOML document, one table per namespace:
//!
//! ```text
//! ["TypeField#Items"]
//! "Items#id#int32" = 1
//! "Items#name#string" = 2
//! "Items#count#int32_array" = 3
//! ```
//!
//! ## Crash safety
//!
//! [`IdAllocator::save`] writes to `<file>.tmp`, fsyncs, then renames over the
//! target, so a crash mid-save leaves the previous state intact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Separator between the parts of namespace and name keys.
pub const KEY_SEP: char = '#';

/// Prefix of per-table field namespaces (`TypeField#<table>`).
pub const TYPE_FIELD_PREFIX: &str = "TypeField";

/// Namespace of table-independent config field ids.
pub const CONFIG_FIELD_NAMESPACE: &str = "ConfigField";

/// Largest field number the protobuf wire format can carry.
pub const MAX_FIELD_ID: u32 = (1 << 29) - 1;

/// Field numbers reserved by protobuf for its own use.
const RESERVED_IDS: std::ops::RangeInclusive<u32> = 19_000..=19_999;

/// Errors raised while loading, allocating or persisting ids.
#[derive(Debug, Error)]
pub enum IdGenError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed id file {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("failed to encode id state: {0}")]
    Encode(String),

    #[error("namespace '{0}' has no field ids left")]
    Exhausted(String),
}

/// Persistent `namespace -> name -> id` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdAllocator {
    namespaces: BTreeMap<String, BTreeMap<String, u32>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads allocator state from `path`.
    ///
    /// A missing or empty file yields an empty allocator; that is the normal
    /// first-run state, not an error.
    pub fn load(path: &Path) -> Result<Self, IdGenError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(IdGenError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if text.trim().is_empty() {
            return Ok(Self::new());
        }

        toml::from_str(&text).map_err(|e| IdGenError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Persists the full state to `path`, creating parent directories.
    ///
    /// Writes to a sibling `.tmp` file, fsyncs and renames. If the rename
    /// fails (Windows keeps cached targets locked) the target is truncated
    /// and rewritten in place instead.
    pub fn save(&self, path: &Path) -> Result<(), IdGenError> {
        let body = toml::to_string_pretty(self).map_err(|e| IdGenError::Encode(e.to_string()))?;
        store::write_atomic(path, body.as_bytes()).map_err(|source| IdGenError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the id for `(namespace, name)` if one has been assigned.
    #[must_use]
    pub fn get(&self, namespace: &str, name: &str) -> Option<u32> {
        self.namespaces.get(namespace)?.get(name).copied()
    }

    /// Returns the id for `(namespace, name)`, assigning the next free one
    /// in that namespace if the pair is new.
    pub fn get_or_create(&mut self, namespace: &str, name: &str) -> Result<u32, IdGenError> {
        if let Some(id) = self.get(namespace, name) {
            return Ok(id);
        }

        let ids = self.namespaces.entry(namespace.to_string()).or_default();
        let max = ids.values().copied().max().unwrap_or(0);
        let mut next = max
            .checked_add(1)
            .ok_or_else(|| IdGenError::Exhausted(namespace.to_string()))?;
        if RESERVED_IDS.contains(&next) {
            next = RESERVED_IDS.end() + 1;
        }
        if next > MAX_FIELD_ID {
            return Err(IdGenError::Exhausted(namespace.to_string()));
        }

        ids.insert(name.to_string(), next);
        Ok(next)
    }

    /// Field id for column `column` of sheet `sheet` in workbook `table`.
    ///
    /// `signature` is the column's type signature (e.g. `int32` or
    /// `int32_array`), so retyping a column allocates a fresh id instead of
    /// reinterpreting old data under the old one.
    pub fn field_id(
        &mut self,
        table: &str,
        sheet: &str,
        column: &str,
        signature: &str,
    ) -> Result<u32, IdGenError> {
        let namespace = type_field_namespace(table);
        let name = format!("{sheet}{KEY_SEP}{column}{KEY_SEP}{signature}");
        self.get_or_create(&namespace, &name)
    }

    /// Table-independent id for a named config field.
    pub fn config_field_id(&mut self, name: &str) -> Result<u32, IdGenError> {
        self.get_or_create(CONFIG_FIELD_NAMESPACE, name)
    }

    /// All `name -> id` entries of one namespace.
    #[must_use]
    pub fn namespace(&self, namespace: &str) -> Option<&BTreeMap<String, u32>> {
        self.namespaces.get(namespace)
    }

    /// Number of namespaces holding at least one entry.
    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.namespaces.values().filter(|ids| !ids.is_empty()).count()
    }

    /// Total number of assigned ids across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Namespace holding the field ids of one workbook.
#[must_use]
pub fn type_field_namespace(table: &str) -> String {
    format!("{TYPE_FIELD_PREFIX}{KEY_SEP}{table}")
}

#[cfg(test)]
mod tests;
