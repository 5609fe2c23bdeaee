//! # Staging - In-Memory Record Table
//!
//! A sheet's records are collected here, fully, before anything touches
//! disk. Only a complete, conflict-free table is handed to the store's
//! staged backup, so a conversion error halfway through a sheet never
//! produces a partial store file.
//!
//! Keys are unique: a second insert under an existing key is refused and
//! leaves the first value in place.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TABLE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct StagingTable {
    label: String,
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    approx_size: usize,
}

impl StagingTable {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            map: BTreeMap::new(),
            approx_size: 0,
        }
    }

    /// Table for one `(table, sheet)` pair. The label is unique within the
    /// process, so concurrent workers staging the same sheet name never
    /// share an identity (or a temp file derived from it).
    pub fn for_sheet(table: &str, sheet: &str) -> Self {
        let n = NEXT_TABLE.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("{table}_{sheet}.{}.{n}", std::process::id()))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Insert a record. Returns `false`, and keeps the existing value, if
    /// the key is already staged.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        if self.map.contains_key(&key) {
            return false;
        }
        self.approx_size += key.len() + value.len();
        self.map.insert(key, value);
        true
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes of keys plus values currently staged.
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }
}

impl Default for StagingTable {
    fn default() -> Self {
        Self::new("staging")
    }
}

#[cfg(test)]
mod tests;
