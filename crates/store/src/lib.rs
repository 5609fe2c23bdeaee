//! # Store - Durable Key/Blob Files
//!
//! One immutable store file holds every record of one sheet. Files are
//! produced from a fully built [`staging::StagingTable`] through a staged
//! backup and are read back with [`StoreReader`].
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (records in ascending key order)                  │
//! │                                                               │
//! │ crc32 (u32) | key_len (u32) | key | val_len (u32) | val        │
//! │                                                               │
//! │ The CRC32 covers everything after itself in the record.       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION (key -> data_offset mapping)                     │
//! │                                                               │
//! │ key_len (u32) | key | data_offset (u64)                        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                                  │
//! │                                                               │
//! │ record_count (u64 LE) | index_offset (u64 LE)                  │
//! │ magic (u32 LE) "CDB1"                                         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Staged backup
//!
//! ```text
//! StagingTable --step(n)--> <name>.tmp --finish + verify--> publish(rename) --> <name>
//! ```
//!
//! A temp file only becomes visible under its final name once the backup
//! reports `done` with every staged record copied. An empty staging table
//! produces a valid store with zero records.

mod backup;
mod durable;
mod format;
mod reader;

pub use backup::{BackupReport, StoreBackup, StoreWriter};
pub use durable::{publish, tmp_path_for, write_atomic};
pub use format::{Footer, FOOTER_BYTES, MAX_KEY_BYTES, MAX_VALUE_BYTES, STORE_MAGIC};
pub use reader::StoreReader;

#[cfg(test)]
mod tests;
