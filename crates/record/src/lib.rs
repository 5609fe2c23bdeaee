//! # Record - Rows to Typed Records
//!
//! Turns a data row into a [`Record`] shaped by a [`schema::SheetSchema`],
//! and encodes records to (and decodes them from) a protobuf-compatible
//! binary form.
//!
//! ## Per-cell rules
//!
//! 1. A blank cell takes the sheet's default-row value for its column; if
//!    that is blank too the field stays unset.
//! 2. Text starting with `**` is a comment; the field stays unset.
//! 3. Text is converted to the column's scalar type. `*_list` columns are
//!    split on `,` first. Numeric and bool tokens are trimmed and empty
//!    tokens dropped; string tokens are kept verbatim.
//!
//! ## Record keys
//!
//! The first `key`/`id` column supplies the key. Rows whose key is blank,
//! `0` or a comment are dropped. Sheets without such a column are constant
//! tables: only the first data row is converted, under key `"1"`.

mod codec;
mod convert;

pub use codec::{decode, encode, DecodeError};
pub use convert::RowConverter;

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Key of the single record of a constant table.
pub const CONSTANT_KEY: &str = "1";

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Float32(f32),
    Str(String),
    BoolList(Vec<bool>),
    Int32List(Vec<i32>),
    Float32List(Vec<f32>),
    StrList(Vec<String>),
}

impl Value {
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::BoolList(_) | Self::Int32List(_) | Self::Float32List(_) | Self::StrList(_)
        )
    }

    /// Number of list elements; `1` for scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::BoolList(v) => v.len(),
            Self::Int32List(v) => v.len(),
            Self::Float32List(v) => v.len(),
            Self::StrList(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::BoolList(v) => write!(f, "{v:?}"),
            Self::Int32List(v) => write!(f, "{v:?}"),
            Self::Float32List(v) => write!(f, "{v:?}"),
            Self::StrList(v) => write!(f, "{v:?}"),
        }
    }
}

/// One data row mapped onto a sheet schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub key: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }
}

/// A cell whose text does not parse as its column's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{table}/{sheet} cell {cell} (row {row}, column {column} '{title}'): \
     cannot read {raw:?} as {expected}: {reason}"
)]
pub struct ConversionError {
    pub table: String,
    pub sheet: String,
    /// 1-based row number as shown by spreadsheet applications.
    pub row: usize,
    /// 1-based column number.
    pub column: usize,
    /// `A1`-style reference of the cell.
    pub cell: String,
    pub title: String,
    pub expected: &'static str,
    pub raw: String,
    pub reason: String,
}
