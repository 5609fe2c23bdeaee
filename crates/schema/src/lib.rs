//! # Schema - Sheet Schemas and Schema Documents
//!
//! A data sheet is described by a [`SheetSchema`]: a message name and an
//! ordered list of typed columns, each carrying a stable field id.
//!
//! ## Sheet protocol
//!
//! ```text
//! row 0   free-form comments
//! row 1   column titles            id     name     count
//! row 2   type annotations         int    string   int_list
//! row 3   free-form comments
//! row 4   default values           0               1,1
//! row 5.. data                     1      Sword    3,4
//! ```
//!
//! The data start row is configurable ([`SheetLayout::with_start_row`]);
//! title, type and default rows are fixed.
//!
//! ## Schema documents
//!
//! Schemas are written as proto3 text (see [`render_document`]) and read
//! back with [`parse_document`], which is how the record side of the compiler
//! learns a sheet's field ids without re-running inference.

mod document;
mod infer;

pub use document::{find_message, parse_document, render_document, render_message, DOCUMENT_HEADER};
pub use infer::{infer_columns, SheetLayout};

use std::path::Path;
use thiserror::Error;

/// Prefix shared by every generated message name.
pub const MESSAGE_PREFIX: &str = "confpb";

/// File name of the document holding every message of a run.
pub const COMBINED_DOCUMENT: &str = "confpb.proto";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema document line {line}: {detail}")]
    Parse { line: usize, detail: String },

    #[error("message {0} not found in schema document")]
    MessageNotFound(String),
}

/// Scalar type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int32,
    Float32,
    String,
}

impl ScalarType {
    /// Maps a type annotation cell to `(scalar, is_list)`.
    ///
    /// `bool`, `int` and `float` name their scalar; anything else is a
    /// string. `<base>_list` (exactly two `_`-separated parts) marks a
    /// list column of `<base>`.
    pub fn from_annotation(annotation: &str) -> (Self, bool) {
        let lowered = annotation.trim().to_lowercase();
        let parts: Vec<&str> = lowered.split('_').collect();
        let (base, list) = match parts.as_slice() {
            [base, "list"] => (*base, true),
            _ => (lowered.as_str(), false),
        };
        let scalar = match base {
            "bool" => Self::Bool,
            "int" => Self::Int32,
            "float" => Self::Float32,
            _ => Self::String,
        };
        (scalar, list)
    }

    /// Type name used in schema documents.
    pub fn proto_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Float32 => "float",
            Self::String => "string",
        }
    }

    pub fn from_proto_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Self::Bool),
            "int32" => Some(Self::Int32),
            "float" | "float32" => Some(Self::Float32),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

/// One field of a [`SheetSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub scalar: ScalarType,
    pub repeated: bool,
    pub field_id: u32,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, scalar: ScalarType, repeated: bool) -> Self {
        Self {
            name: name.into(),
            scalar,
            repeated,
            field_id: 0,
        }
    }

    /// `int32`, `string_array`, ... Part of the field-id key, so changing a
    /// column's type or multiplicity yields a new id.
    pub fn type_signature(&self) -> String {
        if self.repeated {
            format!("{}_array", self.scalar.proto_name())
        } else {
            self.scalar.proto_name().to_string()
        }
    }
}

/// Typed description of one data sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSchema {
    pub message_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl SheetSchema {
    pub fn new(message_name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            message_name: message_name.into(),
            columns,
        }
    }

    /// Assigns every column its field id through `assign`, stopping at the
    /// first failure.
    pub fn build<F, E>(message_name: impl Into<String>, mut columns: Vec<ColumnSpec>, mut assign: F) -> Result<Self, E>
    where
        F: FnMut(&ColumnSpec) -> Result<u32, E>,
    {
        for col in &mut columns {
            col.field_id = assign(col)?;
        }
        Ok(Self::new(message_name, columns))
    }

    /// Column by name: exact match first, then case-insensitive.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// The first `key` or `id` column, if any. Sheets without one are
    /// constant tables.
    pub fn key_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| is_key_title(&c.name))
    }

    pub fn is_constant(&self) -> bool {
        self.key_column().is_none()
    }

    /// Columns in ascending field-id order.
    pub fn columns_by_id(&self) -> Vec<&ColumnSpec> {
        let mut cols: Vec<&ColumnSpec> = self.columns.iter().collect();
        cols.sort_by_key(|c| c.field_id);
        cols
    }
}

/// `key` and `id` titles (any case) designate the record key column.
pub fn is_key_title(title: &str) -> bool {
    title.eq_ignore_ascii_case("key") || title.eq_ignore_ascii_case("id")
}

/// `true` for names a schema document can carry and read back:
/// `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Message name for sheet `sheet` of workbook `table`.
pub fn message_name(table: &str, sheet: &str) -> String {
    format!("{MESSAGE_PREFIX}{table}{sheet}")
}

/// Per-sheet schema document file name.
pub fn document_file_name(message_name: &str) -> String {
    format!("{message_name}.proto")
}

/// Workbook file name without directory and extension (`conf/Items.xlsx` -> `Items`).
pub fn table_base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

#[cfg(test)]
mod tests;
