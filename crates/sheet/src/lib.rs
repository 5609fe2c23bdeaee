//! # Sheet - Workbook Reader
//!
//! Opens `.xlsx` workbooks and exposes every sheet as a grid of cell text.
//! Only literal values are read: formulas contribute their cached value,
//! styles and charts are ignored.
//!
//! ## Package layout read
//!
//! ```text
//! xl/workbook.xml              sheet names + relationship ids
//! xl/_rels/workbook.xml.rels   relationship id -> worksheet part
//! xl/sharedStrings.xml         shared string table (optional)
//! xl/worksheets/sheetN.xml     <sheetData><row><c><v>..</v></c></row></sheetData>
//! ```
//!
//! Row and column positions come from the `r` attributes (`A1` references),
//! so sparse rows keep their indices: a sheet whose first written row is
//! `r="3"` still reports it as row index 2.

mod cellref;
mod reader;
mod writer;

pub use cellref::{cell_ref, column_index, column_letters, MAX_COLUMNS, MAX_ROWS};
pub use writer::WorkbookWriter;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workbook archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("workbook part missing: {0}")]
    MissingPart(String),

    #[error("malformed {part}: {detail}")]
    Xml { part: String, detail: String },
}

/// One row of cell text. Missing cells read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// Text of cell `col`, or `""` past the last written cell.
    pub fn cell(&self, col: usize) -> &str {
        self.cells.get(col).map(String::as_str).unwrap_or("")
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Number of cells up to and including the last written one.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    pub(crate) fn set(&mut self, col: usize, text: String) {
        if self.cells.len() <= col {
            self.cells.resize(col + 1, String::new());
        }
        self.cells[col] = text;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    name: String,
    rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Text at `(row, col)`, `""` when either is out of range.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows.get(row).map(|r| r.cell(col)).unwrap_or("")
    }

    /// Row count up to and including the last written row.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A parsed workbook: its sheets in workbook order.
#[derive(Debug, Clone)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Reads and parses the workbook at `path`.
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        let bytes = std::fs::read(path).map_err(|source| SheetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    /// Parses a workbook held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SheetError> {
        let sheets = reader::read_workbook(bytes)?;
        Ok(Self { sheets })
    }

    /// Looks a sheet up by name. An exact match wins; otherwise the first
    /// case-insensitive match is returned.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }
}
