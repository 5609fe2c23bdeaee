use crate::{ColumnSpec, ScalarType};
use sheet::Row;
use tracing::warn;

/// Fixed row positions of a data sheet (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub title_row: usize,
    pub type_row: usize,
    pub default_row: usize,
    pub start_row: usize,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            title_row: 1,
            type_row: 2,
            default_row: 4,
            start_row: 5,
        }
    }
}

impl SheetLayout {
    pub fn with_start_row(start_row: usize) -> Self {
        Self {
            start_row,
            ..Self::default()
        }
    }

    /// Fewest rows a data sheet may have.
    pub fn min_rows(&self) -> usize {
        self.start_row.max(self.default_row + 1)
    }
}

/// Derives the sheet's columns from its title and type rows, in
/// first-appearance order.
///
/// Columns with a blank title, or a blank annotation, are skipped. A title
/// seen twice becomes a repeated column; its first declared scalar type is
/// kept.
pub fn infer_columns(title_row: &Row, type_row: &Row) -> Vec<ColumnSpec> {
    let mut columns: Vec<ColumnSpec> = Vec::new();

    for (col, raw_title) in title_row.cells().iter().enumerate() {
        let title = raw_title.trim();
        if title.is_empty() {
            continue;
        }
        let annotation = type_row.cell(col).trim();
        if annotation.is_empty() {
            warn!(column = title, index = col, "column has no type annotation, skipped");
            continue;
        }

        let (scalar, list) = ScalarType::from_annotation(annotation);
        match columns.iter_mut().find(|c| c.name == title) {
            Some(existing) => {
                if existing.scalar != scalar {
                    warn!(
                        column = title,
                        kept = existing.scalar.proto_name(),
                        ignored = scalar.proto_name(),
                        "duplicate column declares a different type, first type kept"
                    );
                }
                existing.repeated = true;
            }
            None => columns.push(ColumnSpec::new(title, scalar, list)),
        }
    }

    columns
}
