use crate::source::Source;
use crate::CompileError;
use schema::SheetLayout;
use sheet::{Sheet, Workbook};
use tracing::warn;

/// Name of the meta-sheet listing a workbook's data sheets.
pub const LIST_SHEET: &str = "list";

pub(crate) fn open_workbook(source: &Source, table: &str) -> Result<Workbook, CompileError> {
    Workbook::from_bytes(&source.bytes)
        .map_err(|e| CompileError::structural(table, format!("unreadable workbook {}: {e}", source.file_name)))
}

/// Data sheet names from column 0 of every `list` row, trimmed, blanks and
/// repeats skipped.
pub(crate) fn listed_sheets(workbook: &Workbook, table: &str) -> Result<Vec<String>, CompileError> {
    let list = workbook
        .sheet(LIST_SHEET)
        .ok_or_else(|| CompileError::structural(table, "workbook has no `list` sheet"))?;
    let mut names: Vec<String> = Vec::new();
    for row in list.rows() {
        let name = row.cell(0).trim();
        if name.is_empty() {
            continue;
        }
        if names.iter().any(|n| n == name) {
            warn!(table, sheet = name, "sheet listed twice, ignoring repeat");
            continue;
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// The data sheet `name`, or `None` (with a warning) if the workbook lacks it.
///
/// A sheet that exists but is shorter than the layout requires is a
/// structural error.
pub(crate) fn data_sheet<'w>(
    workbook: &'w Workbook,
    table: &str,
    name: &str,
    layout: &SheetLayout,
) -> Result<Option<&'w Sheet>, CompileError> {
    let Some(sheet) = workbook.sheet(name) else {
        warn!(table, sheet = name, "listed sheet not found in workbook, skipping");
        return Ok(None);
    };
    if sheet.row_count() < layout.min_rows() {
        return Err(CompileError::structural(
            table,
            format!(
                "sheet {name} has {} rows, at least {} required",
                sheet.row_count(),
                layout.min_rows()
            ),
        ));
    }
    Ok(Some(sheet))
}
