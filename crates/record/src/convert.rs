use crate::{ConversionError, Record, Value, CONSTANT_KEY};
use schema::{is_key_title, ScalarType, SheetLayout, SheetSchema};
use sheet::{cell_ref, Row, Sheet};

/// A physical sheet column bound to its schema field.
#[derive(Debug)]
struct BoundColumn {
    index: usize,
    title: String,
    field: String,
    scalar: ScalarType,
    repeated: bool,
    /// This column's own annotation is `*_list`.
    list: bool,
    default: String,
}

/// Converts the data rows of one sheet into records.
///
/// Columns are bound once, from the title and type rows, so a schema read
/// back from disk and a freshly inferred one convert rows identically.
#[derive(Debug)]
pub struct RowConverter {
    table: String,
    sheet: String,
    columns: Vec<BoundColumn>,
    /// Position in `columns` of the key column.
    key: Option<usize>,
    start_row: usize,
}

impl RowConverter {
    pub fn new(table: &str, sheet: &Sheet, schema: &SheetSchema, layout: SheetLayout) -> Self {
        let empty = Row::default();
        let title_row = sheet.row(layout.title_row).unwrap_or(&empty);
        let type_row = sheet.row(layout.type_row).unwrap_or(&empty);
        let default_row = sheet.row(layout.default_row).unwrap_or(&empty);

        let mut columns = Vec::new();
        for (index, raw_title) in title_row.cells().iter().enumerate() {
            let title = raw_title.trim();
            let annotation = type_row.cell(index).trim();
            if title.is_empty() || annotation.is_empty() {
                continue;
            }
            let Some(spec) = schema.column(title) else {
                continue;
            };
            let (_, list) = ScalarType::from_annotation(annotation);
            columns.push(BoundColumn {
                index,
                title: title.to_string(),
                field: spec.name.clone(),
                scalar: spec.scalar,
                repeated: spec.repeated,
                list: list && spec.repeated,
                default: default_row.cell(index).to_string(),
            });
        }

        let key = columns.iter().position(|c| is_key_title(&c.title));
        Self {
            table: table.to_string(),
            sheet: sheet.name().to_string(),
            columns,
            key,
            start_row: layout.start_row,
        }
    }

    /// `true` when the sheet has no key column.
    pub fn is_constant(&self) -> bool {
        self.key.is_none()
    }

    /// Converts the row at 0-based index `row_index`.
    ///
    /// Returns `Ok(None)` for rows that carry no record: rows without a
    /// usable key, and every row but the first data row of a constant table.
    pub fn convert(&self, row_index: usize, row: &Row) -> Result<Option<Record>, ConversionError> {
        let key = match self.key {
            Some(pos) => match self.cell_text(&self.columns[pos], row) {
                Some(text) if text.trim() != "0" => text.trim().to_string(),
                _ => return Ok(None),
            },
            None if row_index == self.start_row => CONSTANT_KEY.to_string(),
            None => return Ok(None),
        };

        let mut record = Record::new(key);
        for col in &self.columns {
            let Some(text) = self.cell_text(col, row) else {
                continue;
            };
            let err = |expected: &'static str, raw: &str, reason: String| ConversionError {
                table: self.table.clone(),
                sheet: self.sheet.clone(),
                row: row_index + 1,
                column: col.index + 1,
                cell: cell_ref(row_index, col.index),
                title: col.title.clone(),
                expected,
                raw: raw.to_string(),
                reason,
            };

            if col.list {
                append_list(&mut record, col, text)
                    .map_err(|reason| err(col.scalar.proto_name(), text, reason))?;
            } else {
                let value = parse_scalar(col.scalar, text)
                    .map_err(|reason| err(col.scalar.proto_name(), text, reason))?;
                if col.repeated {
                    push_value(&mut record, &col.field, value);
                } else {
                    record.set(col.field.clone(), value);
                }
            }
        }

        // empty lists are stored as absent fields
        record.fields.retain(|_, v| !v.is_empty());
        Ok(Some(record))
    }

    /// Effective text of a cell after default substitution, or `None` when
    /// the field stays unset.
    fn cell_text<'r>(&'r self, col: &'r BoundColumn, row: &'r Row) -> Option<&'r str> {
        let raw = row.cell(col.index);
        let text = if raw.trim().is_empty() {
            if col.default.trim().is_empty() {
                return None;
            }
            col.default.as_str()
        } else {
            raw
        };
        if text.trim_start().starts_with("**") {
            None
        } else {
            Some(text)
        }
    }
}

fn parse_scalar(scalar: ScalarType, text: &str) -> Result<Value, String> {
    let t = text.trim();
    Ok(match scalar {
        ScalarType::Bool => Value::Bool(parse_bool(t)?),
        ScalarType::Int32 => Value::Int32(t.parse().map_err(|e| format!("{e}"))?),
        ScalarType::Float32 => Value::Float32(t.parse().map_err(|e| format!("{e}"))?),
        ScalarType::String => Value::Str(text.to_string()),
    })
}

fn parse_bool(t: &str) -> Result<bool, String> {
    match t {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err("not a boolean".to_string()),
    }
}

/// Splits a list cell and appends every element.
fn append_list(record: &mut Record, col: &BoundColumn, text: &str) -> Result<(), String> {
    for token in text.split(',') {
        let value = if col.scalar == ScalarType::String {
            Value::Str(token.to_string())
        } else {
            if token.trim().is_empty() {
                continue;
            }
            parse_scalar(col.scalar, token).map_err(|reason| format!("element {:?}: {reason}", token.trim()))?
        };
        push_value(record, &col.field, value);
    }
    Ok(())
}

/// Appends a scalar to the list held under `field`, creating it on first use.
fn push_value(record: &mut Record, field: &str, value: Value) {
    let slot = record.fields.entry(field.to_string());
    let list = slot.or_insert_with(|| match &value {
        Value::Bool(_) => Value::BoolList(Vec::new()),
        Value::Int32(_) => Value::Int32List(Vec::new()),
        Value::Float32(_) => Value::Float32List(Vec::new()),
        _ => Value::StrList(Vec::new()),
    });
    match (list, value) {
        (Value::BoolList(l), Value::Bool(v)) => l.push(v),
        (Value::Int32List(l), Value::Int32(v)) => l.push(v),
        (Value::Float32List(l), Value::Float32(v)) => l.push(v),
        (Value::StrList(l), Value::Str(v)) => l.push(v),
        _ => {}
    }
}
