use crate::cellref::{cell_ref, column_index, row_index, MAX_COLUMNS, MAX_ROWS};
use crate::{Row, Sheet, SheetError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

pub(crate) fn read_workbook(bytes: &[u8]) -> Result<Vec<Sheet>, SheetError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let workbook = read_part(&mut archive, WORKBOOK_PART)?
        .ok_or_else(|| SheetError::MissingPart(WORKBOOK_PART.to_string()))?;
    let rels = read_part(&mut archive, WORKBOOK_RELS_PART)?
        .ok_or_else(|| SheetError::MissingPart(WORKBOOK_RELS_PART.to_string()))?;
    let shared = match read_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let targets = parse_relationships(&rels)?;
    let mut sheets = Vec::new();
    for (name, rel_id) in parse_sheet_list(&workbook)? {
        let target = targets.get(&rel_id).ok_or_else(|| SheetError::Xml {
            part: WORKBOOK_RELS_PART.to_string(),
            detail: format!("no relationship {rel_id} for sheet '{name}'"),
        })?;
        let part = resolve_target(target);
        let xml = read_part(&mut archive, &part)?
            .ok_or_else(|| SheetError::MissingPart(part.clone()))?;
        let rows = parse_worksheet(&part, &xml, &shared)?;
        sheets.push(Sheet::new(name, rows));
    }
    Ok(sheets)
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Option<String>, SheetError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|e| SheetError::Xml {
        part: name.to_string(),
        detail: e.to_string(),
    })?;
    Ok(Some(text))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("xl/{target}"),
    }
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> SheetError {
    SheetError::Xml {
        part: part.to_string(),
        detail: e.to_string(),
    }
}

/// Value of the attribute whose local name (prefix stripped) is `local`.
fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// `(sheet name, relationship id)` pairs in workbook order.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, SheetError> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                let name = attr(e, b"name");
                let id = attr(e, b"id");
                match (name, id) {
                    (Some(name), Some(id)) => out.push((name, id)),
                    _ => return Err(xml_error(WORKBOOK_PART, "sheet without name or r:id")),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_PART, e)),
            _ => {}
        }
    }
    Ok(out)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, SheetError> {
    let mut reader = Reader::from_str(xml);
    let mut out = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    out.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_RELS_PART, e)),
            _ => {}
        }
    }
    Ok(out)
}

/// Shared strings in index order. Rich-text runs are concatenated; phonetic
/// hints (`rPh`) are dropped.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, SheetError> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut phonetic_depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => out.push(String::new()),
            Ok(Event::Text(ref e)) if in_t => {
                let text = e.unescape().map_err(|e| xml_error(SHARED_STRINGS_PART, e))?;
                current.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => out.push(std::mem::take(&mut current)),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(SHARED_STRINGS_PART, e)),
            _ => {}
        }
    }
    Ok(out)
}

/// Cell currently being read inside `<c>..</c>`.
#[derive(Default)]
struct OpenCell {
    col: usize,
    kind: Option<String>,
    value: String,
}

/// Positions come from `r` attributes and are checked before rows or cells
/// are allocated for them.
fn check_position(part: &str, row: usize, col: usize) -> Result<(), SheetError> {
    if row < MAX_ROWS && col < MAX_COLUMNS {
        return Ok(());
    }
    let reference = if col < MAX_COLUMNS {
        cell_ref(row, col)
    } else {
        format!("row {} column {}", row.saturating_add(1), col.saturating_add(1))
    };
    Err(SheetError::Xml {
        part: part.to_string(),
        detail: format!("cell {reference} lies outside the {MAX_ROWS} x {MAX_COLUMNS} grid"),
    })
}

fn parse_worksheet(part: &str, xml: &str, shared: &[String]) -> Result<Vec<Row>, SheetError> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Row> = Vec::new();
    let mut row_idx = 0usize;
    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut cell: Option<OpenCell> = None;
    let mut capture = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = attr(e, b"r").and_then(|r| row_index(&r)).unwrap_or(next_row);
                    next_row = row_idx + 1;
                    next_col = 0;
                }
                b"c" => {
                    let col = attr(e, b"r").and_then(|r| column_index(&r)).unwrap_or(next_col);
                    next_col = col + 1;
                    cell = Some(OpenCell {
                        col,
                        kind: attr(e, b"t"),
                        value: String::new(),
                    });
                }
                b"rPh" => phonetic_depth += 1,
                b"v" | b"t" if cell.is_some() && phonetic_depth == 0 => capture = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = attr(e, b"r").and_then(|r| row_index(&r)).unwrap_or(next_row);
                    next_row = row_idx + 1;
                }
                b"c" => {
                    let col = attr(e, b"r").and_then(|r| column_index(&r)).unwrap_or(next_col);
                    next_col = col + 1;
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if capture => {
                let text = e.unescape().map_err(|e| xml_error(part, e))?;
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => {
                    if let Some(c) = cell.take() {
                        let text = resolve_cell(part, c.kind.as_deref(), c.value, shared)?;
                        if !text.is_empty() {
                            check_position(part, row_idx, c.col)?;
                            if rows.len() <= row_idx {
                                rows.resize_with(row_idx + 1, Row::default);
                            }
                            rows[row_idx].set(c.col, text);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
    }
    Ok(rows)
}

fn resolve_cell(
    part: &str,
    kind: Option<&str>,
    raw: String,
    shared: &[String],
) -> Result<String, SheetError> {
    match kind {
        Some("s") => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| xml_error(part, format!("bad shared string index {raw:?}")))?;
            shared
                .get(idx)
                .cloned()
                .ok_or_else(|| xml_error(part, format!("shared string {idx} out of range")))
        }
        Some("b") => Ok(match raw.trim() {
            "1" => "true".to_string(),
            "0" => "false".to_string(),
            _ => raw,
        }),
        // inlineStr, str, n, e, d and untyped cells carry their text directly
        _ => Ok(raw),
    }
}
