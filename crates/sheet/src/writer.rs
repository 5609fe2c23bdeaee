use crate::cellref::cell_ref;
use crate::SheetError;
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const SHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const SHARED_STRINGS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

/// Builds minimal `.xlsx` workbooks from rows of text.
///
/// ```
/// let bytes = sheet::WorkbookWriter::new()
///     .sheet("list", [["Items"]])
///     .sheet("Items", [["", "id"], ["", "int"]])
///     .to_bytes()
///     .unwrap();
/// let wb = sheet::Workbook::from_bytes(&bytes).unwrap();
/// assert_eq!(wb.sheet("Items").unwrap().cell(1, 1), "id");
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkbookWriter {
    sheets: Vec<(String, Vec<Vec<String>>)>,
    shared_strings: bool,
}

impl WorkbookWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sheet. Empty strings leave the cell unwritten.
    pub fn sheet<R, C, S>(mut self, name: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(Into::into).collect())
            .collect();
        self.sheets.push((name.to_string(), rows));
        self
    }

    /// Store text in a shared string table instead of inline, the way
    /// spreadsheet applications save it.
    pub fn shared_strings(mut self, on: bool) -> Self {
        self.shared_strings = on;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SheetError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let io = |e: std::io::Error| SheetError::Archive(e.into());

        let mut table = SharedTable::default();
        let mut worksheets = Vec::with_capacity(self.sheets.len());
        for (_, rows) in &self.sheets {
            let shared = self.shared_strings.then_some(&mut table);
            worksheets.push(worksheet_xml(rows, shared));
        }

        let mut types = String::from(CONTENT_TYPES_HEAD);
        for i in 1..=self.sheets.len() {
            let _ = write!(
                types,
                r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            );
        }
        if self.shared_strings {
            types.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
        }
        types.push_str("</Types>");

        zip.start_file("[Content_Types].xml", opts)?;
        zip.write_all(types.as_bytes()).map_err(io)?;
        zip.start_file("_rels/.rels", opts)?;
        zip.write_all(ROOT_RELS.as_bytes()).map_err(io)?;
        zip.start_file("xl/workbook.xml", opts)?;
        zip.write_all(self.workbook_xml().as_bytes()).map_err(io)?;
        zip.start_file("xl/_rels/workbook.xml.rels", opts)?;
        zip.write_all(self.workbook_rels_xml().as_bytes()).map_err(io)?;
        for (i, xml) in worksheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)?;
            zip.write_all(xml.as_bytes()).map_err(io)?;
        }
        if self.shared_strings {
            zip.start_file("xl/sharedStrings.xml", opts)?;
            zip.write_all(table.to_xml().as_bytes()).map_err(io)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SheetError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|source| SheetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn workbook_xml(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{SHEET_NS}" xmlns:r="{REL_NS}"><sheets>"#
        );
        for (i, (name, _)) in self.sheets.iter().enumerate() {
            let n = i + 1;
            let _ = write!(
                xml,
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                escape(name.as_str())
            );
        }
        xml.push_str("</sheets></workbook>");
        xml
    }

    fn workbook_rels_xml(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{PKG_REL_NS}">"#
        );
        for n in 1..=self.sheets.len() {
            let _ = write!(
                xml,
                r#"<Relationship Id="rId{n}" Type="{WORKSHEET_REL}" Target="worksheets/sheet{n}.xml"/>"#
            );
        }
        if self.shared_strings {
            let n = self.sheets.len() + 1;
            let _ = write!(
                xml,
                r#"<Relationship Id="rId{n}" Type="{SHARED_STRINGS_REL}" Target="sharedStrings.xml"/>"#
            );
        }
        xml.push_str("</Relationships>");
        xml
    }
}

#[derive(Default)]
struct SharedTable {
    strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl SharedTable {
    fn intern(&mut self, text: &str) -> usize {
        if let Some(&i) = self.index.get(text) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(text.to_string());
        self.index.insert(text.to_string(), i);
        i
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{SHEET_NS}" count="{n}" uniqueCount="{n}">"#,
            n = self.strings.len()
        );
        for s in &self.strings {
            let _ = write!(xml, r#"<si><t xml:space="preserve">{}</t></si>"#, escape(s.as_str()));
        }
        xml.push_str("</sst>");
        xml
    }
}

fn worksheet_xml(rows: &[Vec<String>], mut shared: Option<&mut SharedTable>) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{SHEET_NS}"><sheetData>"#
    );
    for (r, cells) in rows.iter().enumerate() {
        if cells.iter().all(String::is_empty) {
            continue;
        }
        let _ = write!(xml, r#"<row r="{}">"#, r + 1);
        for (c, text) in cells.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let at = cell_ref(r, c);
            match shared.as_deref_mut() {
                Some(table) => {
                    let idx = table.intern(text);
                    let _ = write!(xml, r#"<c r="{at}" t="s"><v>{idx}</v></c>"#);
                }
                None => {
                    let _ = write!(
                        xml,
                        r#"<c r="{at}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        escape(text.as_str())
                    );
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}
