//! Spreadsheet -> schema documents with stable field ids.

use crate::cache::{ContentCache, TableVersion, SCHEMA_CACHE_FILE};
use crate::codegen::{BindingGenerator, ProtocGenerator};
use crate::source::{ContentDigest, Source};
use crate::tables::{data_sheet, listed_sheets, open_workbook};
use crate::workers::{fan_out, join};
use crate::CompileError;
use config::CompilerConfig;
use idgen::IdAllocator;
use parking_lot::Mutex;
use schema::{
    document_file_name, find_message, infer_columns, is_identifier, message_name, render_document,
    ColumnSpec, SheetLayout, SheetSchema, COMBINED_DOCUMENT,
};
use sheet::Row;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use store::write_atomic;
use tracing::{debug, info};

/// Schemas of one workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchemas {
    pub file_name: String,
    pub table: String,
    pub digest: ContentDigest,
    /// Compiled sheet names, parallel to `schemas`.
    pub sheets: Vec<String>,
    pub schemas: Vec<SheetSchema>,
    /// Reused from the schema cache without opening the workbook.
    pub cached: bool,
}

impl TableSchemas {
    /// `(file name, text)` of each per-sheet document.
    pub fn documents(&self) -> Vec<(String, String)> {
        self.schemas
            .iter()
            .map(|s| (document_file_name(&s.message_name), render_document([s])))
            .collect()
    }
}

/// Outcome of a schema compile.
#[derive(Debug, Clone, Default)]
pub struct SchemaRun {
    pub tables: Vec<TableSchemas>,
    /// Path of the combined document.
    pub combined: PathBuf,
    /// Field ids allocated by this run.
    pub new_ids: usize,
}

impl SchemaRun {
    pub fn schemas(&self) -> impl Iterator<Item = &SheetSchema> {
        self.tables.iter().flat_map(|t| t.schemas.iter())
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.cached).count()
    }

    pub fn sheet_count(&self) -> usize {
        self.tables.iter().map(|t| t.schemas.len()).sum()
    }
}

/// State the workers share. Held only for single id allocations and
/// cache lookups.
struct Shared {
    ids: IdAllocator,
    cache: ContentCache,
}

/// Compiles workbooks into schema documents.
///
/// Workers build every document in memory against a copy of the id
/// allocator. Documents, the combined schema, the schema cache and the id
/// file are written only after every workbook succeeded.
pub struct SchemaCompiler<'a> {
    config: &'a CompilerConfig,
    generator: Option<&'a dyn BindingGenerator>,
}

impl<'a> SchemaCompiler<'a> {
    pub fn new(config: &'a CompilerConfig) -> Self {
        Self {
            config,
            generator: None,
        }
    }

    /// Generator used when `bindings_dir` is set. Defaults to `protoc`.
    pub fn with_generator(mut self, generator: &'a dyn BindingGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn compile(&self, sources: &[Source]) -> Result<SchemaRun, CompileError> {
        let proto_dir = self.config.proto_dir();
        let id_file = self.config.id_file();
        let cache_path = proto_dir.join(SCHEMA_CACHE_FILE);
        let layout = SheetLayout::with_start_row(self.config.start_row);

        let ids = IdAllocator::load(&id_file).map_err(|e| CompileError::Persist {
            what: "field ids".into(),
            detail: e.to_string(),
        })?;
        let ids_before = ids.len();
        let cache = ContentCache::load(&cache_path)?;
        let shared = Mutex::new(Shared { ids, cache });

        let results = fan_out(
            self.config.workers,
            sources.iter().collect(),
            |s: &&Source| s.file_name.clone(),
            |s: &Source| self.compile_table(s, &shared, &proto_dir, &layout),
        )?;
        let mut tables = join(results)?;
        tables.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        check_unique_messages(&tables)?;

        let Shared { ids, mut cache } = shared.into_inner();
        for t in tables.iter().filter(|t| !t.cached) {
            let mut artifacts = Vec::with_capacity(t.schemas.len());
            for (name, text) in t.documents() {
                let path = proto_dir.join(&name);
                write_atomic(&path, text.as_bytes()).map_err(|e| CompileError::io(&path, e))?;
                artifacts.push(name);
            }
            cache.insert(t.file_name.clone(), TableVersion::new(&t.digest, t.sheets.clone(), artifacts));
        }

        let combined = proto_dir.join(COMBINED_DOCUMENT);
        let all: Vec<&SheetSchema> = tables.iter().flat_map(|t| t.schemas.iter()).collect();
        write_atomic(&combined, render_document(all).as_bytes()).map_err(|e| CompileError::io(&combined, e))?;

        if let Some(export_dir) = &self.config.export_dir {
            for t in &tables {
                for (name, text) in t.documents() {
                    let path = export_dir.join(name);
                    write_atomic(&path, text.as_bytes()).map_err(|e| CompileError::io(&path, e))?;
                }
            }
        }

        cache.save(&cache_path)?;
        ids.save(&id_file).map_err(|e| CompileError::Persist {
            what: "field ids".into(),
            detail: e.to_string(),
        })?;

        let run = SchemaRun {
            new_ids: ids.len() - ids_before,
            tables,
            combined,
        };
        info!(
            tables = run.tables.len(),
            cached = run.cached_tables(),
            sheets = run.sheet_count(),
            new_ids = run.new_ids,
            "schemas written"
        );

        if let Some(out_dir) = &self.config.bindings_dir {
            let default_generator = ProtocGenerator::default();
            let generator: &dyn BindingGenerator = match self.generator {
                Some(g) => g,
                None => &default_generator,
            };
            generator.generate(&run.combined, out_dir)?;
        }
        Ok(run)
    }

    fn compile_table(
        &self,
        source: &Source,
        shared: &Mutex<Shared>,
        proto_dir: &Path,
        layout: &SheetLayout,
    ) -> Result<TableSchemas, CompileError> {
        let table = source.table();
        let digest = source.digest();

        let hit = shared.lock().cache.fresh(&source.file_name, &digest).cloned();
        if let Some(version) = hit {
            match load_cached(&version, proto_dir) {
                Ok(schemas) => {
                    info!(table = %table, sheets = schemas.len(), "schema unchanged, reusing cached documents");
                    return Ok(TableSchemas {
                        file_name: source.file_name.clone(),
                        table,
                        digest,
                        sheets: version.sheets,
                        schemas,
                        cached: true,
                    });
                }
                Err(detail) => debug!(table = %table, %detail, "schema cache entry unusable"),
            }
        }

        let workbook = open_workbook(source, &table)?;
        let empty = Row::default();
        let mut sheets = Vec::new();
        let mut schemas = Vec::new();
        for name in listed_sheets(&workbook, &table)? {
            let Some(sheet) = data_sheet(&workbook, &table, &name, layout)? else {
                continue;
            };
            let columns = infer_columns(
                sheet.row(layout.title_row).unwrap_or(&empty),
                sheet.row(layout.type_row).unwrap_or(&empty),
            );
            let message = message_name(&table, &name);
            check_identifiers(&table, &name, &message, &columns)?;
            let schema = SheetSchema::build(message, columns, |col| {
                shared
                    .lock()
                    .ids
                    .field_id(&table, &name, &col.name, &col.type_signature())
            })
            .map_err(|e| CompileError::structural(&table, format!("sheet {name}: {e}")))?;
            debug!(table = %table, sheet = %name, fields = schema.columns.len(), "sheet schema inferred");
            sheets.push(name);
            schemas.push(schema);
        }

        info!(table = %table, sheets = schemas.len(), "schema compiled");
        Ok(TableSchemas {
            file_name: source.file_name.clone(),
            table,
            digest,
            sheets,
            schemas,
            cached: false,
        })
    }
}

/// Names end up verbatim in schema documents, which only read back
/// identifiers.
fn check_identifiers(table: &str, sheet: &str, message: &str, columns: &[ColumnSpec]) -> Result<(), CompileError> {
    if !is_identifier(message) {
        return Err(CompileError::structural(
            table,
            format!("sheet {sheet}: message name {message:?} is not a valid identifier"),
        ));
    }
    match columns.iter().find(|c| !is_identifier(&c.name)) {
        Some(col) => Err(CompileError::structural(
            table,
            format!("sheet {sheet}: column title {:?} is not a valid identifier", col.name),
        )),
        None => Ok(()),
    }
}

/// Every message name of a run must come from exactly one (workbook, sheet).
fn check_unique_messages(tables: &[TableSchemas]) -> Result<(), CompileError> {
    let mut owners: BTreeMap<&str, (&str, &str)> = BTreeMap::new();
    let mut clashes = Vec::new();
    for t in tables {
        for (sheet, schema) in t.sheets.iter().zip(&t.schemas) {
            let name = schema.message_name.as_str();
            match owners.get(name) {
                Some((file, other_sheet)) => clashes.push(CompileError::structural(
                    &t.table,
                    format!(
                        "message {name} of {}/{sheet} clashes with {file}/{other_sheet}",
                        t.file_name
                    ),
                )),
                None => {
                    owners.insert(name, (t.file_name.as_str(), sheet.as_str()));
                }
            }
        }
    }
    if clashes.is_empty() {
        Ok(())
    } else {
        Err(CompileError::Failed(clashes))
    }
}

/// Re-reads the documents a cache entry lists.
fn load_cached(version: &TableVersion, proto_dir: &Path) -> Result<Vec<SheetSchema>, String> {
    if version.sheets.len() != version.artifacts.len() {
        return Err("sheet and artifact lists differ in length".into());
    }
    version
        .artifacts
        .iter()
        .map(|artifact| {
            let message = artifact.strip_suffix(".proto").unwrap_or(artifact);
            let text = std::fs::read_to_string(proto_dir.join(artifact)).map_err(|e| format!("{artifact}: {e}"))?;
            find_message(&text, message).map_err(|e| format!("{artifact}: {e}"))
        })
        .collect()
}
