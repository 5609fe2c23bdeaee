//! Sheet rows -> content-named store files.
//!
//! ```text
//! rows --convert--> StagingTable --StoreBackup--> <label>.db.tmp --verify--> <table>_<sheet>_<md5><len>.db
//! ```
//!
//! Two cache levels keep unchanged workbooks cheap:
//! 1. the store cache maps `<file>_<md5>` to its stores; if they all still
//!    exist the workbook is not even opened;
//! 2. otherwise each sheet's final store name is checked before the sheet
//!    is rebuilt.

use crate::cache::{store_cache_key, ContentCache, TableVersion, STORE_CACHE_FILE};
use crate::manifest::{ManifestEntry, VersionManifest, MANIFEST_FILE};
use crate::source::{ContentDigest, Source};
use crate::tables::{data_sheet, listed_sheets, open_workbook};
use crate::workers::{fan_out, join};
use crate::CompileError;
use config::CompilerConfig;
use record::{encode, RowConverter};
use schema::{document_file_name, find_message, message_name, SheetLayout, SheetSchema};
use sheet::Sheet;
use staging::StagingTable;
use std::path::{Path, PathBuf};
use store::StoreWriter;
use tracing::{debug, info};

/// `<table>_<sheet>_<md5><len>.db`
pub fn store_file_name(table: &str, sheet: &str, digest: &ContentDigest) -> String {
    format!("{table}_{sheet}_{}.db", digest.tag())
}

/// Outcome of a store build.
#[derive(Debug, Clone, Default)]
pub struct StoreRun {
    pub manifest: VersionManifest,
    pub manifest_path: PathBuf,
    /// Stores written by this run.
    pub built: usize,
    /// Sheets whose content-named store already existed.
    pub reused: usize,
    /// Workbooks skipped through the store cache.
    pub skipped_tables: usize,
    /// Records written across all built stores.
    pub records: u64,
}

struct TableStores {
    file_name: String,
    digest: ContentDigest,
    from_cache: bool,
    sheets: Vec<String>,
    stores: Vec<String>,
    built: usize,
    reused: usize,
    records: u64,
}

impl TableStores {
    fn entries(&self, table: &str) -> impl Iterator<Item = ManifestEntry> + '_ {
        let table = table.to_string();
        self.sheets
            .iter()
            .zip(&self.stores)
            .map(move |(sheet, store)| ManifestEntry::new(&table, sheet, store.clone()))
    }
}

/// Builds one store per listed sheet and writes the version manifest.
///
/// Workers only read the store cache. The cache and the manifest are
/// rewritten after every workbook succeeded; on any failure neither is
/// touched. Stores already published stay, since their names are cache
/// keys.
pub struct StoreBuilder<'a> {
    config: &'a CompilerConfig,
}

impl<'a> StoreBuilder<'a> {
    pub fn new(config: &'a CompilerConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, sources: &[Source]) -> Result<StoreRun, CompileError> {
        let store_dir = self.config.store_dir();
        let proto_dir = self.config.proto_dir();
        std::fs::create_dir_all(&store_dir).map_err(|e| CompileError::io(&store_dir, e))?;
        let cache_path = store_dir.join(STORE_CACHE_FILE);
        let mut cache = ContentCache::load(&cache_path)?;
        let layout = SheetLayout::with_start_row(self.config.start_row);

        let results = fan_out(
            self.config.workers,
            sources.iter().collect(),
            |s: &&Source| s.file_name.clone(),
            |s: &Source| self.build_table(s, &cache, &store_dir, &proto_dir, &layout),
        )?;
        let tables = join(results)?;

        let mut run = StoreRun::default();
        let mut entries = Vec::new();
        for t in &tables {
            entries.extend(t.entries(&schema::table_base_name(&t.file_name)));
            run.built += t.built;
            run.reused += t.reused;
            run.records += t.records;
            if t.from_cache {
                run.skipped_tables += 1;
                continue;
            }
            cache.retain_current(&t.file_name, &t.digest);
            cache.insert(
                store_cache_key(&t.file_name, &t.digest),
                TableVersion::new(&t.digest, t.sheets.clone(), t.stores.clone()),
            );
        }
        cache.save(&cache_path)?;

        run.manifest = VersionManifest::new(entries);
        run.manifest_path = store_dir.join(MANIFEST_FILE);
        run.manifest.save(&run.manifest_path)?;
        info!(
            built = run.built,
            reused = run.reused,
            skipped_tables = run.skipped_tables,
            records = run.records,
            "stores written"
        );
        Ok(run)
    }

    fn build_table(
        &self,
        source: &Source,
        cache: &ContentCache,
        store_dir: &Path,
        proto_dir: &Path,
        layout: &SheetLayout,
    ) -> Result<TableStores, CompileError> {
        let table = source.table();
        let digest = source.digest();
        let key = store_cache_key(&source.file_name, &digest);

        if let Some(version) = cache.fresh(&key, &digest) {
            if version.sheets.len() == version.artifacts.len() && version.artifacts_exist(store_dir) {
                info!(table = %table, stores = version.artifacts.len(), "workbook unchanged, skipping");
                return Ok(TableStores {
                    file_name: source.file_name.clone(),
                    digest,
                    from_cache: true,
                    sheets: version.sheets.clone(),
                    stores: version.artifacts.clone(),
                    built: 0,
                    reused: 0,
                    records: 0,
                });
            }
        }

        let workbook = open_workbook(source, &table)?;
        let mut out = TableStores {
            file_name: source.file_name.clone(),
            digest,
            from_cache: false,
            sheets: Vec::new(),
            stores: Vec::new(),
            built: 0,
            reused: 0,
            records: 0,
        };
        for name in listed_sheets(&workbook, &table)? {
            let Some(sheet) = data_sheet(&workbook, &table, &name, layout)? else {
                continue;
            };
            let store_name = store_file_name(&table, &name, &out.digest);
            let dest = store_dir.join(&store_name);
            if dest.is_file() {
                debug!(table = %table, sheet = %name, store = %store_name, "store exists, reusing");
                out.reused += 1;
            } else {
                let schema = load_schema(proto_dir, &table, &name)?;
                let records = build_sheet(&table, &name, sheet, &schema, layout, &dest)?;
                info!(table = %table, sheet = %name, records, store = %store_name, "store built");
                out.built += 1;
                out.records += records;
            }
            out.sheets.push(name);
            out.stores.push(store_name);
        }
        Ok(out)
    }
}

/// Reads the per-sheet schema document written by the schema compiler.
pub fn load_schema(proto_dir: &Path, table: &str, sheet: &str) -> Result<SheetSchema, CompileError> {
    let message = message_name(table, sheet);
    let document = document_file_name(&message);
    let missing = |detail: String| CompileError::SchemaMissing {
        table: table.to_string(),
        sheet: sheet.to_string(),
        document: document.clone(),
        detail,
    };
    let text = std::fs::read_to_string(proto_dir.join(&document)).map_err(|e| missing(e.to_string()))?;
    find_message(&text, &message).map_err(|e| missing(e.to_string()))
}

/// Converts every data row of `sheet` and persists the records at `dest`.
/// Returns the record count.
fn build_sheet(
    table: &str,
    sheet_name: &str,
    sheet: &Sheet,
    schema: &SheetSchema,
    layout: &SheetLayout,
    dest: &Path,
) -> Result<u64, CompileError> {
    let converter = RowConverter::new(table, sheet, schema, *layout);
    let mut staging = StagingTable::for_sheet(table, sheet_name);
    for (i, row) in sheet.rows().iter().enumerate().skip(layout.start_row) {
        let Some(rec) = converter.convert(i, row)? else {
            continue;
        };
        let bytes = encode(schema, &rec);
        if !staging.insert(rec.key.clone().into_bytes(), bytes) {
            return Err(CompileError::DuplicateKey {
                table: table.to_string(),
                sheet: sheet_name.to_string(),
                row: i + 1,
                key: rec.key,
            });
        }
    }
    persist_staging(&staging, dest)
}

/// Staged backup of a complete table into `dest`.
///
/// The copy goes to a temp file named after the staging label. It is
/// renamed to `dest` only when the backup reports every record copied and
/// the reopened file declares the same count. Otherwise the temp file is
/// removed and `dest` never appears.
pub(crate) fn persist_staging(staging: &StagingTable, dest: &Path) -> Result<u64, CompileError> {
    let tmp = dest.with_file_name(format!("{}.db.tmp", staging.label()));
    StoreWriter::write_via(staging, &tmp, dest).map_err(|e| CompileError::StoreIntegrity {
        store: dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        detail: format!("{e:#}"),
    })
}
