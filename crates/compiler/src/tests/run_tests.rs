use super::fixtures::*;
use crate::bundle::{self, compile_bundle};
use crate::*;
use idgen::IdAllocator;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const ITEMS_DOCUMENT: &str = "syntax = \"proto3\";\n\npackage conf;\n\n\
message confpbItemsItems {\n  int32 id = 1;\n  string name = 2;\n  repeated int32 count = 3;\n}\n";

// -------------------- Schema documents --------------------

#[test]
fn items_schema_document_and_ids() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let run = Compiler::new(cfg.clone()).compile_schemas(&[items_source()]).unwrap();

    assert_eq!(run.sheet_count(), 1);
    assert_eq!(run.new_ids, 3);
    let doc = std::fs::read_to_string(cfg.proto_dir().join("confpbItemsItems.proto")).unwrap();
    assert_eq!(doc, ITEMS_DOCUMENT);
    let combined = std::fs::read_to_string(&run.combined).unwrap();
    assert_eq!(combined, ITEMS_DOCUMENT);

    let ids = IdAllocator::load(&cfg.id_file()).unwrap();
    assert_eq!(ids.get("TypeField#Items", "Items#count#int32_array"), Some(3));
}

#[test]
fn combined_document_is_sorted_by_message() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let weapons = vec![vec![], vec!["id"], vec!["int"], vec![], vec![], vec!["7"]];
    let sources = vec![
        Source::new("Zoo.xlsx", workbook(&[("Animals", weapons.clone())])),
        items_source(),
        Source::new("Arms.xlsx", workbook(&[("Weapons", weapons.clone()), ("Armor", weapons)])),
    ];
    let run = Compiler::new(cfg).compile_schemas(&sources).unwrap();

    let combined = std::fs::read_to_string(&run.combined).unwrap();
    let order: Vec<&str> = combined
        .lines()
        .filter_map(|l| l.strip_prefix("message "))
        .map(|l| l.trim_end_matches(" {"))
        .collect();
    assert_eq!(
        order,
        vec!["confpbArmsArmor", "confpbArmsWeapons", "confpbItemsItems", "confpbZooAnimals"]
    );
}

#[test]
fn retyped_column_gets_a_new_id() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let compiler = Compiler::new(cfg.clone());
    compiler.compile_schemas(&[items_source()]).unwrap();

    let mut rows = items_rows();
    rows[2] = vec!["int", "string", "string"];
    rows[5] = vec!["1", "Sword", "three"];
    let changed = Source::new("Items.xlsx", workbook(&[("Items", rows)]));
    let run = compiler.compile_schemas(&[changed]).unwrap();

    let schema = run.schemas().next().unwrap();
    assert_eq!(schema.column("id").unwrap().field_id, 1);
    assert_eq!(schema.column("name").unwrap().field_id, 2);
    assert_eq!(schema.column("count").unwrap().field_id, 4);
    assert_eq!(run.new_ids, 1);
}

#[test]
fn export_dir_gets_every_document_even_when_cached() {
    let dir = tempdir().unwrap();
    let mut cfg = config_in(dir.path());
    cfg.export_dir = Some(dir.path().join("export"));
    let compiler = Compiler::new(cfg.clone());
    compiler.compile_schemas(&[items_source()]).unwrap();
    std::fs::remove_dir_all(dir.path().join("export")).unwrap();

    let run = compiler.compile_schemas(&[items_source()]).unwrap();
    assert_eq!(run.cached_tables(), 1);
    let exported = std::fs::read_to_string(dir.path().join("export/confpbItemsItems.proto")).unwrap();
    assert_eq!(exported, ITEMS_DOCUMENT);
}

#[test]
fn missing_cached_document_forces_recompile() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let compiler = Compiler::new(cfg.clone());
    compiler.compile_schemas(&[items_source()]).unwrap();
    std::fs::remove_file(cfg.proto_dir().join("confpbItemsItems.proto")).unwrap();

    let run = compiler.compile_schemas(&[items_source()]).unwrap();
    assert_eq!(run.cached_tables(), 0);
    assert_eq!(run.new_ids, 0);
    assert!(cfg.proto_dir().join("confpbItemsItems.proto").exists());
}

// -------------------- Structural failures --------------------

#[test]
fn missing_list_sheet_fails_and_persists_nothing() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let bytes = sheet::WorkbookWriter::new()
        .sheet("Items", items_rows())
        .to_bytes()
        .unwrap();
    let sources = vec![items_source(), Source::new("Bad.xlsx", bytes)];

    let err = Compiler::new(cfg.clone()).run_sources(&sources).unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], CompileError::Structural { table, .. } if table == "Bad"));
    assert!(err.to_string().contains("list"));

    // the good workbook's results were not persisted either
    assert!(!cfg.id_file().exists());
    assert!(!cfg.proto_dir().join(schema::COMBINED_DOCUMENT).exists());
    assert!(!cfg.proto_dir().join("confpbItemsItems.proto").exists());
    assert!(!cfg.store_dir().join(MANIFEST_FILE).exists());
}

#[test]
fn every_failing_workbook_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let short = vec![vec![], vec!["id"], vec!["int"]];
    let sources = vec![
        Source::new("Garbage.xlsx", b"not a zip".to_vec()),
        Source::new("Short.xlsx", workbook(&[("Short", short)])),
        items_source(),
    ];
    let err = Compiler::new(cfg).run_sources(&sources).unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    let text = err.to_string();
    assert!(text.contains("Garbage"));
    assert!(text.contains("sheet Short has 3 rows"));
}

#[test]
fn unknown_listed_sheet_is_skipped() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let bytes = sheet::WorkbookWriter::new()
        .sheet("list", vec![vec!["Items"], vec![""], vec!["Ghost"]])
        .sheet("Items", items_rows())
        .to_bytes()
        .unwrap();
    let summary = Compiler::new(cfg).run_sources(&[Source::new("Items.xlsx", bytes)]).unwrap();
    assert_eq!(summary.schema.sheet_count(), 1);
    assert_eq!(summary.stores.manifest.len(), 1);
}

fn hp_rows() -> Vec<Vec<&'static str>> {
    vec![vec![], vec!["id", "hp"], vec!["int", "int"], vec![], vec![], vec!["1", "100"]]
}

fn label_rows() -> Vec<Vec<&'static str>> {
    vec![vec![], vec!["id", "label"], vec!["int", "string"], vec![], vec![], vec!["1", "hello"]]
}

#[test]
fn clashing_message_names_fail_before_anything_is_written() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    // A + BC and AB + C both name confpbABC
    let sources = vec![
        Source::new("A.xlsx", workbook(&[("BC", hp_rows())])),
        Source::new("AB.xlsx", workbook(&[("C", label_rows())])),
    ];

    let err = Compiler::new(cfg.clone()).run_sources(&sources).unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], CompileError::Structural { table, .. } if table == "AB"));
    let text = err.to_string();
    assert!(text.contains("confpbABC"), "{text}");
    assert!(text.contains("AB.xlsx/C"), "{text}");
    assert!(text.contains("A.xlsx/BC"), "{text}");

    assert!(!cfg.id_file().exists());
    assert!(!cfg.proto_dir().join("confpbABC.proto").exists());
    assert!(!cfg.proto_dir().join(schema::COMBINED_DOCUMENT).exists());
    assert!(!cfg.store_dir().exists());
}

#[test]
fn cached_message_name_still_counts_as_taken() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let first = Source::new("A.xlsx", workbook(&[("BC", hp_rows())]));
    Compiler::new(cfg.clone()).run_sources(&[first.clone()]).unwrap();
    let doc_path = cfg.proto_dir().join("confpbABC.proto");
    let before = std::fs::read(&doc_path).unwrap();

    let sources = vec![first, Source::new("AB.xlsx", workbook(&[("C", label_rows())]))];
    let err = Compiler::new(cfg.clone()).run_sources(&sources).unwrap_err();
    assert!(err.to_string().contains("clashes with A.xlsx/BC"), "{err}");

    // the cached document was not overwritten
    assert_eq!(std::fs::read(&doc_path).unwrap(), before);
    let summary = Compiler::new(cfg).run_sources(&[Source::new("A.xlsx", workbook(&[("BC", hp_rows())]))]);
    assert!(summary.is_ok());
}

#[test]
fn sheet_name_that_is_not_an_identifier_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let source = Source::new("Items.xlsx", workbook(&[("Item List", items_rows())]));

    let err = Compiler::new(cfg.clone()).compile_schemas(&[source]).unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], CompileError::Structural { table, .. } if table == "Items"));
    assert!(err.to_string().contains("confpbItemsItem List"), "{err}");

    // no ids were allocated or saved
    assert!(!cfg.id_file().exists());
    assert!(!cfg.proto_dir().join(schema::COMBINED_DOCUMENT).exists());
}

#[test]
fn column_title_that_is_not_an_identifier_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let rows = vec![vec![], vec!["id", "hp max"], vec!["int", "int"], vec![], vec![], vec!["1", "5"]];
    let source = Source::new("Units.xlsx", workbook(&[("Units", rows)]));

    let err = Compiler::new(cfg.clone()).compile_schemas(&[source]).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("sheet Units"), "{text}");
    assert!(text.contains("\"hp max\""), "{text}");
    assert!(!cfg.id_file().exists());
}

// -------------------- Incremental reruns --------------------

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[test]
fn unchanged_rerun_is_a_no_op() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    std::fs::create_dir_all(&cfg.source_dir).unwrap();
    std::fs::write(cfg.source_dir.join("Items.xlsx"), &items_source().bytes).unwrap();
    std::fs::write(cfg.source_dir.join("~$Items.xlsx"), b"lock file").unwrap();

    let compiler = Compiler::new(cfg.clone());
    let first = compiler.run().unwrap();
    assert_eq!(first.stores.built, 1);
    let stores_before = files_in(&cfg.store_dir());
    let manifest_before = read(&first.stores.manifest_path);
    let combined_before = read(&first.schema.combined);

    let second = compiler.run().unwrap();
    assert_eq!(second.schema.cached_tables(), 1);
    assert_eq!(second.schema.new_ids, 0);
    assert_eq!(second.stores.built, 0);
    assert_eq!(second.stores.skipped_tables, 1);
    assert_eq!(second.stores.records, 0);
    assert_eq!(files_in(&cfg.store_dir()), stores_before);
    assert_eq!(read(&second.stores.manifest_path), manifest_before);
    assert_eq!(read(&second.schema.combined), combined_before);
}

#[test]
fn fresh_output_dirs_give_identical_bytes() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    let source = items_source();
    let run_a = Compiler::new(config_in(a.path())).run_sources(&[source.clone()]).unwrap();
    let run_b = Compiler::new(config_in(b.path())).run_sources(&[source.clone()]).unwrap();

    let name = store_file_name("Items", "Items", &source.digest());
    assert_eq!(
        read(&config_in(a.path()).store_dir().join(&name)),
        read(&config_in(b.path()).store_dir().join(&name))
    );
    assert_eq!(read(&run_a.schema.combined), read(&run_b.schema.combined));
    assert_eq!(read(&run_a.stores.manifest_path), read(&run_b.stores.manifest_path));
}

#[test]
fn changed_workbook_gets_a_new_store() {
    let dir = tempdir().unwrap();
    let cfg = config_in(dir.path());
    let compiler = Compiler::new(cfg.clone());
    let first = items_source();
    compiler.run_sources(&[first.clone()]).unwrap();

    let mut rows = items_rows();
    rows.push(vec!["2", "Axe", "9"]);
    let second = Source::new("Items.xlsx", workbook(&[("Items", rows)]));
    let run = compiler.run_sources(&[second.clone()]).unwrap();
    assert_eq!(run.stores.built, 1);
    assert_eq!(run.stores.records, 2);

    let entry = run.stores.manifest.lookup("confpbItemsItems").unwrap();
    assert_eq!(entry.store_file, store_file_name("Items", "Items", &second.digest()));
    let cache = ContentCache::load(&cfg.store_dir().join(cache::STORE_CACHE_FILE)).unwrap();
    assert_eq!(cache.len(), 1);
}

// -------------------- Bindings --------------------

#[derive(Default)]
struct Recording(Mutex<Vec<(PathBuf, PathBuf)>>);

impl BindingGenerator for Recording {
    fn generate(&self, schema: &Path, out_dir: &Path) -> Result<(), CompileError> {
        self.0.lock().push((schema.to_path_buf(), out_dir.to_path_buf()));
        Ok(())
    }
}

#[test]
fn bindings_are_generated_from_the_combined_document() {
    let dir = tempdir().unwrap();
    let mut cfg = config_in(dir.path());
    cfg.bindings_dir = Some(dir.path().join("cs"));
    let generator = Recording::default();

    let run = SchemaCompiler::new(&cfg)
        .with_generator(&generator)
        .compile(&[items_source()])
        .unwrap();
    let calls = generator.0.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (run.combined.clone(), dir.path().join("cs")));
}

#[test]
fn missing_protoc_is_a_codegen_error() {
    let dir = tempdir().unwrap();
    let schema = dir.path().join("confpb.proto");
    std::fs::write(&schema, ITEMS_DOCUMENT).unwrap();
    let gen = ProtocGenerator::with_program(dir.path().join("no-such-protoc"));
    let err = gen.generate(&schema, &dir.path().join("out")).unwrap_err();
    assert!(matches!(err, CompileError::Codegen { .. }));
}

#[cfg(unix)]
#[test]
fn failing_generator_exit_is_a_codegen_error() {
    let dir = tempdir().unwrap();
    let schema = dir.path().join("confpb.proto");
    std::fs::write(&schema, ITEMS_DOCUMENT).unwrap();
    let err = ProtocGenerator::with_program("false")
        .generate(&schema, &dir.path().join("out"))
        .unwrap_err();
    assert!(err.to_string().contains("exited with"));
}

// -------------------- Bundles --------------------

#[test]
fn bundle_compiles_archived_workbooks() {
    let dir = tempdir().unwrap();
    let mut files = BTreeMap::new();
    files.insert("conf/Items.xlsx".to_string(), items_source().bytes);
    files.insert("__MACOSX/conf/._Items.xlsx".to_string(), b"junk".to_vec());
    let archive = bundle::pack(&files).unwrap();
    assert_eq!(bundle::unpack(&archive).unwrap(), files);

    let work = dir.path().join("work");
    let out = compile_bundle(&config_in(dir.path()), &archive, &work).unwrap();
    let digest = bundle::digest(&archive);
    assert_eq!(out.manifest_name, format!("version_{}_{}.txt", digest.md5, digest.size));

    let stores = bundle::unpack(&out.stores).unwrap();
    let name = store_file_name("Items", "Items", &items_source().digest());
    assert_eq!(stores.keys().collect::<Vec<_>>(), vec![&name]);
    assert_eq!(VersionManifest::from_json(&out.manifest).unwrap().len(), 1);
    // nothing outside the work directory
    assert!(!dir.path().join("gen").exists());
    assert!(work.join("db").join(&name).exists());

    let publish = dir.path().join("publish");
    out.write_to(&publish).unwrap();
    assert!(publish.join(&out.manifest_name).exists());
}

#[test]
fn pack_is_deterministic() {
    let mut files = BTreeMap::new();
    files.insert("b.txt".to_string(), b"two".to_vec());
    files.insert("a.txt".to_string(), b"one".to_vec());
    assert_eq!(bundle::pack(&files).unwrap(), bundle::pack(&files).unwrap());
}

#[test]
fn garbage_archive_is_rejected() {
    assert!(matches!(bundle::unpack(b"nope"), Err(CompileError::Archive(_))));
}
