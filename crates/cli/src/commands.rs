use anyhow::{bail, Context, Result};
use compiler::{bundle, Compiler, SchemaRun, StoreRun};
use config::CompilerConfig;
use record::{decode, Record};
use std::path::Path;
use store::StoreReader;
use tracing::info;

fn schema_line(run: &SchemaRun) -> String {
    format!(
        "schemas: {} workbooks ({} cached), {} sheets, {} new ids -> {}",
        run.tables.len(),
        run.cached_tables(),
        run.sheet_count(),
        run.new_ids,
        run.combined.display()
    )
}

fn stores_line(run: &StoreRun) -> String {
    format!(
        "stores: {} built, {} reused, {} workbooks skipped, {} records -> {}",
        run.built,
        run.reused,
        run.skipped_tables,
        run.records,
        run.manifest_path.display()
    )
}

pub fn build(cfg: CompilerConfig) -> Result<()> {
    let summary = Compiler::new(cfg).run()?;
    println!("{}", schema_line(&summary.schema));
    println!("{}", stores_line(&summary.stores));
    Ok(())
}

pub fn schema(cfg: CompilerConfig) -> Result<()> {
    let compiler = Compiler::new(cfg);
    let sources = compiler.discover()?;
    let run = compiler.compile_schemas(&sources)?;
    println!("{}", schema_line(&run));
    Ok(())
}

pub fn stores(cfg: CompilerConfig) -> Result<()> {
    let compiler = Compiler::new(cfg);
    let sources = compiler.discover()?;
    let run = compiler.build_stores(&sources)?;
    println!("{}", stores_line(&run));
    Ok(())
}

pub fn bundle(cfg: &CompilerConfig, archive: &Path, work: &Path, out: &Path) -> Result<()> {
    let bytes = std::fs::read(archive).with_context(|| format!("reading {}", archive.display()))?;
    let output = bundle::compile_bundle(cfg, &bytes, work)?;
    output.write_to(out)?;
    info!(archive = %archive.display(), digest = %output.digest.tag(), "bundle written");

    println!("{}", schema_line(&output.summary.schema));
    println!("{}", stores_line(&output.summary.stores));
    println!("bundle: {} -> {}", output.manifest_name, out.display());
    Ok(())
}

pub fn dump(store_path: &Path, schema_path: &Path, message: Option<&str>) -> Result<()> {
    let text = std::fs::read_to_string(schema_path)
        .with_context(|| format!("reading {}", schema_path.display()))?;
    let schema = match message {
        Some(name) => ::schema::find_message(&text, name)?,
        None => match ::schema::parse_document(&text)?.into_iter().next() {
            Some(s) => s,
            None => bail!("{} declares no message", schema_path.display()),
        },
    };

    let reader = StoreReader::open(store_path)?;
    for (key, value) in reader.entries()? {
        let key = String::from_utf8_lossy(&key);
        let record = decode(&schema, &key, &value)
            .with_context(|| format!("decoding record {key:?} of {}", store_path.display()))?;
        println!("{}", render_record(&record));
    }
    Ok(())
}

/// `key -> {field: value, ...}` in field-name order.
fn render_record(record: &Record) -> String {
    let fields: Vec<String> = record.fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    format!("{} -> {{{}}}", record.key, fields.join(", "))
}
