//! # sheetc - Spreadsheet Config Compiler
//!
//! Turns a directory of `.xlsx` workbooks into schema documents, one store
//! file per sheet and a version manifest.
//!
//! ## Commands
//!
//! ```text
//! sheetc build                     schemas, then stores (default)
//! sheetc schema                    schema documents + field ids only
//! sheetc stores                    stores + manifest from existing schemas
//! sheetc bundle <zip> --work <dir> --out <dir>
//!                                  compile an archive of workbooks
//! sheetc dump <store> --schema <proto>
//!                                  print every record of a store
//! ```
//!
//! ## Configuration
//!
//! `sheetc.toml` (or `--config`), then `SHEETC_*` variables, then flags.
//! Logging follows `RUST_LOG` (default `warn,sheetc=info,compiler=info`).
//!
//! ## Example
//!
//! ```text
//! $ sheetc --source-dir conf --gen-dir gen
//! schemas: 1 workbooks (0 cached), 1 sheets, 3 new ids -> gen/proto/confpb.proto
//! stores: 1 built, 0 reused, 0 workbooks skipped, 1 records -> gen/db/version.txt
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::CompilerConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,sheetc=info,compiler=info";

#[derive(Parser, Debug)]
#[command(name = "sheetc", version, about = "Compile spreadsheets into schemas and record stores")]
struct Cli {
    /// Config file (default: ./sheetc.toml when present)
    #[arg(long, global = true, env = "SHEETC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory scanned for workbooks
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Root of generated output
    #[arg(long, global = true)]
    gen_dir: Option<PathBuf>,

    /// Parallel workbook workers
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// First data row, 0-indexed
    #[arg(long, global = true)]
    start_row: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile schemas, then build stores
    Build,
    /// Compile schema documents and allocate field ids
    Schema,
    /// Build stores and the manifest from existing schema documents
    Stores,
    /// Compile a zip of workbooks into a store archive and manifest
    Bundle {
        archive: PathBuf,
        /// Working directory for generated files (reuse it to keep ids stable)
        #[arg(long)]
        work: PathBuf,
        /// Where the store archive and manifest are written
        #[arg(long)]
        out: PathBuf,
    },
    /// Decode and print every record of a store
    Dump {
        store: PathBuf,
        /// Schema document describing the records
        #[arg(long)]
        schema: PathBuf,
        /// Message to decode with (default: the document's first message)
        #[arg(long)]
        message: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let Cli {
        config,
        source_dir,
        gen_dir,
        workers,
        start_row,
        command,
    } = Cli::parse();

    // defaults < file < SHEETC_* < flags
    let load = move || -> Result<CompilerConfig> {
        let mut cfg = CompilerConfig::load(config.as_deref())?;
        if let Some(v) = source_dir {
            cfg.source_dir = v;
        }
        if let Some(v) = gen_dir {
            cfg.gen_dir = v;
        }
        if let Some(v) = workers {
            cfg.workers = v;
        }
        if let Some(v) = start_row {
            cfg.start_row = v;
        }
        cfg.validate()?;
        Ok(cfg)
    };

    match command.unwrap_or(Command::Build) {
        Command::Build => commands::build(load()?),
        Command::Schema => commands::schema(load()?),
        Command::Stores => commands::stores(load()?),
        Command::Bundle { archive, work, out } => commands::bundle(&load()?, &archive, &work, &out),
        Command::Dump { store, schema, message } => commands::dump(&store, &schema, message.as_deref()),
    }
}
