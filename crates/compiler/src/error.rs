use record::ConversionError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Everything that can fail a compile run.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The workbook itself is unusable: unreadable archive, no `list`
    /// sheet, or a data sheet with too few rows.
    #[error("{table}: {detail}")]
    Structural { table: String, detail: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("{table}/{sheet}: schema document {document} missing or unreadable: {detail}")]
    SchemaMissing {
        table: String,
        sheet: String,
        document: String,
        detail: String,
    },

    #[error("{table}/{sheet}: row {row} repeats record key {key:?}")]
    DuplicateKey {
        table: String,
        sheet: String,
        row: usize,
        key: String,
    },

    #[error("store {store}: {detail}")]
    StoreIntegrity { store: String, detail: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist {what}: {detail}")]
    Persist { what: String, detail: String },

    #[error("worker for {table} panicked: {message}")]
    WorkerPanic { table: String, message: String },

    #[error("binding generation for {schema} failed: {detail}")]
    Codegen { schema: PathBuf, detail: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("worker pool: {0}")]
    Pool(String),

    #[error("{}", render_failures(.0))]
    Failed(Vec<CompileError>),
}

impl CompileError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn structural(table: &str, detail: impl Into<String>) -> Self {
        Self::Structural {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    /// Individual failures, with `Failed` lists flattened.
    pub fn failures(&self) -> Vec<&CompileError> {
        match self {
            Self::Failed(all) => all.iter().flat_map(|e| e.failures()).collect(),
            other => vec![other],
        }
    }
}

fn render_failures(errors: &[CompileError]) -> String {
    let mut out = format!("compile failed with {} error(s)", errors.len());
    for (i, e) in errors.iter().enumerate() {
        let _ = write!(out, "\n  {}. {}", i + 1, e);
    }
    out
}
