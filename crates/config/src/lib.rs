//! # Config - Compiler Settings
//!
//! Every knob the sheet compiler exposes lives in [`CompilerConfig`]. Values
//! are layered, later layers winning:
//!
//! ```text
//! built-in defaults  <  sheetc.toml  <  SHEETC_* environment  <  CLI flags
//! ```
//!
//! ## Environment variables
//!
//! ```text
//! SHEETC_SOURCE_DIR   spreadsheet directory        (default: "conf")
//! SHEETC_GEN_DIR      root of generated output     (default: "gen")
//! SHEETC_PROTO_DIR    schema documents             (default: "<gen>/proto")
//! SHEETC_STORE_DIR    store files + manifest       (default: "<gen>/db")
//! SHEETC_ID_FILE      persisted field-id state     (default: "<proto>/proto_id.toml")
//! SHEETC_EXPORT_DIR   extra copy of schema docs    (default: unset)
//! SHEETC_BINDINGS_DIR client binding output        (default: unset)
//! SHEETC_WORKERS      parallel workbook workers    (default: available cores)
//! SHEETC_START_ROW    first data row, 0-indexed    (default: 5)
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file picked up from the working directory when no
/// explicit `--config` path is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "sheetc.toml";

/// Default 0-indexed row at which data rows begin.
pub const DEFAULT_START_ROW: usize = 5;

/// Smallest accepted start row: data may not overlap the title/type rows.
pub const MIN_START_ROW: usize = 3;

/// Errors produced while assembling a [`CompilerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one compile run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Directory scanned for `*.xlsx` workbooks.
    pub source_dir: PathBuf,
    /// Root of all generated output.
    pub gen_dir: PathBuf,
    pub proto_dir: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub id_file: Option<PathBuf>,
    /// When set, every schema document of the run is also copied here.
    pub export_dir: Option<PathBuf>,
    /// When set, client bindings are generated into this directory.
    pub bindings_dir: Option<PathBuf>,
    /// Upper bound on concurrently compiled workbooks.
    pub workers: usize,
    /// First data row (0-indexed).
    pub start_row: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("conf"),
            gen_dir: PathBuf::from("gen"),
            proto_dir: None,
            store_dir: None,
            id_file: None,
            export_dir: None,
            bindings_dir: None,
            workers: default_workers(),
            start_row: DEFAULT_START_ROW,
        }
    }
}

/// Number of workers used when nothing else is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl CompilerConfig {
    /// Reads a TOML config file. Fields missing from the file keep their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Builds the effective configuration: defaults, then `path` (or
    /// `sheetc.toml` in the working directory if it exists), then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILENAME);
                if implicit.exists() {
                    Self::from_file(implicit)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_from(|var| std::env::var(var).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies `SHEETC_*` overrides using `lookup` to read variables.
    ///
    /// Taking the lookup as a closure keeps this testable without touching
    /// the real process environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SHEETC_SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SHEETC_GEN_DIR") {
            self.gen_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SHEETC_PROTO_DIR") {
            self.proto_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SHEETC_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SHEETC_ID_FILE") {
            self.id_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SHEETC_EXPORT_DIR") {
            self.export_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SHEETC_BINDINGS_DIR") {
            self.bindings_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SHEETC_WORKERS") {
            self.workers = parse_env_usize("SHEETC_WORKERS", v)?;
        }
        if let Some(v) = lookup("SHEETC_START_ROW") {
            self.start_row = parse_env_usize("SHEETC_START_ROW", v)?;
        }
        Ok(())
    }

    /// Rejects settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.start_row < MIN_START_ROW {
            return Err(ConfigError::Invalid(format!(
                "start_row {} overlaps the title/type rows (minimum {})",
                self.start_row, MIN_START_ROW
            )));
        }
        Ok(())
    }

    /// Directory holding per-sheet and combined schema documents.
    #[must_use]
    pub fn proto_dir(&self) -> PathBuf {
        self.proto_dir
            .clone()
            .unwrap_or_else(|| self.gen_dir.join("proto"))
    }

    /// Directory holding store files, the store cache and the manifest.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| self.gen_dir.join("db"))
    }

    /// Path of the persisted field-id allocator state.
    #[must_use]
    pub fn id_file(&self) -> PathBuf {
        self.id_file
            .clone()
            .unwrap_or_else(|| self.proto_dir().join("proto_id.toml"))
    }

    /// Returns a copy with every generated path rooted under `gen_dir`.
    ///
    /// Used for bundle compiles, which must never write into the configured
    /// output tree.
    #[must_use]
    pub fn rooted_at(&self, gen_dir: &Path) -> Self {
        Self {
            gen_dir: gen_dir.to_path_buf(),
            proto_dir: None,
            store_dir: None,
            id_file: None,
            export_dir: None,
            bindings_dir: None,
            ..self.clone()
        }
    }
}

fn parse_env_usize(var: &'static str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
