//! # Compiler - Workbooks to Schemas, Stores and a Manifest
//!
//! Drives a whole compile run over a directory (or archive) of `.xlsx`
//! workbooks:
//!
//! ```text
//!            ┌──────────────────┐  proto/<msg>.proto, proto/confpb.proto
//! sources ──►│ SchemaCompiler   │──────────────────────────────────────────►
//!            │  (IdAllocator)   │  proto/proto_id.toml, schema_versions.json
//!            └────────┬─────────┘
//!                     │ per-sheet documents
//!            ┌────────▼─────────┐  db/<table>_<sheet>_<md5><len>.db
//! sources ──►│ StoreBuilder     │──────────────────────────────────────────►
//!            │  (staged backup) │  db/version.txt, store_versions.json
//!            └──────────────────┘
//! ```
//!
//! Each phase fans out one worker per workbook and joins before any
//! aggregate file (id state, caches, combined schema, manifest) is
//! written. If a worker fails the phase returns [`CompileError::Failed`]
//! listing every failure, and none of those files change.

pub mod bundle;
pub mod cache;
pub mod codegen;
mod error;
pub mod manifest;
mod schema_gen;
pub mod source;
mod store_gen;
mod tables;
mod workers;

pub use cache::{ContentCache, TableVersion};
pub use codegen::{BindingGenerator, ProtocGenerator};
pub use error::CompileError;
pub use manifest::{ManifestEntry, VersionManifest, MANIFEST_FILE};
pub use schema_gen::{SchemaCompiler, SchemaRun, TableSchemas};
pub use source::{ContentDigest, Source};
pub use store_gen::{load_schema, store_file_name, StoreBuilder, StoreRun};
pub use tables::LIST_SHEET;

use config::CompilerConfig;
use tracing::info;

/// Result of a full run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub schema: SchemaRun,
    pub stores: StoreRun,
}

/// Entry point for schema + store compiles.
pub struct Compiler {
    config: CompilerConfig,
    generator: Option<Box<dyn BindingGenerator>>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            generator: None,
        }
    }

    /// Replaces the default `protoc` binding generator.
    pub fn with_generator(mut self, generator: Box<dyn BindingGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Workbooks in the configured source directory.
    pub fn discover(&self) -> Result<Vec<Source>, CompileError> {
        source::discover(&self.config.source_dir)
    }

    pub fn compile_schemas(&self, sources: &[Source]) -> Result<SchemaRun, CompileError> {
        let compiler = SchemaCompiler::new(&self.config);
        match &self.generator {
            Some(g) => compiler.with_generator(g.as_ref()).compile(sources),
            None => compiler.compile(sources),
        }
    }

    pub fn build_stores(&self, sources: &[Source]) -> Result<StoreRun, CompileError> {
        StoreBuilder::new(&self.config).build(sources)
    }

    /// Schemas then stores for every workbook in the source directory.
    pub fn run(&self) -> Result<RunSummary, CompileError> {
        let sources = self.discover()?;
        self.run_sources(&sources)
    }

    pub fn run_sources(&self, sources: &[Source]) -> Result<RunSummary, CompileError> {
        info!(workbooks = sources.len(), workers = self.config.workers, "compile started");
        let schema = self.compile_schemas(sources)?;
        let stores = self.build_stores(sources)?;
        Ok(RunSummary { schema, stores })
    }
}

#[cfg(test)]
mod tests;
