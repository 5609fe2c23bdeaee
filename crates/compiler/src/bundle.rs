//! Archive boundary: compile a zipped set of workbooks in one call.
//!
//! ```text
//! upload.zip --unpack--> sources --compile(work_dir)--> stores.zip + version_<md5>_<size>.txt
//! ```

use crate::source::{self, ContentDigest};
use crate::{CompileError, Compiler, RunSummary};
use config::CompilerConfig;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Result of compiling an archive.
#[derive(Debug)]
pub struct BundleOutput {
    /// Digest of the uploaded archive.
    pub digest: ContentDigest,
    /// Zip of every store the manifest names.
    pub stores: Vec<u8>,
    /// `version_<md5>_<size>.txt`
    pub manifest_name: String,
    pub manifest: Vec<u8>,
    pub summary: RunSummary,
}

impl BundleOutput {
    /// Writes `stores_<md5>_<size>.zip` and the manifest into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<(), CompileError> {
        std::fs::create_dir_all(dir).map_err(|e| CompileError::io(dir, e))?;
        let stores = dir.join(format!("stores_{}_{}.zip", self.digest.md5, self.digest.size));
        std::fs::write(&stores, &self.stores).map_err(|e| CompileError::io(&stores, e))?;
        let manifest = dir.join(&self.manifest_name);
        std::fs::write(&manifest, &self.manifest).map_err(|e| CompileError::io(&manifest, e))
    }
}

pub fn digest(bytes: &[u8]) -> ContentDigest {
    ContentDigest::of(bytes)
}

pub fn version_file_name(digest: &ContentDigest) -> String {
    format!("version_{}_{}.txt", digest.md5, digest.size)
}

/// Every file of a zip archive, keyed by its `/`-separated path.
pub fn unpack(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, CompileError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| CompileError::Archive(e.to_string()))?;
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| CompileError::Archive(e.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let Some(path) = file.enclosed_name() else {
            return Err(CompileError::Archive(format!("unsafe entry path {:?}", file.name())));
        };
        let name = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| CompileError::Archive(format!("{name}: {e}")))?;
        files.insert(name, data);
    }
    Ok(files)
}

/// Zips `files` in path order with fixed timestamps, so equal inputs give
/// equal archives.
pub fn pack(files: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, CompileError> {
    let archive_err = |e: zip::result::ZipError| CompileError::Archive(e.to_string());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(name.as_str(), options).map_err(archive_err)?;
        zip.write_all(data)
            .map_err(|e| CompileError::Archive(format!("{name}: {e}")))?;
    }
    Ok(zip.finish().map_err(archive_err)?.into_inner())
}

/// Compiles the workbooks inside `archive` with all output rooted at
/// `work_dir`. Reusing a `work_dir` across calls keeps field ids stable and
/// lets unchanged workbooks hit the caches.
pub fn compile_bundle(config: &CompilerConfig, archive: &[u8], work_dir: &Path) -> Result<BundleOutput, CompileError> {
    let digest = digest(archive);
    let files = unpack(archive)?;
    let sources = source::from_archive(&files);

    let rooted = config.rooted_at(work_dir);
    let summary = Compiler::new(rooted.clone()).run_sources(&sources)?;

    let store_dir = rooted.store_dir();
    let mut stores = BTreeMap::new();
    for entry in summary.stores.manifest.entries() {
        let path = store_dir.join(&entry.store_file);
        let bytes = std::fs::read(&path).map_err(|e| CompileError::io(&path, e))?;
        stores.insert(entry.store_file.clone(), bytes);
    }

    Ok(BundleOutput {
        stores: pack(&stores)?,
        manifest_name: version_file_name(&digest),
        manifest: summary.stores.manifest.to_json()?,
        digest,
        summary,
    })
}
