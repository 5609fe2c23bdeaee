use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use staging::StagingTable;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::durable::{publish, tmp_path_for};
use crate::format::{write_footer, MAX_KEY_BYTES, MAX_VALUE_BYTES};
use crate::reader::StoreReader;

type Entries<'a> = Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a>;

/// Outcome of a staged backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupReport {
    /// Records present in the staging table when the backup started.
    pub staged: u64,
    /// Records written to the destination file.
    pub copied: u64,
    /// Index and footer were written and the file was synced.
    pub done: bool,
}

impl BackupReport {
    /// `true` when the destination holds exactly the staged records.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.done && self.copied == self.staged
    }
}

/// Incremental copy of a [`StagingTable`] into a new store file.
///
/// Records are copied in key order by [`step`](StoreBackup::step). Once the
/// last record is copied the index and footer are appended, the file is
/// synced and the backup reports `done`. The destination is a temp path;
/// moving it to its final name is [`publish`]'s job.
pub struct StoreBackup<'a> {
    tmp_path: PathBuf,
    file: Option<BufWriter<File>>,
    entries: Entries<'a>,
    staged: u64,
    copied: u64,
    /// Bytes written so far; the offset of the next record.
    offset: u64,
    index: Vec<(&'a [u8], u64)>,
    record_buf: Vec<u8>,
    done: bool,
}

impl<'a> StoreBackup<'a> {
    /// Creates (or truncates) `tmp_path` and prepares to copy `staging`.
    pub fn new(staging: &'a StagingTable, tmp_path: &Path) -> Result<Self> {
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        Ok(Self {
            tmp_path: tmp_path.to_path_buf(),
            file: Some(BufWriter::new(raw)),
            entries: Box::new(staging.iter()),
            staged: staging.len() as u64,
            copied: 0,
            offset: 0,
            index: Vec::with_capacity(staging.len()),
            record_buf: Vec::with_capacity(256),
            done: false,
        })
    }

    /// Copies up to `n` records; a negative `n` copies all that remain.
    ///
    /// Returns `true` once the backup is done. Calling `step` after that is a
    /// no-op. `step(0)` never finishes a backup, even an empty one.
    pub fn step(&mut self, n: i64) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        let limit = if n < 0 { u64::MAX } else { n as u64 };
        let copied = self.copy_batch(limit).and_then(|()| {
            if self.copied == self.staged && n != 0 {
                self.finalize()?;
            }
            Ok(())
        });
        if let Err(e) = copied {
            // the temp file is unusable from here on
            self.file = None;
            return Err(e);
        }
        Ok(self.done)
    }

    fn copy_batch(&mut self, limit: u64) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            bail!("backup of {} was abandoned after an error", self.tmp_path.display());
        };

        let mut taken = 0u64;
        while taken < limit {
            let Some((key, value)) = self.entries.next() else {
                break;
            };
            ensure!(key.len() <= MAX_KEY_BYTES, "key of {} bytes exceeds maximum {}", key.len(), MAX_KEY_BYTES);
            ensure!(
                value.len() <= MAX_VALUE_BYTES,
                "value of {} bytes exceeds maximum {}",
                value.len(),
                MAX_VALUE_BYTES
            );

            self.record_buf.clear();
            self.record_buf.write_u32::<LittleEndian>(key.len() as u32)?;
            self.record_buf.extend_from_slice(key);
            self.record_buf.write_u32::<LittleEndian>(value.len() as u32)?;
            self.record_buf.extend_from_slice(value);

            let mut hasher = Crc32::new();
            hasher.update(&self.record_buf);
            let crc = hasher.finalize();

            file.write_u32::<LittleEndian>(crc)?;
            file.write_all(&self.record_buf)?;

            self.index.push((key, self.offset));
            self.offset += 4 + self.record_buf.len() as u64;
            self.copied += 1;
            taken += 1;
        }
        Ok(())
    }

    /// Writes the index and footer, then flushes and syncs the temp file.
    fn finalize(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            bail!("backup of {} has no open file", self.tmp_path.display());
        };

        let index_offset = self.offset;
        for (key, data_offset) in &self.index {
            file.write_u32::<LittleEndian>(key.len() as u32)?;
            file.write_all(key)?;
            file.write_u64::<LittleEndian>(*data_offset)?;
        }
        write_footer(&mut file, self.copied, index_offset)?;

        file.flush()?;
        file.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()
            .with_context(|| format!("sync {}", self.tmp_path.display()))?;
        self.done = true;
        Ok(())
    }

    /// Records not yet copied.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.staged - self.copied
    }

    /// Records the staging table held when the backup started.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.staged
    }

    #[must_use]
    pub fn copied(&self) -> u64 {
        self.copied
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Closes the destination and reports how far the backup got.
    ///
    /// An unfinished backup leaves a partial temp file behind; callers that
    /// see an incomplete report are expected to remove it.
    pub fn finish(self) -> BackupReport {
        BackupReport {
            staged: self.staged,
            copied: self.copied,
            done: self.done,
        }
    }
}

/// Verified one-shot store writes.
pub struct StoreWriter;

impl StoreWriter {
    /// [`write_via`](Self::write_via) with `<path>.tmp` as the temp file.
    pub fn write_from_staging(path: &Path, staging: &StagingTable) -> Result<u64> {
        Self::write_via(staging, &tmp_path_for(path), path)
    }

    /// Backs `staging` up to `tmp_path` in one step, reopens the result and
    /// checks its record count, then publishes it at `dest`. Returns the
    /// number of records written.
    ///
    /// On any failure the temp file is removed and `dest` is left as it was.
    pub fn write_via(staging: &StagingTable, tmp_path: &Path, dest: &Path) -> Result<u64> {
        let result = Self::backup_verified(staging, tmp_path).and_then(|copied| {
            publish(tmp_path, dest)?;
            Ok(copied)
        });
        if result.is_err() {
            let _ = std::fs::remove_file(tmp_path);
        }
        result
    }

    fn backup_verified(staging: &StagingTable, tmp_path: &Path) -> Result<u64> {
        let mut backup = StoreBackup::new(staging, tmp_path)?;
        backup.step(-1)?;
        let report = backup.finish();
        ensure!(
            report.is_complete(),
            "backup of {} incomplete: {} of {} records copied (done: {})",
            staging.label(),
            report.copied,
            report.staged,
            report.done
        );

        let reader = StoreReader::open(tmp_path)?;
        ensure!(
            reader.record_count() == report.staged,
            "reopened store holds {} records, {} staged",
            reader.record_count(),
            report.staged
        );
        Ok(report.copied)
    }
}
