use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{read_footer, Footer, FOOTER_BYTES, MAX_KEY_BYTES, MAX_VALUE_BYTES};

/// Reads a store file for point lookups and full scans.
///
/// On [`open`](StoreReader::open) the whole index is loaded into memory.
/// A persistent file handle is kept behind a `Mutex` so lookups work
/// through `&self`. Every record read is checked against its CRC32.
pub struct StoreReader {
    path: PathBuf,
    /// Key -> byte offset of the record's CRC prefix.
    index: BTreeMap<Vec<u8>, u64>,
    file: Mutex<BufReader<File>>,
    footer: Footer,
}

impl StoreReader {
    /// Opens a store and loads its index.
    ///
    /// # Errors
    ///
    /// Fails if the file is too small, the magic is wrong, the index offset
    /// points outside the data area, or the index does not hold exactly
    /// `record_count` entries.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = File::open(&path_buf).with_context(|| format!("open store {}", path_buf.display()))?;
        let filesize = f.metadata()?.len();

        if filesize < FOOTER_BYTES {
            bail!("store file {} too small", path_buf.display());
        }
        let footer = read_footer(&mut f).with_context(|| format!("read footer of {}", path_buf.display()))?;
        let index_end = filesize - FOOTER_BYTES;
        if footer.index_offset > index_end {
            bail!("invalid index_offset {} in {}", footer.index_offset, path_buf.display());
        }

        f.seek(SeekFrom::Start(footer.index_offset))?;
        let mut reader = BufReader::new(f);
        let mut index = BTreeMap::new();
        let mut pos = footer.index_offset;
        while pos < index_end {
            let key_len = reader.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                bail!("corrupt index: key_len {} exceeds maximum {}", key_len, MAX_KEY_BYTES);
            }
            let mut key = vec![0u8; key_len];
            reader.read_exact(&mut key)?;
            let data_offset = reader.read_u64::<LittleEndian>()?;
            if data_offset >= footer.index_offset {
                bail!("corrupt index: record offset {} past data section", data_offset);
            }
            index.insert(key, data_offset);
            pos += 4 + key_len as u64 + 8;
        }

        if index.len() as u64 != footer.record_count {
            bail!(
                "corrupt store {}: footer declares {} records, index holds {}",
                path_buf.display(),
                footer.record_count,
                index.len()
            );
        }

        Ok(Self {
            path: path_buf,
            index,
            file: Mutex::new(reader),
            footer,
        })
    }

    /// Point lookup. `Ok(None)` if the key is not in the store.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, a CRC mismatch, or when the index
    /// points at a record with a different key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let offset = match self.index.get(key) {
            Some(&o) => o,
            None => return Ok(None),
        };
        let (stored_key, value) = self.read_record(offset)?;
        if stored_key.as_slice() != key {
            bail!("index pointed to mismatching key at offset {}", offset);
        }
        Ok(Some(value))
    }

    fn read_record(&self, offset: u64) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut f = self.file.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(offset))?;

        let expected_crc = f.read_u32::<LittleEndian>()?;
        let key_len = f.read_u32::<LittleEndian>()? as usize;
        if key_len > MAX_KEY_BYTES {
            bail!("corrupt data: key_len {} exceeds maximum {}", key_len, MAX_KEY_BYTES);
        }
        let mut key = vec![0u8; key_len];
        f.read_exact(&mut key)?;

        let val_len = f.read_u32::<LittleEndian>()? as usize;
        if val_len > MAX_VALUE_BYTES {
            bail!("corrupt data: val_len {} exceeds maximum {}", val_len, MAX_VALUE_BYTES);
        }
        let mut value = vec![0u8; val_len];
        f.read_exact(&mut value)?;

        let mut hasher = Crc32::new();
        hasher.update(&(key_len as u32).to_le_bytes());
        hasher.update(&key);
        hasher.update(&(val_len as u32).to_le_bytes());
        hasher.update(&value);
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            bail!(
                "CRC32 mismatch at offset {}: expected {:#010x}, got {:#010x} (data corruption)",
                offset,
                expected_crc,
                actual_crc
            );
        }
        Ok((key, value))
    }

    /// Every record in ascending key order, each CRC-checked.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::with_capacity(self.index.len());
        for (key, &offset) in &self.index {
            let (stored_key, value) = self.read_record(offset)?;
            if &stored_key != key {
                bail!("index pointed to mismatching key at offset {}", offset);
            }
            out.push((stored_key, value));
        }
        Ok(out)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys().map(|k| k.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Record count declared by the footer.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.footer.record_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
