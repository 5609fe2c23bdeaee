use crate::*;
use anyhow::Result;
use staging::StagingTable;
use std::io::{Seek, SeekFrom, Write};
use tempfile::tempdir;

fn write_sample(path: &std::path::Path) -> Result<()> {
    let mut t = StagingTable::new("sample");
    t.insert(b"b".to_vec(), b"banana".to_vec());
    t.insert(b"a".to_vec(), b"apple".to_vec());
    t.insert(b"c".to_vec(), Vec::new());
    StoreWriter::write_from_staging(path, &t)?;
    Ok(())
}

// -------------------- Basic open & get --------------------

#[test]
fn open_and_get_entries() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.db");
    write_sample(&path)?;

    let reader = StoreReader::open(&path)?;
    assert_eq!(reader.get(b"a")?, Some(b"apple".to_vec()));
    assert_eq!(reader.get(b"b")?, Some(b"banana".to_vec()));
    // empty but present
    assert_eq!(reader.get(b"c")?, Some(Vec::new()));
    assert_eq!(reader.get(b"nope")?, None);
    assert_eq!(reader.path(), path.as_path());
    Ok(())
}

#[test]
fn keys_and_entries_are_sorted() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sorted.db");
    write_sample(&path)?;

    let reader = StoreReader::open(&path)?;
    let keys: Vec<&[u8]> = reader.keys().collect();
    assert_eq!(keys, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);

    let entries = reader.entries()?;
    assert_eq!(entries[0], (b"a".to_vec(), b"apple".to_vec()));
    assert_eq!(entries.len(), 3);
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.record_count(), 3);
    assert!(!reader.is_empty());
    Ok(())
}

#[test]
fn large_value_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("large.db");
    let big = vec![0xabu8; 1024 * 1024];
    let mut t = StagingTable::new("large");
    t.insert(b"big".to_vec(), big.clone());
    StoreWriter::write_from_staging(&path, &t)?;

    assert_eq!(StoreReader::open(&path)?.get(b"big")?, Some(big));
    Ok(())
}

// -------------------- Corruption --------------------

#[test]
fn flipped_value_byte_fails_crc() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("crc.db");
    let mut t = StagingTable::new("crc");
    t.insert(b"k".to_vec(), b"value".to_vec());
    StoreWriter::write_from_staging(&path, &t)?;

    // crc(4) key_len(4) key(1) val_len(4) -> value starts at 13
    let mut f = std::fs::OpenOptions::new().write(true).open(&path)?;
    f.seek(SeekFrom::Start(13))?;
    f.write_all(b"X")?;
    drop(f);

    let reader = StoreReader::open(&path)?;
    let err = reader.get(b"k").unwrap_err();
    assert!(err.to_string().contains("CRC32 mismatch"));
    assert!(reader.entries().is_err());
    Ok(())
}

#[test]
fn bad_magic_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("magic.db");
    write_sample(&path)?;

    let len = std::fs::metadata(&path)?.len();
    let mut f = std::fs::OpenOptions::new().write(true).open(&path)?;
    f.seek(SeekFrom::Start(len - 4))?;
    f.write_all(&[0, 0, 0, 0])?;
    drop(f);

    assert!(StoreReader::open(&path).is_err());
    Ok(())
}

#[test]
fn tiny_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tiny.db");
    std::fs::write(&path, b"short")?;
    let err = StoreReader::open(&path).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains("too small"));
    Ok(())
}

#[test]
fn record_count_mismatch_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("count.db");
    write_sample(&path)?;

    let len = std::fs::metadata(&path)?.len();
    let mut f = std::fs::OpenOptions::new().write(true).open(&path)?;
    f.seek(SeekFrom::Start(len - FOOTER_BYTES))?;
    f.write_all(&7u64.to_le_bytes())?;
    drop(f);

    let err = StoreReader::open(&path).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains("declares 7 records"));
    Ok(())
}

#[test]
fn missing_file_is_an_error() {
    assert!(StoreReader::open("/definitely/not/here.db").is_err());
}
