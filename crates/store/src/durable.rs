//! Temp-file naming, atomic replacement and durable renames.
//!
//! Every file sheetc writes goes through here: store files via
//! [`publish`], small metadata files (id state, caches, manifest, schema
//! documents) via [`write_atomic`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// `<path>.tmp`, next to `path`.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Moves a completed temp file to its final name and makes the rename
/// durable.
pub fn publish(tmp_path: &Path, dest: &Path) -> Result<()> {
    fs::rename(tmp_path, dest)
        .with_context(|| format!("rename {} -> {}", tmp_path.display(), dest.display()))?;
    sync_parent(dest);
    Ok(())
}

/// Replaces `path` with `bytes`: parent dirs, temp file, fsync, rename.
///
/// When the rename fails (an open handle on the target, some network
/// filesystems) the target is truncated and rewritten in place instead.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path_for(path);
    write_synced(&tmp_path, bytes)?;

    if fs::rename(&tmp_path, path).is_err() {
        write_synced(path, bytes)?;
        let _ = fs::remove_file(&tmp_path);
        return Ok(());
    }
    sync_parent(path);
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

// A crash after rename but before the directory sync can lose the entry.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
