//! Atomic file replacement (temp file + rename)

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::{Result, StoreError};

/// Returns the sibling temp path used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replaces `path` with `bytes` so readers only ever see complete contents.
///
/// A temp file left behind by a failed rename is truncated and reused by the
/// next write to the same path.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temp_path(path);

    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| StoreError::io(&temp, e))?;

        let mut writer = BufWriter::new(&file);
        writer
            .write_all(bytes)
            .map_err(|e| StoreError::io(&temp, e))?;
        writer.flush().map_err(|e| StoreError::io(&temp, e))?;
        drop(writer);
        file.sync_all().map_err(|e| StoreError::io(&temp, e))?;
    }

    fs::rename(&temp, path).map_err(|e| StoreError::io(path, e))
}

/// Serializes `value` as pretty JSON and writes it atomically
pub fn atomic_write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}
