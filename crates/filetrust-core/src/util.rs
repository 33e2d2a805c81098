use crate::error::{IoResultExt, Result, TrustError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `data` to `path` through a sibling temp file and a rename, so readers
/// only ever observe the old content or the complete new content.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).at(&parent)?;
    let mut tmp = NamedTempFile::new_in(&parent).at(&parent)?;
    tmp.write_all(data).at(tmp.path())?;
    tmp.as_file().sync_all().at(tmp.path())?;
    tmp.persist(path)
        .map_err(|e| TrustError::io(path, e.error))?;
    Ok(())
}

/// Serialization failures surface as `Io` with `InvalidData`; nothing is written.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| TrustError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    write_atomic(path, &data)
}

/// Serialize a path as text, replacing invalid UTF-8, for report fields that
/// may name files the store cannot record.
pub fn serialize_path_lossy<S>(path: &Path, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&path.to_string_lossy())
}

pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Append `suffix` to the full file name (`a.txt` + `sig` -> `a.txt.sig`).
pub fn with_appended_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
