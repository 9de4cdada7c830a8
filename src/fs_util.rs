use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::FetchError;

pub fn ensure_absent(path: &Utf8Path, overwrite: bool) -> Result<(), FetchError> {
    if !overwrite && path.as_std_path().exists() {
        return Err(FetchError::AlreadyExists(path.to_string()));
    }
    Ok(())
}

pub fn ensure_dir(dir: &Utf8Path) -> Result<(), FetchError> {
    if dir.as_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("create {dir}: {err}")))
}

/// Directory a path-style output lives in; `.` for bare file names.
pub fn parent_dir(path: &Utf8Path) -> Utf8PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    }
}

/// Temp file in `dir`, removed on drop unless [`persist`]ed.
pub fn staging_file(dir: &Utf8Path) -> Result<NamedTempFile, FetchError> {
    ensure_dir(dir)?;
    let dir = if dir.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        dir
    };
    tempfile::Builder::new()
        .prefix(".cfde-kc-fetch")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("create temp file in {dir}: {err}")))
}

pub fn persist(file: NamedTempFile, path: &Utf8Path) -> Result<(), FetchError> {
    file.persist(path.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

/// Writes through a temp file in the destination directory, then renames it
/// into place.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FetchError> {
    let mut temp = staging_file(&parent_dir(path))?;
    temp.write_all(content)
        .map_err(|err| FetchError::Filesystem(format!("write {path}: {err}")))?;
    persist(temp, path)
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), FetchError> {
    let mut content =
        serde_json::to_vec_pretty(value).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    content.push(b'\n');
    write_bytes_atomic(path, &content)
}
