//! Artifact paths and atomic writes inside an output directory.
//!
//! Every file is written to a sibling `*.tmp` and renamed into place, so an
//! interrupted run never leaves a truncated output that the next run would
//! mistake for a finished item.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Sub-directory holding error records.
pub const ERRORS_DIR: &str = "errors";

/// `<dir>/<id>.txt`
pub fn output_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.txt"))
}

/// `<dir>/<id>.meta.json`
pub fn metadata_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.meta.json"))
}

/// `<dir>/errors/<id>.error.json`
pub fn error_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(ERRORS_DIR).join(format!("{id}.error.json"))
}

/// Whether `id` can be used as a file stem without escaping the directory.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

/// Write `contents` to `path` via a temp file and rename.
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}

/// Serialise `value` as pretty JSON and write it atomically.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    write_atomic(path, json).await
}

/// Remove `path`, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
