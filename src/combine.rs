//! Combiner: concatenate completed artifacts into one delimited file.
//!
//! An artifact counts as completed when `<id>.txt` has a sibling
//! `<id>.meta.json`. Stray text files (the combined file itself, notes left
//! by hand) have no metadata and are ignored. The output uses the same
//! `===== id =====` markers the work-item source parses, so the OCR results
//! feed straight into the translation stage.

use crate::error::FolioError;
use crate::natural_sort::natural_cmp;
use crate::pipeline::persist;
use crate::pipeline::source::marker_line;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Read every completed artifact in `dir`, in natural id order.
///
/// Files that cannot be read are logged and left out. A missing directory
/// yields an empty list.
pub async fn load_completed(dir: &Path) -> Result<Vec<(String, String)>, FolioError> {
    let mut ids = completed_ids(dir).await.map_err(|e| {
        FolioError::Internal(format!("Failed to list {}: {e}", dir.display()))
    })?;
    ids.sort_by(|a, b| natural_cmp(a, b));

    let mut entries = Vec::with_capacity(ids.len());
    for id in ids {
        let path = persist::output_path(dir, &id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => entries.push((id, text)),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(entries)
}

async fn completed_ids(dir: &Path) -> io::Result<Vec<String>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut ids = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".txt")) else {
            continue;
        };
        if tokio::fs::try_exists(persist::metadata_path(dir, id))
            .await
            .unwrap_or(false)
        {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Render `(id, text)` pairs in the delimited block format.
pub fn render_combined(entries: &[(String, String)]) -> String {
    let mut out = String::new();
    for (id, text) in entries {
        out.push_str(&marker_line(id));
        out.push_str("\n\n");
        out.push_str(text.trim());
        out.push_str("\n\n");
    }
    out
}

/// Write `<dir>/<combined_name>` from the completed artifacts in `dir`.
///
/// Returns `Ok(None)` with a warning when there is nothing to combine.
pub async fn combine(dir: &Path, combined_name: &str) -> Result<Option<PathBuf>, FolioError> {
    let entries = load_completed(dir).await?;
    if entries.is_empty() {
        warn!("No completed outputs in {} to combine", dir.display());
        return Ok(None);
    }

    let path = dir.join(combined_name);
    persist::write_atomic(&path, render_combined(&entries))
        .await
        .map_err(|source| FolioError::OutputWriteFailed {
            path: path.clone(),
            source,
        })?;

    info!("Combined {} items into {}", entries.len(), path.display());
    Ok(Some(path))
}
