//! Result and record types written by a batch run.
//!
//! Everything here derives `Serialize` because it ends up on disk as JSON:
//! per-item metadata next to each output, error records under `errors/`,
//! and the run summary at the root of the output directory.

use crate::config::Stage;
use crate::error::{ErrorClass, FolioError, TransformFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Final status of one work item in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Skipped,
    Failed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Completed => "completed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of processing a single work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub id: String,
    pub status: ItemStatus,
    /// Output artifact, set for completed and skipped items.
    pub output_path: Option<PathBuf>,
    /// Why the item failed, set only for failed items.
    pub error: Option<TransformFailure>,
    /// Remote calls made (0 for skipped items).
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ProcessingResult {
    pub fn skipped(id: impl Into<String>, output_path: PathBuf) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::Skipped,
            output_path: Some(output_path),
            error: None,
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Sidecar written next to every completed output (`<id>.meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_length: usize,
    pub status: ItemStatus,
}

/// Written to `errors/<id>.error.json` for every failed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub error_message: String,
    pub error_class: ErrorClass,
    pub attempts: u32,
    pub status: ItemStatus,
}

impl ErrorRecord {
    pub fn new(source_id: &str, failure: &TransformFailure) -> Self {
        Self {
            source_id: source_id.to_string(),
            timestamp: Utc::now(),
            error_message: failure.to_string(),
            error_class: failure.class(),
            attempts: failure.attempts(),
            status: ItemStatus::Failed,
        }
    }
}

/// Aggregate of one batch run, persisted as `<stage>_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    /// Input file, PDF path or URL the items came from.
    pub input: String,
    pub output_directory: PathBuf,
    pub model: String,
    /// Items selected for this run (after the subset filter).
    pub total_items: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// True when dispatch stopped early on operator request.
    pub interrupted: bool,
    pub results: BTreeMap<String, ItemStatus>,
}

impl RunSummary {
    /// Build a summary from per-item results.
    pub fn from_results(
        stage: Stage,
        input: impl Into<String>,
        output_directory: PathBuf,
        model: impl Into<String>,
        total_items: usize,
        results: &[ProcessingResult],
        interrupted: bool,
    ) -> Self {
        let count = |s: ItemStatus| results.iter().filter(|r| r.status == s).count();
        Self {
            timestamp: Utc::now(),
            stage,
            input: input.into(),
            output_directory,
            model: model.into(),
            total_items,
            completed: count(ItemStatus::Completed),
            skipped: count(ItemStatus::Skipped),
            failed: count(ItemStatus::Failed),
            interrupted,
            results: results
                .iter()
                .map(|r| (r.id.clone(), r.status))
                .collect(),
        }
    }

    /// Items that reached a final status in this run.
    pub fn processed(&self) -> usize {
        self.completed + self.skipped + self.failed
    }

    /// Turn any item failure into an error, for callers with zero tolerance.
    pub fn into_result(self) -> Result<RunSummary, FolioError> {
        if self.failed > 0 {
            Err(FolioError::PartialFailure {
                failed: self.failed,
                total: self.total_items,
            })
        } else {
            Ok(self)
        }
    }
}

/// What a stage produced: the run summary plus the combined artifact, if any.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub summary: RunSummary,
    pub combined: Option<PathBuf>,
}
