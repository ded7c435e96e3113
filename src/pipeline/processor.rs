//! Per-item processor: skip, transform, or record failure for one work item.
//!
//! Always returns a [`ProcessingResult`]; errors never propagate upward, so a
//! single bad item cannot abort its siblings. All writes target paths owned by
//! the item, which makes concurrent calls for distinct ids safe.

use crate::config::BatchConfig;
use crate::error::TransformFailure;
use crate::output::{ErrorRecord, ItemMetadata, ItemStatus, ProcessingResult};
use crate::pipeline::client::{transform_with_retry, Transformer};
use crate::pipeline::persist;
use crate::pipeline::source::WorkItem;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Process a single work item.
///
/// 1. Existing output and no `force` → `Skipped`, no remote call.
/// 2. An item whose input could not be built → `Failed`, no remote call.
/// 3. Otherwise transform with retry.
/// 4. Success → write `<id>.meta.json` then `<id>.txt`, drop any stale error
///    record → `Completed`.
/// 5. Failure (including write failures) → write `errors/<id>.error.json`
///    → `Failed`.
pub async fn process_item(
    item: &WorkItem,
    transformer: &dyn Transformer,
    config: &BatchConfig,
) -> ProcessingResult {
    let start = Instant::now();
    let dir = config.output_dir.as_path();

    if !persist::is_safe_id(&item.id) {
        error!("Refusing to process item with unsafe id {:?}", item.id);
        return ProcessingResult {
            id: item.id.clone(),
            status: ItemStatus::Failed,
            output_path: None,
            error: Some(TransformFailure::WriteFailed {
                path: dir.to_path_buf(),
                message: format!("id {:?} is not a valid file name", item.id),
            }),
            attempts: 0,
            duration_ms: 0,
        };
    }

    let output_path = persist::output_path(dir, &item.id);
    if !config.force && tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
        info!("Skipping {} - output already exists", item.id);
        return ProcessingResult::skipped(item.id.clone(), output_path);
    }

    let outcome = if let Some(ref reason) = item.unprepared {
        Err(TransformFailure::Unprepared {
            message: reason.clone(),
        })
    } else {
        info!("Processing {}...", item.id);
        match transform_with_retry(transformer, item, &config.retry_policy()).await {
            Ok(done) => persist_output(dir, item, &done.text, config)
                .await
                .map(|()| done.attempts),
            Err(failure) => Err(failure),
        }
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(attempts) => {
            info!("Saved {} to {}", item.id, output_path.display());
            ProcessingResult {
                id: item.id.clone(),
                status: ItemStatus::Completed,
                output_path: Some(output_path),
                error: None,
                attempts,
                duration_ms,
            }
        }
        Err(failure) => {
            error!("Failed to process {}: {}", item.id, failure);
            record_failure(dir, &item.id, &failure).await;
            ProcessingResult {
                id: item.id.clone(),
                status: ItemStatus::Failed,
                output_path: None,
                attempts: failure.attempts(),
                error: Some(failure),
                duration_ms,
            }
        }
    }
}

/// Write metadata, then output, then clear a stale error record.
///
/// `<id>.txt` goes last: it is what the skip check looks for, so it must only
/// appear once its metadata is in place. On a failed write both files are
/// removed so the item is picked up again on the next run.
async fn persist_output(
    dir: &Path,
    item: &WorkItem,
    text: &str,
    config: &BatchConfig,
) -> Result<(), TransformFailure> {
    let output_path = persist::output_path(dir, &item.id);
    let metadata_path = persist::metadata_path(dir, &item.id);

    let metadata = ItemMetadata {
        source_id: item.id.clone(),
        timestamp: Utc::now(),
        model: config.model_id().to_string(),
        input_length: item.input_len(),
        status: ItemStatus::Completed,
    };
    let written = match persist::write_json(&metadata_path, &metadata).await {
        Ok(()) => persist::write_atomic(&output_path, text)
            .await
            .map_err(|e| (output_path.as_path(), e)),
        Err(e) => Err((metadata_path.as_path(), e)),
    };
    if let Err((path, e)) = written {
        for partial in [&output_path, &metadata_path] {
            if let Err(e) = persist::remove_if_exists(partial).await {
                warn!("Could not remove {}: {}", partial.display(), e);
            }
        }
        return Err(TransformFailure::WriteFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        });
    }

    let stale = persist::error_path(dir, &item.id);
    if let Err(e) = persist::remove_if_exists(&stale).await {
        warn!("Could not remove stale error record {}: {}", stale.display(), e);
    }
    debug!("{}: wrote {} bytes", item.id, text.len());
    Ok(())
}

/// Best-effort write of the error record; a failure here is only logged.
async fn record_failure(dir: &Path, id: &str, failure: &TransformFailure) {
    let path = persist::error_path(dir, id);
    if let Err(e) = persist::write_json(&path, &ErrorRecord::new(id, failure)).await {
        error!("Could not write error record {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for Upper {
        async fn transform(&self, item: &WorkItem) -> Result<String, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(item.text.to_uppercase())
        }
    }

    struct AlwaysFatal;

    #[async_trait]
    impl Transformer for AlwaysFatal {
        async fn transform(&self, _item: &WorkItem) -> Result<String, TransformError> {
            Err(TransformError::fatal("invalid request"))
        }
    }

    fn config(dir: &Path, force: bool) -> BatchConfig {
        BatchConfig::builder()
            .output_dir(dir)
            .force(force)
            .model("test-model")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn completed_item_writes_output_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let t = Upper { calls: AtomicUsize::new(0) };
        let item = WorkItem::text("page_1", "hello");

        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Completed);
        assert_eq!(r.attempts, 1);

        let out = std::fs::read_to_string(dir.path().join("page_1.txt")).unwrap();
        assert_eq!(out, "HELLO");

        let meta: ItemMetadata = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("page_1.meta.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta.source_id, "page_1");
        assert_eq!(meta.model, "test-model");
        assert_eq!(meta.input_length, 5);
        assert_eq!(meta.status, ItemStatus::Completed);
    }

    #[tokio::test]
    async fn existing_output_is_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page_1.txt"), "previous").unwrap();
        let t = Upper { calls: AtomicUsize::new(0) };
        let item = WorkItem::text("page_1", "hello");

        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Skipped);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("page_1.txt")).unwrap(),
            "previous"
        );

        let r = process_item(&item, &t, &config(dir.path(), true)).await;
        assert_eq!(r.status, ItemStatus::Completed);
        assert_eq!(t.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("page_1.txt")).unwrap(),
            "HELLO"
        );
    }

    #[tokio::test]
    async fn failure_writes_error_record_only() {
        let dir = tempfile::tempdir().unwrap();
        let item = WorkItem::text("page_2", "x");

        let r = process_item(&item, &AlwaysFatal, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Failed);
        assert!(matches!(r.error, Some(TransformFailure::Fatal { .. })));
        assert!(!dir.path().join("page_2.txt").exists());
        assert!(!dir.path().join("page_2.meta.json").exists());

        let record: ErrorRecord = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("errors/page_2.error.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(record.source_id, "page_2");
        assert!(record.error_message.contains("invalid request"));
    }

    #[tokio::test]
    async fn success_clears_stale_error_record() {
        let dir = tempfile::tempdir().unwrap();
        let item = WorkItem::text("page_3", "retry me");

        process_item(&item, &AlwaysFatal, &config(dir.path(), false)).await;
        assert!(dir.path().join("errors/page_3.error.json").exists());

        let t = Upper { calls: AtomicUsize::new(0) };
        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Completed);
        assert!(!dir.path().join("errors/page_3.error.json").exists());
    }

    #[tokio::test]
    async fn failed_metadata_write_leaves_item_pending() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the temp file should go makes the write fail.
        let blocker = dir.path().join("page_1.meta.json.tmp");
        std::fs::create_dir_all(blocker.join("x")).unwrap();
        let t = Upper { calls: AtomicUsize::new(0) };
        let item = WorkItem::text("page_1", "hello");

        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Failed);
        assert!(matches!(r.error, Some(TransformFailure::WriteFailed { .. })));
        assert!(!dir.path().join("page_1.txt").exists());
        assert!(!dir.path().join("page_1.meta.json").exists());
        assert!(dir.path().join("errors/page_1.error.json").exists());

        std::fs::remove_dir_all(&blocker).unwrap();
        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Completed);
        assert_eq!(t.calls.load(Ordering::SeqCst), 2);
        assert!(dir.path().join("page_1.meta.json").exists());
        assert!(!dir.path().join("errors/page_1.error.json").exists());
    }

    #[tokio::test]
    async fn failed_output_write_removes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("page_1.txt.tmp/x")).unwrap();
        let t = Upper { calls: AtomicUsize::new(0) };

        let item = WorkItem::text("page_1", "hello");

        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Failed);
        assert!(!dir.path().join("page_1.txt").exists());
        assert!(!dir.path().join("page_1.meta.json").exists());
        assert!(dir.path().join("errors/page_1.error.json").exists());
    }

    #[tokio::test]
    async fn unprepared_item_fails_without_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let t = Upper { calls: AtomicUsize::new(0) };
        let item = WorkItem::unprepared("page_4", "render failed");

        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Failed);
        assert_eq!(r.attempts, 0);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);

        let record: ErrorRecord = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("errors/page_4.error.json")).unwrap(),
        )
        .unwrap();
        assert!(record.error_message.contains("render failed"));
    }

    #[tokio::test]
    async fn unsafe_id_fails_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let t = Upper { calls: AtomicUsize::new(0) };
        let item = WorkItem::text("../escape", "x");

        let r = process_item(&item, &t, &config(dir.path(), false)).await;
        assert_eq!(r.status, ItemStatus::Failed);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }
}
