//! Batch runner: drive the per-item processor over a bounded worker pool.
//!
//! Items are dispatched in list order through `buffer_unordered`, so at most
//! `config.workers` transforms are in flight and completion order is
//! arbitrary. A failed item never stops the batch. The run summary is
//! written once, after every dispatched item has finished.

use crate::config::BatchConfig;
use crate::error::FolioError;
use crate::output::{ItemStatus, ProcessingResult, RunSummary};
use crate::pipeline::client::Transformer;
use crate::pipeline::persist;
use crate::pipeline::processor::process_item;
use crate::pipeline::source::WorkItem;
use futures::future;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Run `items` through `transformer` and persist the run summary.
///
/// `input_label` names where the items came from; it is recorded in the
/// summary and in the [`FolioError::NoWorkItems`] error.
///
/// # Errors
/// Only for conditions that stop the run before any item is attempted or
/// prevent the summary from being written:
/// - no items, or a subset that matches none of them
/// - the output directory or summary file cannot be written
pub async fn run_batch(
    items: Vec<WorkItem>,
    transformer: Arc<dyn Transformer>,
    config: &BatchConfig,
    input_label: &str,
) -> Result<RunSummary, FolioError> {
    let start = Instant::now();
    if items.is_empty() {
        return Err(FolioError::NoWorkItems {
            path: PathBuf::from(input_label),
        });
    }

    let items = select_items(items, config)?;
    let total = items.len();
    let dir = config.output_dir.as_path();

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| FolioError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })?;

    info!(
        "Starting {} batch: {} items, {} worker(s), output {}",
        config.stage.label(),
        total,
        config.workers,
        dir.display()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let transformer = transformer.as_ref();
    let results: Vec<ProcessingResult> = stream::iter(items)
        .take_while(|_| future::ready(!config.is_cancelled()))
        .map(move |item| async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_item_start(&item.id);
            }
            let result = process_item(&item, transformer, config).await;
            if let Some(ref cb) = config.progress_callback {
                let error = result.error.as_ref().map(ToString::to_string);
                cb.on_item_finish(&result.id, result.status, error.as_deref());
            }
            result
        })
        .buffer_unordered(config.workers)
        .collect()
        .await;

    let interrupted = results.len() < total;
    if interrupted {
        warn!(
            "Batch interrupted: {} of {} items dispatched",
            results.len(),
            total
        );
    }

    let summary = RunSummary::from_results(
        config.stage,
        input_label,
        dir.to_path_buf(),
        config.model_id(),
        total,
        &results,
        interrupted,
    );

    let summary_path = dir.join(config.stage.summary_file_name());
    persist::write_json(&summary_path, &summary)
        .await
        .map_err(|source| FolioError::OutputWriteFailed {
            path: summary_path.clone(),
            source,
        })?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(summary.completed, summary.skipped, summary.failed);
    }

    info!(
        "Batch finished in {:.1}s: {} completed, {} skipped, {} failed",
        start.elapsed().as_secs_f64(),
        summary.completed,
        summary.skipped,
        summary.failed
    );
    for r in results.iter().filter(|r| r.status == ItemStatus::Failed) {
        if let Some(ref e) = r.error {
            warn!("  {}: {}", r.id, e);
        }
    }

    Ok(summary)
}

/// Apply the subset filter, keeping list order.
fn select_items(items: Vec<WorkItem>, config: &BatchConfig) -> Result<Vec<WorkItem>, FolioError> {
    let Some(ref subset) = config.subset else {
        return Ok(items);
    };

    let selected: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| subset.contains(&item.id))
        .collect();

    if selected.is_empty() {
        return Err(FolioError::NoMatchingItems {
            requested: subset.iter().cloned().collect(),
        });
    }
    if selected.len() < subset.len() {
        warn!(
            "{} requested item(s) not present in the input",
            subset.len() - selected.len()
        );
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::progress::BatchProgressCallback;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Echo;

    #[async_trait]
    impl Transformer for Echo {
        async fn transform(&self, item: &WorkItem) -> Result<String, TransformError> {
            Ok(item.text.clone())
        }
    }

    /// Raises the cancel flag after its first call.
    struct CancelAfterFirst {
        flag: Arc<AtomicBool>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for CancelAfterFirst {
        async fn transform(&self, item: &WorkItem) -> Result<String, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.flag.store(true, Ordering::SeqCst);
            Ok(item.text.clone())
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl BatchProgressCallback for Recorder {
        fn on_batch_start(&self, total_items: usize) {
            self.events.lock().unwrap().push(format!("start {total_items}"));
        }
        fn on_item_finish(&self, id: &str, status: ItemStatus, _error: Option<&str>) {
            self.events.lock().unwrap().push(format!("{id} {status}"));
        }
        fn on_batch_complete(&self, completed: usize, skipped: usize, failed: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {completed}/{skipped}/{failed}"));
        }
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem::text(format!("page_{i}"), format!("text {i}")))
            .collect()
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig::builder().output_dir(dir.path()).build().unwrap();
        let err = run_batch(Vec::new(), Arc::new(Echo), &config, "in.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::NoWorkItems { .. }));
    }

    #[tokio::test]
    async fn subset_limits_processing() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig::builder()
            .output_dir(dir.path())
            .subset(["page_2"])
            .build()
            .unwrap();

        let summary = run_batch(items(3), Arc::new(Echo), &config, "in.txt")
            .await
            .unwrap();
        assert_eq!(summary.total_items, 1);
        assert_eq!(summary.completed, 1);
        assert!(dir.path().join("page_2.txt").exists());
        assert!(!dir.path().join("page_1.txt").exists());
    }

    #[tokio::test]
    async fn summary_is_written_and_callbacks_fire() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let config = BatchConfig::builder()
            .output_dir(dir.path())
            .progress_callback(recorder.clone())
            .build()
            .unwrap();

        run_batch(items(2), Arc::new(Echo), &config, "in.txt")
            .await
            .unwrap();

        let written: RunSummary = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("translation_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written.completed, 2);
        assert_eq!(written.input, "in.txt");
        assert!(!written.interrupted);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.first().unwrap(), "start 2");
        assert_eq!(events.last().unwrap(), "done 2/0/0");
        assert!(events.contains(&"page_1 completed".to_string()));
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let transformer = Arc::new(CancelAfterFirst {
            flag: Arc::clone(&flag),
            calls: AtomicUsize::new(0),
        });
        let config = BatchConfig::builder()
            .output_dir(dir.path())
            .cancel_flag(flag)
            .build()
            .unwrap();

        let summary = run_batch(items(5), transformer.clone(), &config, "in.txt")
            .await
            .unwrap();
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 1);
        assert!(summary.interrupted);
        assert_eq!(summary.total_items, 5);
        assert_eq!(summary.completed, 1);
    }
}
