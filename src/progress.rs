//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch runner works through its items. The CLI forwards them to an
//! `indicatif` progress bar; library users can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use folio_translate::{BatchConfig, BatchProgressCallback, ItemStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_finish(&self, id: &str, status: ItemStatus, _error: Option<&str>) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{id}: {status} ({done} done)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ItemStatus;
use std::sync::Arc;

/// Called by the batch runner as it processes each item.
///
/// With more than one worker the item events arrive concurrently and out of
/// order; implementations must protect shared state (`Mutex`, atomics).
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, before the first item is dispatched.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called when a worker picks up an item.
    fn on_item_start(&self, id: &str) {
        let _ = id;
    }

    /// Called when an item reaches its final status for this run.
    fn on_item_finish(&self, id: &str, status: ItemStatus, error: Option<&str>) {
        let _ = (id, status, error);
    }

    /// Called once after every dispatched item has finished.
    fn on_batch_complete(&self, completed: usize, skipped: usize, failed: usize) {
        let _ = (completed, skipped, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        started_total: AtomicUsize,
        starts: AtomicUsize,
        failures: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_items: usize) {
            self.started_total.store(total_items, Ordering::SeqCst);
        }

        fn on_item_start(&self, _id: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_finish(&self, _id: &str, status: ItemStatus, _error: Option<&str>) {
            if status == ItemStatus::Failed {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_batch_complete(&self, completed: usize, _skipped: usize, _failed: usize) {
            self.completed_total.store(completed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_item_start("page_1");
        cb.on_item_finish("page_1", ItemStatus::Completed, None);
        cb.on_item_finish("page_2", ItemStatus::Failed, Some("boom"));
        cb.on_batch_complete(1, 0, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(3);
        tracker.on_item_start("page_1");
        tracker.on_item_finish("page_1", ItemStatus::Completed, None);
        tracker.on_item_start("page_2");
        tracker.on_item_finish("page_2", ItemStatus::Skipped, None);
        tracker.on_item_start("page_3");
        tracker.on_item_finish("page_3", ItemStatus::Failed, Some("fatal"));
        tracker.on_batch_complete(1, 1, 1);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 1);
    }
}
