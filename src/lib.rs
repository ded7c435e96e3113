//! # folio-translate
//!
//! OCR and translate scanned Arabic books with multimodal LLMs, then typeset
//! the result as a facing-page LaTeX edition.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. OCR        render pages, one vision call per page  → ocr_results.txt
//!  ├─ 2. Translate  one call per `===== page_N =====` block → combined_translation.txt
//!  └─ 3. Typeset    English left, Arabic right             → book.tex
//! ```
//!
//! Stages 1 and 2 share one engine: a resumable batch runner over a fixed
//! list of work items. Each item's output is written as soon as it is ready,
//! so a re-run skips finished items and only retries what failed. Remote
//! calls are retried with exponential backoff on rate limits and transient
//! errors; a failed item is recorded under `errors/` and never stops the
//! batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_translate::{run_translation, BatchConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY and friends
//!     let config = BatchConfig::builder()
//!         .output_dir("output/translations")
//!         .workers(2)
//!         .build()?;
//!     let out = run_translation(Path::new("output/ocr_results.txt"), &config).await?;
//!     eprintln!(
//!         "{} completed, {} skipped, {} failed",
//!         out.summary.completed, out.summary.skipped, out.summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folio` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod combine;
pub mod config;
pub mod error;
pub mod latex;
pub mod natural_sort;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::run_batch;
pub use combine::combine;
pub use config::{BatchConfig, BatchConfigBuilder, Stage, DEFAULT_MODEL};
pub use error::{ErrorClass, FolioError, TransformError, TransformFailure};
pub use latex::{build_book, write_book, BookOptions};
pub use natural_sort::{natural_cmp, natural_sort_key};
pub use output::{ItemMetadata, ItemStatus, ProcessingResult, RunSummary, StageOutput};
pub use pipeline::client::{transform_with_retry, LlmTransformer, RetryPolicy, Transformer};
pub use pipeline::source::{load_work_items, parse_work_items, WorkItem};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stage::{run_ocr, run_ocr_with, run_translation, run_translation_with};
