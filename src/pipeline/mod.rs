//! Per-item pipeline stages shared by OCR and translation.
//!
//! Each submodule implements one step. The batch runner in [`crate::batch`]
//! drives them per work item; nothing here knows about concurrency.
//!
//! ## Data Flow
//!
//! ```text
//!  PDF ──▶ input ──▶ render ──▶ encode ─┐
//!                                       ├─▶ processor ──▶ client ──▶ persist
//!  ocr_results.txt ──▶ source ──────────┘    (skip?)     (retry)   (atomic)
//! ```
//!
//! 1. [`input`]  resolve a local PDF path or download a URL
//! 2. [`render`] rasterise the pages that still need OCR (`spawn_blocking`)
//! 3. [`encode`] PNG-encode each page for the multimodal request
//! 4. [`source`] parse `===== id =====` blocks into work items
//! 5. [`processor`] skip finished items, otherwise transform and persist
//! 6. [`client`] one remote call with classified errors and backoff
//! 7. [`persist`] artifact paths and temp-file-plus-rename writes
//! 8. [`postprocess`] cleanup rules applied when typesetting model output

pub mod client;
pub mod encode;
pub mod input;
pub mod persist;
pub mod postprocess;
pub mod processor;
pub mod render;
pub mod source;
