//! Error types for the folio-translate library.
//!
//! Three layers of failure, from widest to narrowest:
//!
//! * [`FolioError`] (**fatal**): the run cannot proceed at all (missing input
//!   file, zero parsed items, provider not configured, output directory not
//!   writable). Returned as `Err(FolioError)` from the stage and batch entry
//!   points.
//!
//! * [`TransformFailure`] (**per item**): one work item could not be
//!   transformed after the retry policy gave up, or its output could not be
//!   written. Recorded as an error record under `errors/` and a `failed`
//!   status; it never leaves the worker that owns the item.
//!
//! * [`TransformError`] (**per call**): a single remote call failed, tagged
//!   with an [`ErrorClass`] that drives the retry decision.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the folio-translate library.
///
/// Item-level failures use [`TransformFailure`] and are stored in
/// [`crate::output::ProcessingResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum FolioError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The input file yielded no `===== <id> =====` blocks.
    #[error("No work items found in '{path}'\nExpected blocks starting with a line like '===== page_1 ====='.")]
    NoWorkItems { path: PathBuf },

    /// A subset of ids was requested but none of them exist in the input.
    #[error("None of the requested items were found: {}", requested.join(", "))]
    NoMatchingItems { requested: Vec<String> },

    /// The translations directory holds no completed outputs.
    #[error("No completed translations found in '{path}'")]
    NoTranslations { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (the file or its directory),\n\
or place libpdfium next to the working directory."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Some items succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::RunSummary::into_result`] when the caller
    /// wants to treat any item failure as an error.
    #[error("{failed}/{total} items failed during the batch")]
    PartialFailure { failed: usize, total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure class of one remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The API asked us to slow down (HTTP 429, quota exhausted).
    RateLimit,
    /// Timeouts, network drops, 5xx, overloaded backends.
    Transient,
    /// Authentication, bad requests, content filters, malformed responses.
    Fatal,
}

impl ErrorClass {
    /// Whether the retry policy may try again after this class of failure.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

/// A single failed remote call.
#[derive(Debug, Clone, Error)]
#[error("{class:?}: {message}")]
pub struct TransformError {
    pub class: ErrorClass,
    pub message: String,
}

impl TransformError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::RateLimit,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Fatal,
            message: message.into(),
        }
    }
}

/// Why a work item ended up `failed`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformFailure {
    /// Every attempt failed with a retryable error.
    #[error("failed after {attempts} attempts ({class:?}): {message}")]
    Exhausted {
        attempts: u32,
        class: ErrorClass,
        message: String,
    },

    /// A non-retryable error on the given attempt.
    #[error("fatal error on attempt {attempt}: {message}")]
    Fatal { attempt: u32, message: String },

    /// The transform succeeded but its output could not be persisted.
    #[error("could not write '{path}': {message}")]
    WriteFailed { path: PathBuf, message: String },

    /// The item's input could not be built (page render or encode).
    #[error("input not prepared: {message}")]
    Unprepared { message: String },
}

impl TransformFailure {
    /// Number of remote calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            TransformFailure::Exhausted { attempts, .. } => *attempts,
            TransformFailure::Fatal { attempt, .. } => *attempt,
            TransformFailure::WriteFailed { .. } => 1,
            TransformFailure::Unprepared { .. } => 0,
        }
    }

    /// Class recorded in the error artifact.
    pub fn class(&self) -> ErrorClass {
        match self {
            TransformFailure::Exhausted { class, .. } => *class,
            TransformFailure::Fatal { .. }
            | TransformFailure::WriteFailed { .. }
            | TransformFailure::Unprepared { .. } => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = FolioError::PartialFailure {
            failed: 1,
            total: 10,
        };
        assert!(e.to_string().contains("1/10"), "got: {e}");
    }

    #[test]
    fn no_matching_items_lists_requested_ids() {
        let e = FolioError::NoMatchingItems {
            requested: vec!["page_7".into(), "page_9".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("page_7, page_9"), "got: {msg}");
    }

    #[test]
    fn only_fatal_class_is_not_retryable() {
        assert!(ErrorClass::RateLimit.is_retryable());
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
    }

    #[test]
    fn exhausted_failure_reports_attempts() {
        let f = TransformFailure::Exhausted {
            attempts: 4,
            class: ErrorClass::RateLimit,
            message: "429 Too Many Requests".into(),
        };
        assert_eq!(f.attempts(), 4);
        assert_eq!(f.class(), ErrorClass::RateLimit);
        assert!(f.to_string().contains("4 attempts"));
    }

    #[test]
    fn failure_serialises_with_kind_tag() {
        let f = TransformFailure::Fatal {
            attempt: 1,
            message: "invalid x-api-key".into(),
        };
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["kind"], "fatal");
        assert_eq!(json["attempt"], 1);
    }
}
