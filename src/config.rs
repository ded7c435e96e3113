//! Configuration types for a batch run.
//!
//! Every knob of the OCR and translation stages lives in [`BatchConfig`],
//! built via its [`BatchConfigBuilder`]. The config is passed explicitly into
//! the batch runner and threaded down to the transform client, so tests can
//! swap in a scripted provider without touching the environment.

use crate::error::FolioError;
use crate::pipeline::client::RetryPolicy;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-latest";

/// Which transform a batch performs.
///
/// The stage decides the prompts sent to the model and the names of the
/// shared artifacts written at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Extract Arabic text from rendered page images.
    Ocr,
    /// Translate extracted Arabic text into English.
    #[default]
    Translation,
}

impl Stage {
    /// File name of the run summary inside the output directory.
    pub fn summary_file_name(self) -> &'static str {
        match self {
            Stage::Ocr => "ocr_summary.json",
            Stage::Translation => "translation_summary.json",
        }
    }

    /// File name of the combined artifact inside the output directory.
    pub fn combined_file_name(self) -> &'static str {
        match self {
            Stage::Ocr => "ocr_results.txt",
            Stage::Translation => "combined_translation.txt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::Translation => "translation",
        }
    }
}

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use folio_translate::{BatchConfig, Stage};
///
/// let config = BatchConfig::builder()
///     .stage(Stage::Translation)
///     .output_dir("output/translations")
///     .workers(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Transform performed by this run. Default: [`Stage::Translation`].
    pub stage: Stage,

    /// Directory receiving per-item outputs, metadata, errors and the summary.
    pub output_dir: PathBuf,

    /// Number of items processed concurrently. Default: 1.
    ///
    /// Sequential by default: the remote API rate-limits aggressively and a
    /// single worker rarely trips it. Raise it for large batches once the
    /// account limits are known.
    pub workers: usize,

    /// Re-run items whose output already exists. Default: false.
    pub force: bool,

    /// Restrict the run to these ids. `None` processes every item.
    pub subset: Option<BTreeSet<String>>,

    /// Write the combined artifact after the batch. Default: true.
    pub combine: bool,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per item. Default: 4000.
    pub max_tokens: usize,

    /// Retries after the first attempt on rate-limit or transient errors. Default: 3.
    pub max_retries: u32,

    /// Base backoff delay in milliseconds, doubled after each attempt. Default: 2000.
    ///
    /// With the defaults the waits are 2 s → 4 s → 8 s.
    pub retry_base_delay_ms: u64,

    /// Per-call timeout in seconds; a timeout counts as a transient error. Default: 180.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the stage's built-in prompt.
    pub system_prompt: Option<String>,

    /// Rendering DPI for the OCR stage. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Longest rendered edge in pixels for the OCR stage. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-item progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Set to stop dispatching new items; in-flight items still finish.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            output_dir: PathBuf::from("output"),
            workers: 1,
            force: false,
            subset: None,
            combine: true,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4000,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            api_timeout_secs: 180,
            system_prompt: None,
            dpi: 200,
            max_rendered_pixels: 2000,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("stage", &self.stage)
            .field("output_dir", &self.output_dir)
            .field("workers", &self.workers)
            .field("force", &self.force)
            .field("subset", &self.subset)
            .field("combine", &self.combine)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("dpi", &self.dpi)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model identifier recorded in metadata and sent to the provider.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Backoff schedule for the transform client.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Whether the operator asked to stop dispatching new items.
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.config.stage = stage;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    /// Restrict the run to the given ids. An empty iterator clears the filter.
    pub fn subset<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        self.config.subset = if ids.is_empty() { None } else { Some(ids) };
        self
    }

    pub fn combine(mut self, v: bool) -> Self {
        self.config.combine = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, FolioError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(FolioError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(FolioError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(FolioError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
