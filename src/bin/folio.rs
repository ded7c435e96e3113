//! CLI binary for folio-translate.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`
//! and prints run summaries.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use folio_translate::{
    combine, run_ocr, run_translation, write_book, BatchConfig, BatchConfigBuilder,
    BatchProgressCallback, BookOptions, ItemStatus, ProgressCallback, Stage, StageOutput,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished item. Items may finish
/// out of order when more than one worker runs.
struct CliProgressCallback {
    bar: ProgressBar,
    label: &'static str,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new(stage: Stage) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading items…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            label: match stage {
                Stage::Ocr => "OCR",
                Stage::Translation => "Translating",
            },
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, id: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} items  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix(self.label);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} {total_items} items…", self.label))
        ));
    }

    fn on_item_start(&self, id: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(id.to_string(), Instant::now());
        }
        self.bar.set_message(id.to_string());
    }

    fn on_item_finish(&self, id: &str, status: ItemStatus, error: Option<&str>) {
        let secs = self.elapsed_secs(id);
        let line = match status {
            ItemStatus::Completed => format!(
                "  {} {:<12} {}",
                green("✓"),
                id,
                dim(&format!("{secs:.1}s"))
            ),
            ItemStatus::Skipped => format!("  {} {:<12} {}", dim("·"), id, dim("already done")),
            ItemStatus::Failed => {
                let msg = error.unwrap_or("failed");
                let msg = match msg.char_indices().nth(79) {
                    Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
                    None => msg.to_string(),
                };
                format!("  {} {:<12} {}", red("✗"), id, red(&msg))
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, completed: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} completed, {} skipped, {} failed",
            mark,
            bold(&completed.to_string()),
            skipped,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 1. OCR a scanned book (pages already done are skipped on re-run)
  folio ocr book.pdf -o output/ocr

  # 2. Translate the OCR results with two workers
  folio translate output/ocr/ocr_results.txt -o output/translations --workers 2

  # Retry only a few pages, overwriting previous output
  folio translate output/ocr/ocr_results.txt -o output/translations --pages 3,7-9 --force

  # Rebuild the combined file from finished pages
  folio combine output/translations

  # 3. Typeset a facing-page edition
  folio latex --ocr-file output/ocr/ocr_results.txt \
      --translations-dir output/translations -o book.tex --title "Chapter 178"

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default provider)
  EDGEQUAKE_LLM_PROVIDER  Provider used with EDGEQUAKE_MODEL (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model used with EDGEQUAKE_LLM_PROVIDER
  PDFIUM_LIB_PATH         libpdfium file, or the directory holding it
  RUST_LOG                Overrides the log filter
  FOLIO_*                 Every flag, e.g. FOLIO_WORKERS=2

A .env file in the working directory is loaded at start-up.
"#;

/// OCR, translate and typeset scanned Arabic books with LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version,
    about = "OCR, translate and typeset scanned Arabic books with LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract Arabic text from each page of a PDF.
    Ocr {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Directory for per-page outputs.
        #[arg(short, long, env = "FOLIO_OCR_DIR", default_value = "output/ocr")]
        output: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,

        /// Rendering DPI (72–400).
        #[arg(long, env = "FOLIO_DPI", default_value_t = 200,
              value_parser = clap::value_parser!(u32).range(72..=400))]
        dpi: u32,

        /// Longest rendered page edge in pixels.
        #[arg(long, env = "FOLIO_MAX_PIXELS", default_value_t = 2000)]
        max_pixels: u32,

        /// PDF user password for encrypted documents.
        #[arg(long, env = "FOLIO_PASSWORD")]
        password: Option<String>,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "FOLIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,
    },

    /// Translate an OCR results file block by block.
    Translate {
        /// File of `===== page_N =====` blocks (e.g. ocr_results.txt).
        ocr_file: PathBuf,

        /// Directory for per-page translations.
        #[arg(short, long, env = "FOLIO_TRANSLATIONS_DIR", default_value = "output/translations")]
        output: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,

        /// Text file with a custom system prompt.
        #[arg(long, env = "FOLIO_SYSTEM_PROMPT")]
        system_prompt: Option<PathBuf>,
    },

    /// Concatenate finished outputs of a directory in page order.
    Combine {
        /// Directory holding `<id>.txt` and `<id>.meta.json` pairs.
        dir: PathBuf,

        /// Name of the combined file inside the directory.
        #[arg(long, default_value = "combined_translation.txt")]
        name: String,
    },

    /// Build a facing-page LaTeX book from OCR results and translations.
    Latex {
        /// OCR results file (Arabic).
        #[arg(long, env = "FOLIO_OCR_FILE", default_value = "output/ocr/ocr_results.txt")]
        ocr_file: PathBuf,

        /// Directory of finished translations (English).
        #[arg(long, env = "FOLIO_TRANSLATIONS_DIR", default_value = "output/translations")]
        translations_dir: PathBuf,

        /// Output `.tex` file.
        #[arg(short, long, default_value = "output/book.tex")]
        output: PathBuf,

        #[arg(long, env = "FOLIO_TITLE", default_value = "Facing-Page Translation")]
        title: String,

        #[arg(long, env = "FOLIO_AUTHOR", default_value = "Unknown")]
        author: String,

        #[arg(long, env = "FOLIO_TRANSLATOR", default_value = "Machine translation")]
        translator: String,

        /// Chapter heading placed before the first page.
        #[arg(long, env = "FOLIO_CHAPTER")]
        chapter: Option<String>,
    },
}

/// Flags shared by the `ocr` and `translate` stages.
#[derive(Args, Debug)]
struct BatchArgs {
    /// Items processed concurrently.
    #[arg(short, long, env = "FOLIO_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Reprocess items whose output already exists.
    #[arg(long, env = "FOLIO_FORCE")]
    force: bool,

    /// Only these pages: 5, 3-9, page_12, or a comma-separated mix.
    #[arg(long, env = "FOLIO_PAGES", value_delimiter = ',')]
    pages: Vec<String>,

    /// Do not write the combined file after the run.
    #[arg(long, env = "FOLIO_NO_COMBINED")]
    no_combined: bool,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug)]
struct CommonArgs {
    /// LLM model ID.
    #[arg(long, global = true, env = "FOLIO_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, global = true, env = "FOLIO_PROVIDER")]
    provider: Option<String>,

    /// Retries per item after the first attempt.
    #[arg(long, global = true, env = "FOLIO_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base backoff delay in milliseconds, doubled per retry.
    #[arg(long, global = true, env = "FOLIO_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    /// Max LLM output tokens per item.
    #[arg(long, global = true, env = "FOLIO_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "FOLIO_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "FOLIO_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// Exit non-zero when any item failed.
    #[arg(long, global = true, env = "FOLIO_STRICT")]
    strict: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FOLIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FOLIO_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "FOLIO_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; everything can come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let common = &cli.common;

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would interleave with the bar, so the bar wins.
    let is_batch = matches!(cli.command, Command::Ocr { .. } | Command::Translate { .. });
    let show_progress = is_batch && !common.quiet && !common.no_progress;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Ocr {
            input,
            output,
            batch,
            dpi,
            max_pixels,
            password,
            download_timeout,
        } => {
            let mut builder = batch_builder(common, batch, output, Stage::Ocr, show_progress)?
                .dpi(*dpi)
                .max_rendered_pixels(*max_pixels)
                .download_timeout_secs(*download_timeout);
            if let Some(pwd) = password {
                builder = builder.password(pwd.clone());
            }
            let config = builder.build().context("Invalid configuration")?;
            let out = run_ocr(input, &config).await.context("OCR failed")?;
            report(common, &out, show_progress)?;
        }

        Command::Translate {
            ocr_file,
            output,
            batch,
            system_prompt,
        } => {
            let mut builder =
                batch_builder(common, batch, output, Stage::Translation, show_progress)?;
            if let Some(path) = system_prompt {
                let prompt = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read system prompt from {path:?}"))?;
                builder = builder.system_prompt(prompt);
            }
            let config = builder.build().context("Invalid configuration")?;
            let out = run_translation(ocr_file, &config)
                .await
                .context("Translation failed")?;
            report(common, &out, show_progress)?;
        }

        Command::Combine { dir, name } => {
            match combine(dir, name).await.context("Combine failed")? {
                Some(path) if !common.quiet => {
                    eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()))
                }
                Some(_) => {}
                None => eprintln!("{} nothing to combine in {}", cyan("⚠"), dir.display()),
            }
        }

        Command::Latex {
            ocr_file,
            translations_dir,
            output,
            title,
            author,
            translator,
            chapter,
        } => {
            let options = BookOptions {
                title: title.clone(),
                author: author.clone(),
                translator: translator.clone(),
                chapter: chapter.clone(),
            };
            write_book(ocr_file, translations_dir, output, &options)
                .await
                .context("LaTeX generation failed")?;
            if !common.quiet {
                eprintln!(
                    "{} wrote {}  {}",
                    green("✔"),
                    bold(&output.display().to_string()),
                    dim(&format!("compile with: xelatex {}", output.display()))
                );
            }
        }
    }

    Ok(())
}

/// Map shared flags to a `BatchConfigBuilder`.
fn batch_builder(
    common: &CommonArgs,
    batch: &BatchArgs,
    output: &Path,
    stage: Stage,
    show_progress: bool,
) -> Result<BatchConfigBuilder> {
    let ids = parse_item_ids(&batch.pages)?;

    let mut builder = BatchConfig::builder()
        .stage(stage)
        .output_dir(output)
        .workers(batch.workers)
        .force(batch.force)
        .subset(ids)
        .combine(!batch.no_combined)
        .temperature(common.temperature)
        .max_tokens(common.max_tokens)
        .max_retries(common.max_retries)
        .retry_base_delay_ms(common.retry_delay_ms)
        .api_timeout_secs(common.api_timeout)
        .cancel_flag(cancel_on_ctrl_c());

    if let Some(ref model) = common.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = common.provider {
        builder = builder.provider_name(provider.clone());
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new(stage);
        builder = builder.progress_callback(cb);
    }
    Ok(builder)
}

/// Ctrl-C stops dispatching new items; in-flight calls finish and are saved.
/// A second Ctrl-C exits immediately.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let setter = Arc::clone(&flag);
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, &setter).await {
            eprintln!("\n{} interrupted again: exiting now", red("✗"));
            std::process::exit(130);
        }
    });
    flag
}

/// Raise `flag` on the first signal; return `true` on the second.
///
/// Returns `false` if the signal listener fails.
async fn watch_interrupts<F, Fut>(mut next_signal: F, flag: &AtomicBool) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    flag.store(true, Ordering::SeqCst);
    eprintln!(
        "\n{} interrupted: finishing in-flight items, no new ones will start (Ctrl-C again to quit)",
        cyan("⚠")
    );
    next_signal().await.is_ok()
}

/// Print the run summary and apply `--strict`.
fn report(common: &CommonArgs, out: &StageOutput, show_progress: bool) -> Result<()> {
    let s = &out.summary;
    if !common.quiet && !show_progress {
        eprintln!(
            "{} items: {} completed, {} skipped, {} failed",
            s.total_items, s.completed, s.skipped, s.failed
        );
    }
    if !common.quiet {
        if let Some(ref path) = out.combined {
            eprintln!("   combined → {}", bold(&path.display().to_string()));
        }
        if s.interrupted {
            eprintln!(
                "{} stopped early: {}/{} items ran; re-run to continue",
                cyan("⚠"),
                s.processed(),
                s.total_items
            );
        }
        if s.failed > 0 {
            eprintln!(
                "   {}",
                dim(&format!(
                    "error details in {}",
                    s.output_directory.join("errors").display()
                ))
            );
        }
    }
    if common.strict {
        s.clone().into_result().context("Run finished with failures")?;
    }
    Ok(())
}

/// Widest range `--pages` will expand.
const MAX_RANGE_PAGES: usize = 10_000;

/// Expand `--pages` values into item ids.
///
/// Accepts bare page numbers (`5`), inclusive ranges (`3-9`) and literal ids
/// (`page_12`, `intro`).
fn parse_item_ids(values: &[String]) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for raw in values {
        let v = raw.trim();
        if v.is_empty() {
            continue;
        }
        if let Some((start, end)) = v.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>())
            {
                if start < 1 {
                    anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
                }
                if start > end {
                    anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
                }
                if end - start >= MAX_RANGE_PAGES {
                    anyhow::bail!(
                        "Page range '{}-{}' spans more than {} pages",
                        start,
                        end,
                        MAX_RANGE_PAGES
                    );
                }
                ids.extend((start..=end).map(|n| format!("page_{n}")));
                continue;
            }
        }
        match v.parse::<usize>() {
            Ok(0) => anyhow::bail!("Pages are 1-indexed, minimum is 1 (got 0)"),
            Ok(n) => ids.push(format!("page_{n}")),
            Err(_) => ids.push(v.to_string()),
        }
    }
    Ok(ids)
}
