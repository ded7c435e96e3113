//! Stage entry points: OCR of a PDF and translation of the OCR results.
//!
//! Both stages are the same shape: build work items, run the batch, combine
//! the completed outputs. They differ in where items come from and which
//! prompts the transformer sends.
//!
//! ```text
//! run_ocr:          PDF/URL ──▶ render + encode ──▶ run_batch ──▶ ocr_results.txt
//! run_translation:  ocr_results.txt ──▶ parse ────▶ run_batch ──▶ combined_translation.txt
//! ```

use crate::batch::run_batch;
use crate::combine::combine;
use crate::config::{BatchConfig, Stage};
use crate::error::FolioError;
use crate::output::StageOutput;
use crate::pipeline::client::{LlmTransformer, Transformer};
use crate::pipeline::source::{load_work_items, WorkItem};
use crate::pipeline::{encode, input, persist, render};
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// OCR every selected page of a PDF file or URL.
///
/// Pages whose output already exists are not rendered (unless `force`); they
/// still appear in the run as skipped items.
pub async fn run_ocr(input_str: &str, config: &BatchConfig) -> Result<StageOutput, FolioError> {
    let config = with_stage(config, Stage::Ocr);
    let provider = resolve_provider(&config)?;
    let transformer: Arc<dyn Transformer> = Arc::new(LlmTransformer::new(provider, &config));
    run_ocr_with(input_str, transformer, &config).await
}

/// [`run_ocr`] with a caller-supplied transformer.
pub async fn run_ocr_with(
    input_str: &str,
    transformer: Arc<dyn Transformer>,
    config: &BatchConfig,
) -> Result<StageOutput, FolioError> {
    let config = with_stage(config, Stage::Ocr);
    info!("Starting OCR: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    let total_pages = render::page_count(&pdf_path, config.password.as_deref()).await?;
    info!("PDF has {} pages", total_pages);

    let selected = select_pages(total_pages, &config)?;
    let items = page_items(&pdf_path, &selected, &config).await?;

    let summary = run_batch(items, transformer, &config, input_str).await?;
    let combined = combine_if_enabled(&config).await?;
    Ok(StageOutput { summary, combined })
}

/// Translate the blocks of an OCR results file.
pub async fn run_translation(
    ocr_file: &Path,
    config: &BatchConfig,
) -> Result<StageOutput, FolioError> {
    let config = with_stage(config, Stage::Translation);
    let provider = resolve_provider(&config)?;
    let transformer: Arc<dyn Transformer> = Arc::new(LlmTransformer::new(provider, &config));
    run_translation_with(ocr_file, transformer, &config).await
}

/// [`run_translation`] with a caller-supplied transformer.
pub async fn run_translation_with(
    ocr_file: &Path,
    transformer: Arc<dyn Transformer>,
    config: &BatchConfig,
) -> Result<StageOutput, FolioError> {
    let config = with_stage(config, Stage::Translation);
    info!("Starting translation: {}", ocr_file.display());

    let items = load_work_items(ocr_file).await;
    if items.is_empty() {
        return Err(FolioError::NoWorkItems {
            path: ocr_file.to_path_buf(),
        });
    }

    let label = ocr_file.display().to_string();
    let summary = run_batch(items, transformer, &config, &label).await?;
    let combined = combine_if_enabled(&config).await?;
    Ok(StageOutput { summary, combined })
}

fn with_stage(config: &BatchConfig, stage: Stage) -> BatchConfig {
    BatchConfig {
        stage,
        ..config.clone()
    }
}

async fn combine_if_enabled(config: &BatchConfig) -> Result<Option<PathBuf>, FolioError> {
    if config.combine {
        combine(&config.output_dir, config.stage.combined_file_name()).await
    } else {
        Ok(None)
    }
}

/// Id of the work item for a 1-based page number.
pub fn page_id(page_num: usize) -> String {
    format!("page_{page_num}")
}

fn parse_page_id(id: &str) -> Option<usize> {
    id.strip_prefix("page_")?.parse().ok().filter(|&n| n >= 1)
}

/// 0-based indices of the pages to OCR, honouring the subset filter.
fn select_pages(total_pages: usize, config: &BatchConfig) -> Result<Vec<usize>, FolioError> {
    let Some(ref subset) = config.subset else {
        return Ok((0..total_pages).collect());
    };

    let mut indices: Vec<usize> = subset
        .iter()
        .filter_map(|id| parse_page_id(id))
        .filter(|&n| n <= total_pages)
        .map(|n| n - 1)
        .collect();
    indices.sort_unstable();

    if indices.is_empty() {
        return Err(FolioError::NoMatchingItems {
            requested: subset.iter().cloned().collect(),
        });
    }
    Ok(indices)
}

/// Build page work items, rendering only the pages that still need OCR.
async fn page_items(
    pdf_path: &Path,
    selected: &[usize],
    config: &BatchConfig,
) -> Result<Vec<WorkItem>, FolioError> {
    let mut pending = Vec::new();
    let mut done = Vec::new();
    for &idx in selected {
        let id = page_id(idx + 1);
        let exists = tokio::fs::try_exists(persist::output_path(&config.output_dir, &id))
            .await
            .unwrap_or(false);
        if exists && !config.force {
            done.push(idx);
        } else {
            pending.push(idx);
        }
    }
    info!(
        "{} pages to OCR, {} already done",
        pending.len(),
        done.len()
    );

    let rendered = render::render_pages(pdf_path, config, &pending).await?;
    Ok(build_page_items(done, rendered, encode::encode_page))
}

/// Merge already-done pages with freshly rendered ones, in page order.
///
/// A page that failed to render or encode becomes an unprepared item, so it
/// is counted and recorded as failed by the batch.
fn build_page_items<E>(
    done: Vec<usize>,
    rendered: Vec<render::RenderedPage>,
    mut encode: impl FnMut(&DynamicImage) -> Result<ImageData, E>,
) -> Vec<WorkItem>
where
    E: std::fmt::Display,
{
    let mut by_index: BTreeMap<usize, WorkItem> = done
        .into_iter()
        .map(|idx| (idx, WorkItem::text(page_id(idx + 1), "")))
        .collect();

    for (idx, page) in rendered {
        let id = page_id(idx + 1);
        let item = match page {
            Ok(img) => match encode(&img) {
                Ok(data) => WorkItem::page_image(id, data),
                Err(e) => {
                    warn!("Failed to encode page {}: {}", idx + 1, e);
                    let reason = format!("page {} could not be encoded: {e}", idx + 1);
                    WorkItem::unprepared(id, reason)
                }
            },
            Err(e) => WorkItem::unprepared(id, e.to_string()),
        };
        by_index.insert(idx, item);
    }

    debug!("Built {} page items", by_index.len());
    by_index.into_values().collect()
}

/// Resolve the LLM provider from config, then the environment.
///
/// Order: explicit provider, named provider, `EDGEQUAKE_LLM_PROVIDER` +
/// `EDGEQUAKE_MODEL`, `ANTHROPIC_API_KEY`, then whatever
/// `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &BatchConfig) -> Result<Arc<dyn LLMProvider>, FolioError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_id());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, config.model.as_deref().unwrap_or(&model));
        }
    }

    if std::env::var("ANTHROPIC_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("anthropic", config.model_id());
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| FolioError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!("No LLM provider auto-detected: {e}\nSet ANTHROPIC_API_KEY or pass --provider."),
        })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, FolioError> {
    debug!("Creating provider {} with model {}", name, model);
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        FolioError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use async_trait::async_trait;

    struct Reverse;

    #[async_trait]
    impl Transformer for Reverse {
        async fn transform(&self, item: &WorkItem) -> Result<String, TransformError> {
            Ok(item.text.chars().rev().collect())
        }
    }

    #[test]
    fn page_ids_round_trip() {
        assert_eq!(page_id(12), "page_12");
        assert_eq!(parse_page_id("page_12"), Some(12));
        assert_eq!(parse_page_id("page_0"), None);
        assert_eq!(parse_page_id("chapter_1"), None);
    }

    #[test]
    fn page_selection_honours_subset_and_range() {
        let all = BatchConfig::default();
        assert_eq!(select_pages(3, &all).unwrap(), vec![0, 1, 2]);

        let some = BatchConfig::builder()
            .subset(["page_3", "page_1", "page_99"])
            .build()
            .unwrap();
        assert_eq!(select_pages(3, &some).unwrap(), vec![0, 2]);

        let none = BatchConfig::builder().subset(["page_7"]).build().unwrap();
        assert!(matches!(
            select_pages(3, &none),
            Err(FolioError::NoMatchingItems { .. })
        ));
    }

    #[tokio::test]
    async fn pages_that_fail_to_render_or_encode_are_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let img = || DynamicImage::new_rgba8(4, 4);
        let rendered = vec![
            (1, Ok(img())),
            (
                2,
                Err(FolioError::RasterisationFailed {
                    page: 3,
                    detail: "bad xref".into(),
                }),
            ),
            (3, Ok(img())),
        ];
        let mut calls = 0;
        let encode = |_: &DynamicImage| {
            calls += 1;
            if calls == 3 {
                Err("png writer refused")
            } else {
                Ok(ImageData::new("aGk=", "image/png"))
            }
        };
        let items = build_page_items(vec![0], rendered, encode);

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["page_1", "page_2", "page_3", "page_4"]);
        assert!(items[1].image.is_some());
        assert!(items[2].unprepared.as_deref().unwrap().contains("bad xref"));
        assert!(items[3].unprepared.as_deref().unwrap().contains("png writer refused"));

        std::fs::write(dir.path().join("page_1.txt"), "done before").unwrap();
        let config = BatchConfig::builder()
            .stage(Stage::Ocr)
            .output_dir(dir.path())
            .build()
            .unwrap();
        let summary = run_batch(items, Arc::new(Reverse), &config, "book.pdf")
            .await
            .unwrap();

        assert_eq!((summary.completed, summary.skipped, summary.failed), (1, 1, 2));
        assert_eq!(summary.results.len(), 4);
        assert!(dir.path().join("errors/page_3.error.json").exists());
        assert!(dir.path().join("errors/page_4.error.json").exists());
        assert!(!dir.path().join("page_3.txt").exists());
    }

    #[tokio::test]
    async fn translation_without_blocks_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ocr_results.txt");
        std::fs::write(&input, "no markers here").unwrap();
        let config = BatchConfig::builder()
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();

        let err = run_translation_with(&input, Arc::new(Reverse), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::NoWorkItems { .. }));
    }

    #[tokio::test]
    async fn translation_combines_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ocr_results.txt");
        std::fs::write(&input, "===== page_1 =====\nabc\n").unwrap();
        let out = dir.path().join("out");

        let config = BatchConfig::builder()
            .output_dir(&out)
            .combine(false)
            .build()
            .unwrap();
        let result = run_translation_with(&input, Arc::new(Reverse), &config)
            .await
            .unwrap();
        assert!(result.combined.is_none());

        let config = BatchConfig::builder().output_dir(&out).build().unwrap();
        let result = run_translation_with(&input, Arc::new(Reverse), &config)
            .await
            .unwrap();
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(
            result.combined,
            Some(out.join("combined_translation.txt"))
        );
    }
}
