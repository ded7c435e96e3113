//! PDF rasterisation: count pages and render the ones the OCR stage needs.
//!
//! pdfium is not async-safe, so every call runs inside
//! `tokio::task::spawn_blocking`. Pages are scaled to `dpi`, with the longest
//! edge capped at `max_rendered_pixels` so oversized scans stay within the
//! vision API's image limits.

use crate::config::BatchConfig;
use crate::error::FolioError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bind to a pdfium library.
///
/// Resolution order: `PDFIUM_LIB_PATH` (a library file or the directory
/// holding it), the current directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, FolioError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| FolioError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Open a document, mapping pdfium errors onto password/corruption errors.
fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, FolioError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                FolioError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                FolioError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            FolioError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Number of pages in the document.
pub async fn page_count(pdf_path: &Path, password: Option<&str>) -> Result<usize, FolioError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || -> Result<usize, FolioError> {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, pwd.as_deref())?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| FolioError::Internal(format!("Page count task panicked: {e}")))?
}

/// One requested page: its 0-based index and the image, or why it could not
/// be rendered.
pub type RenderedPage = (usize, Result<DynamicImage, FolioError>);

/// Rasterise the given 0-based pages.
///
/// A page that fails to render is returned as an `Err` entry so the caller
/// can record it; only binding pdfium or opening the document fails the call.
///
/// # Returns
/// One entry per requested page, in the order requested.
pub async fn render_pages(
    pdf_path: &Path,
    config: &BatchConfig,
    page_indices: &[usize],
) -> Result<Vec<RenderedPage>, FolioError> {
    if page_indices.is_empty() {
        return Ok(Vec::new());
    }
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref(), &indices)
    })
    .await
    .map_err(|e| FolioError::Internal(format!("Render task panicked: {e}")))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<RenderedPage>, FolioError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("Rendering {} of {} pages", page_indices.len(), total_pages);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let results = page_indices
        .iter()
        .map(|&idx| {
            let rendered = render_one(&pages, idx, total_pages, &render_config);
            if let Err(ref e) = rendered {
                warn!("{}", e);
            }
            (idx, rendered)
        })
        .collect();

    Ok(results)
}

fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    total_pages: usize,
    render_config: &PdfRenderConfig,
) -> Result<DynamicImage, FolioError> {
    let failed = |detail: String| FolioError::RasterisationFailed {
        page: idx + 1,
        detail,
    };
    if idx >= total_pages {
        return Err(failed(format!("out of range, total={total_pages}")));
    }

    let page = pages
        .get(idx as u16)
        .map_err(|e| failed(format!("{e:?}")))?;
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| failed(format!("{e:?}")))?;

    let image = bitmap.as_image();
    debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
    Ok(image)
}
