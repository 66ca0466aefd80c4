//! Pdfium backend: rasterise pages in-process via `pdfium-render`.
//!
//! pdfium keeps thread-local state and its calls block, so the whole render
//! runs inside `tokio::task::spawn_blocking`. The library itself is bound at
//! call time through `render_locate::bind_pdfium`, which means a missing
//! `libpdfium` surfaces as [`FlattenError::DependencyMissing`] for this run
//! only.

use crate::error::FlattenError;
use crate::pipeline::render::{PageImage, PageRenderer};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders with libpdfium.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

impl PageRenderer for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn render_pages(
        &self,
        pdf_path: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, FlattenError> {
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || render_pages_blocking(&path, dpi))
            .await
            .map_err(|e| FlattenError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn render_pages_blocking(pdf_path: &Path, dpi: u32) -> Result<Vec<PageImage>, FlattenError> {
    let pdfium = render_locate::bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| FlattenError::InvalidInputDocument {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / POINTS_PER_INCH);

    let mut results = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| FlattenError::RenderFailed {
                page: Some(idx + 1),
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(PageImage {
            page_num: idx + 1,
            dpi,
            image,
        });
    }

    Ok(results)
}
