//! PDF rasterisation: the rendering capability and its backends.
//!
//! The pipeline never talks to poppler or pdfium directly. It calls
//! [`PageRenderer::render_pages`], so tests substitute a stub and the CLI
//! picks a backend at runtime through [`Renderer`].
//!
//! Whatever the backend, the contract is the same: one [`PageImage`] per
//! source page, numbered 1..=N, in document order. [`check_page_sequence`]
//! enforces that before anything reaches the assembler.

use crate::error::FlattenError;
use crate::pipeline::pdfium::PdfiumRenderer;
use crate::pipeline::poppler::PopplerRenderer;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

/// One rasterised source page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    /// Resolution the page was rendered at.
    pub dpi: u32,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Something that turns a PDF into page images.
///
/// Implementations must return pages in document order and must fail as a
/// whole rather than return a partial sequence.
pub trait PageRenderer {
    /// Short backend name for logs, e.g. `"poppler"`.
    fn name(&self) -> &'static str;

    /// Render every page of `pdf_path` at `dpi`.
    fn render_pages(
        &self,
        pdf_path: &Path,
        dpi: u32,
    ) -> impl Future<Output = Result<Vec<PageImage>, FlattenError>> + Send;
}

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RendererKind {
    /// `pdftoppm` child process. (default)
    #[default]
    Poppler,
    /// In-process libpdfium.
    Pdfium,
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererKind::Poppler => f.write_str("poppler"),
            RendererKind::Pdfium => f.write_str("pdfium"),
        }
    }
}

/// Runtime-selected rendering backend.
#[derive(Debug, Clone)]
pub enum Renderer {
    Poppler(PopplerRenderer),
    Pdfium(PdfiumRenderer),
}

impl Renderer {
    /// Build the backend for `kind`. `poppler_dir` only affects poppler.
    pub fn new(kind: RendererKind, poppler_dir: Option<PathBuf>) -> Self {
        match kind {
            RendererKind::Poppler => Renderer::Poppler(PopplerRenderer::new(poppler_dir)),
            RendererKind::Pdfium => Renderer::Pdfium(PdfiumRenderer),
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer::new(RendererKind::default(), None)
    }
}

impl PageRenderer for Renderer {
    fn name(&self) -> &'static str {
        match self {
            Renderer::Poppler(r) => r.name(),
            Renderer::Pdfium(r) => r.name(),
        }
    }

    async fn render_pages(
        &self,
        pdf_path: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, FlattenError> {
        match self {
            Renderer::Poppler(r) => r.render_pages(pdf_path, dpi).await,
            Renderer::Pdfium(r) => r.render_pages(pdf_path, dpi).await,
        }
    }
}

/// Verify the renderer returned exactly pages 1..=`expected`, in order.
pub fn check_page_sequence(pages: &[PageImage], expected: usize) -> Result<(), FlattenError> {
    if pages.len() != expected {
        return Err(FlattenError::PageCountMismatch {
            expected,
            actual: pages.len(),
        });
    }
    for (idx, page) in pages.iter().enumerate() {
        if page.page_num != idx + 1 {
            return Err(FlattenError::RenderFailed {
                page: Some(idx + 1),
                detail: format!(
                    "renderer returned page {} at position {}",
                    page.page_num,
                    idx + 1
                ),
            });
        }
    }
    Ok(())
}
