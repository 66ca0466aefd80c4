//! # pdf-flattener
//!
//! Flatten PDF documents into image-only PDFs.
//!
//! Every page is rasterised at a chosen resolution and the rasters are
//! reassembled into a new PDF at the original physical page size. The result
//! looks the same but carries no text layer, annotations, form fields or
//! other structure. Optionally the output's `/CreationDate` and `/ModDate`
//! are set to caller-chosen dates.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Resolve    validate the input, count pages (lopdf)
//!  ├─ 2. Rasterize  pdftoppm child process, or pdfium in spawn_blocking
//!  ├─ 3. Assemble   JPEG XObject per page, atomic write (lopdf)
//!  └─ 4. Patch      optional /Info dates and file times
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_flattener::{flatten, resolve_request, FlattenConfig, Renderer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlattenConfig::builder()
//!         .dpi(300)
//!         .creation_date("2020-01-15")
//!         .build()?;
//!     let request = resolve_request("contract.pdf", None, config)?;
//!     let stats = flatten(&request, &Renderer::default()).await?;
//!     eprintln!("{} pages → {}", stats.page_count, stats.output_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Rendering backends
//!
//! | Backend | Needs | Notes |
//! |---------|-------|-------|
//! | `poppler` (default) | `pdftoppm` on `PATH` or `POPPLER_PATH` | child, killed on drop |
//! | `pdfium` | `libpdfium` shared library | in-process via `pdfium-render` |
//!
//! Any type implementing [`PageRenderer`] can stand in for these, which is
//! how the tests run without either dependency installed.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `flatten-pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod flatten;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DateZone, FlattenConfig, FlattenConfigBuilder, MetadataDates};
pub use error::{DateField, FlattenError, Stage};
pub use flatten::{flatten, flatten_sync, flatten_with_cancel, inspect};
pub use output::{FlattenStats, SourceInfo};
pub use pipeline::input::{default_output_path, resolve_request, FlattenRequest};
pub use pipeline::render::{PageImage, PageRenderer, Renderer, RendererKind};
pub use progress::{FlattenProgressCallback, NoopProgressCallback, ProgressCallback};
