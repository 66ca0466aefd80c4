//! Flattening entry points.
//!
//! [`flatten`] drives one request through the four stages in order:
//!
//! 1. **resolve**   read page count and dates from the source with lopdf
//! 2. **rasterize** render every page through the injected [`PageRenderer`]
//! 3. **assemble**  embed the images as an image-only PDF at the output path
//! 4. **patch**     optionally rewrite `/CreationDate` and `/ModDate`
//!
//! Each stage starts only after the previous one succeeded. Any error ends
//! the run; which stage it belongs to is available from
//! [`FlattenError::stage`].

use crate::error::{FlattenError, Stage};
use crate::output::{FlattenStats, SourceInfo};
use crate::pipeline::assemble;
use crate::pipeline::input::{self, FlattenRequest};
use crate::pipeline::metadata::{self, PatchInstants};
use crate::pipeline::render::{check_page_sequence, PageImage, PageRenderer};
use crate::progress::ProgressCallback;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Flatten `request.input` into `request.output` using `renderer`.
///
/// # Errors
/// Fails without committing an output file if resolving, rasterising or
/// assembling fails. A failure in the patch stage leaves the assembled
/// (unpatched) output in place.
pub async fn flatten<R: PageRenderer>(
    request: &FlattenRequest,
    renderer: &R,
) -> Result<FlattenStats, FlattenError> {
    flatten_with_cancel(request, renderer, std::future::pending::<()>()).await
}

/// Like [`flatten`], but rasterisation is abandoned as soon as `cancel`
/// resolves.
///
/// The library never listens for signals itself. The `flatten-pdf` binary
/// passes a Ctrl-C future here.
///
/// # Errors
/// As [`flatten`], plus [`FlattenError::Interrupted`] when `cancel` wins
/// the race against the renderer. No output file is committed in that case.
pub async fn flatten_with_cancel<R, C>(
    request: &FlattenRequest,
    renderer: &R,
    cancel: C,
) -> Result<FlattenStats, FlattenError>
where
    R: PageRenderer,
    C: Future<Output = ()>,
{
    let total_start = Instant::now();
    let config = &request.config;
    let progress = config.progress_callback.clone();
    info!(
        "Flattening {} → {} at {} DPI ({})",
        request.input.display(),
        request.output.display(),
        config.dpi,
        renderer.name()
    );

    // ── Stage 1: Resolve source ──────────────────────────────────────────
    if let Some(ref cb) = progress {
        cb.on_stage_start(Stage::Resolve);
    }
    // lopdf is stricter than the renderers. A source it cannot parse is
    // still handed to the renderer, whose own page count is then trusted.
    let source = match read_source_info(request.input.clone()).await {
        Ok(info) => {
            info!("Source has {} pages (PDF {})", info.page_count, info.pdf_version);
            if info.is_encrypted {
                warn!("Source is encrypted; rendering may fail without a password");
            }
            Some(info)
        }
        Err(FlattenError::InvalidInputDocument { detail, .. }) => {
            warn!("Could not read source structure ({detail}); relying on the renderer");
            None
        }
        Err(e) => return Err(e),
    };

    // ── Stage 2: Rasterise ───────────────────────────────────────────────
    if let Some(ref cb) = progress {
        cb.on_stage_start(Stage::Rasterize);
    }
    let render_start = Instant::now();
    let pages = render_cancellable(renderer, &request.input, config.dpi, cancel).await?;
    let total_pages = source.as_ref().map_or(pages.len(), |s| s.page_count);
    check_page_sequence(&pages, total_pages)?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", pages.len(), render_duration_ms);

    if let Some(ref cb) = progress {
        for page in &pages {
            cb.on_page_rendered(page.page_num, total_pages, page.width(), page.height());
        }
    }

    // ── Stage 3: Assemble ────────────────────────────────────────────────
    if let Some(ref cb) = progress {
        cb.on_stage_start(Stage::Assemble);
    }
    let assemble_start = Instant::now();
    let mut output_bytes = assemble_to(
        pages,
        config.jpeg_quality,
        progress.clone(),
        request.output.clone(),
    )
    .await?;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;
    info!(
        "Wrote {} ({} bytes) in {}ms",
        request.output.display(),
        output_bytes,
        assemble_duration_ms
    );

    // ── Stage 4: Patch metadata ──────────────────────────────────────────
    let patch_start = Instant::now();
    let mut metadata_patched = false;
    if !config.dates.is_empty() {
        if let Some(ref cb) = progress {
            cb.on_stage_start(Stage::Patch);
        }

        let times = config.keep_source_time.then(|| {
            let info = source.clone().unwrap_or_default();
            metadata::source_times(&info, &request.input, config.date_zone)
        });
        let instants = metadata::resolve_instants(&config.dates, config.date_zone, times.as_ref());

        match patch(request.output.clone(), instants, config.set_file_times).await {
            Ok(bytes) => {
                metadata_patched = true;
                output_bytes = bytes;
            }
            Err(e) => {
                warn!(
                    "Metadata patch failed; unpatched output left at {}",
                    request.output.display()
                );
                return Err(e);
            }
        }
    } else {
        debug!("No dates supplied, skipping patch stage");
    }
    let patch_duration_ms = patch_start.elapsed().as_millis() as u64;

    let stats = FlattenStats {
        page_count: total_pages,
        dpi: config.dpi,
        output_path: request.output.clone(),
        output_bytes,
        metadata_patched,
        render_duration_ms,
        assemble_duration_ms,
        patch_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Flattening complete: {} pages, {}ms total",
        stats.page_count, stats.total_duration_ms
    );
    if let Some(ref cb) = progress {
        cb.on_complete(&stats);
    }
    Ok(stats)
}

/// Synchronous wrapper around [`flatten`].
///
/// Creates a temporary tokio runtime internally.
pub fn flatten_sync<R: PageRenderer>(
    request: &FlattenRequest,
    renderer: &R,
) -> Result<FlattenStats, FlattenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlattenError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(flatten(request, renderer))
}

/// Read page count, version and dates of a PDF without rendering it.
pub async fn inspect(path: impl AsRef<Path>) -> Result<SourceInfo, FlattenError> {
    let path = input::resolve_local(path.as_ref())?;
    read_source_info(path).await
}

async fn read_source_info(path: PathBuf) -> Result<SourceInfo, FlattenError> {
    tokio::task::spawn_blocking(move || metadata::read_source_info(&path))
        .await
        .map_err(|e| FlattenError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Render, abandoning the renderer if `cancel` resolves first.
///
/// Dropping the render future kills a running `pdftoppm` and removes its
/// temp directory.
async fn render_cancellable<R, C>(
    renderer: &R,
    pdf_path: &Path,
    dpi: u32,
    cancel: C,
) -> Result<Vec<PageImage>, FlattenError>
where
    R: PageRenderer,
    C: Future<Output = ()>,
{
    tokio::select! {
        res = renderer.render_pages(pdf_path, dpi) => res,
        () = cancel => {
            warn!("Interrupted while rendering; no output written");
            Err(FlattenError::Interrupted)
        }
    }
}

async fn assemble_to(
    pages: Vec<PageImage>,
    jpeg_quality: u8,
    progress: Option<ProgressCallback>,
    output: PathBuf,
) -> Result<u64, FlattenError> {
    tokio::task::spawn_blocking(move || {
        let mut doc = assemble::build_document(&pages, jpeg_quality, progress.as_ref())?;
        drop(pages);
        assemble::write_document(&mut doc, &output)
    })
    .await
    .map_err(|e| FlattenError::Internal(format!("Assemble task panicked: {}", e)))?
}

/// Patch the dates and optionally the file times; returns the new file size.
async fn patch(
    output: PathBuf,
    instants: PatchInstants,
    set_file_times: bool,
) -> Result<u64, FlattenError> {
    tokio::task::spawn_blocking(move || {
        metadata::patch_metadata(&output, &instants)?;
        if set_file_times {
            if let Some(instant) = instants.file_time() {
                metadata::set_file_times(&output, &instant)?;
            }
        }
        std::fs::metadata(&output)
            .map(|m| m.len())
            .map_err(|e| FlattenError::MetadataPatchFailed {
                path: output.clone(),
                detail: e.to_string(),
            })
    })
    .await
    .map_err(|e| FlattenError::Internal(format!("Patch task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlattenConfig;
    use image::{DynamicImage, Rgb, RgbImage};

    /// Always returns `count` small white pages.
    struct FixedRenderer {
        count: usize,
    }

    impl PageRenderer for FixedRenderer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn render_pages(
            &self,
            _pdf_path: &Path,
            dpi: u32,
        ) -> Result<Vec<PageImage>, FlattenError> {
            Ok((1..=self.count)
                .map(|page_num| PageImage {
                    page_num,
                    dpi,
                    image: DynamicImage::ImageRgb8(RgbImage::from_pixel(
                        8,
                        10,
                        Rgb([255, 255, 255]),
                    )),
                })
                .collect())
        }
    }

    /// Never finishes rendering.
    struct StuckRenderer;

    impl PageRenderer for StuckRenderer {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn render_pages(
            &self,
            _pdf_path: &Path,
            _dpi: u32,
        ) -> Result<Vec<PageImage>, FlattenError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn unparseable_source_falls_back_to_renderer_count() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("odd.pdf");
        std::fs::write(&input, b"%PDF-1.4\nnot something lopdf can read").unwrap();
        let output = dir.path().join("out.pdf");

        let request =
            input::resolve_request(&input, Some(output.clone()), FlattenConfig::default())
                .unwrap();
        let stats = flatten(&request, &FixedRenderer { count: 2 }).await.unwrap();

        assert_eq!(stats.page_count, 2);
        assert!(output.exists());
        assert!(!stats.metadata_patched);
    }

    #[tokio::test]
    async fn cancel_during_render_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4\nnot something lopdf can read").unwrap();
        let output = dir.path().join("out.pdf");

        let request =
            input::resolve_request(&input, Some(output.clone()), FlattenConfig::default())
                .unwrap();
        let err = flatten_with_cancel(&request, &StuckRenderer, std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(err, FlattenError::Interrupted), "got: {err:?}");
        assert_eq!(err.stage(), Stage::Rasterize);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn inspect_missing_file_is_resolve_error() {
        let err = inspect("/no/such/dir/file.pdf").await.unwrap_err();
        assert_eq!(err.stage(), Stage::Resolve);
    }
}
