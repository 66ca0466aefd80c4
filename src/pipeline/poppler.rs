//! Poppler backend: rasterise pages with the `pdftoppm` command.
//!
//! `pdftoppm -r <dpi> -png in.pdf <tmp>/page` writes `page-1.png`,
//! `page-2.png`, … into a private temp directory. The number is zero-padded
//! to the width of the last page number (`page-01.png` for a 10+ page file),
//! so files are ordered by the parsed number, never by name.
//!
//! The child is spawned with `kill_on_drop`, which is what makes cancellation safe:
//! dropping the render future kills pdftoppm and removes the temp directory.

use crate::error::FlattenError;
use crate::pipeline::render::{PageImage, PageRenderer};
use render_locate::{install_hint, Engine};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// File name prefix handed to pdftoppm inside the temp directory.
const PAGE_PREFIX: &str = "page";

/// pdftoppm exit status for "error opening a PDF file".
const EXIT_OPEN_PDF: i32 = 1;
/// pdftoppm exit status for "error related to PDF permissions".
const EXIT_PERMISSIONS: i32 = 3;

/// Renders with poppler's `pdftoppm`.
#[derive(Debug, Clone, Default)]
pub struct PopplerRenderer {
    /// Directory searched for `pdftoppm` before `POPPLER_PATH` and `PATH`.
    poppler_dir: Option<PathBuf>,
}

impl PopplerRenderer {
    pub fn new(poppler_dir: Option<PathBuf>) -> Self {
        Self { poppler_dir }
    }
}

impl PageRenderer for PopplerRenderer {
    fn name(&self) -> &'static str {
        "poppler"
    }

    async fn render_pages(
        &self,
        pdf_path: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, FlattenError> {
        let exe = render_locate::locate_pdftoppm(self.poppler_dir.as_deref())?;
        debug!("Using pdftoppm at {}", exe.display());

        let temp_dir = tempfile::Builder::new()
            .prefix("flatten-pdf-")
            .tempdir()
            .map_err(|e| FlattenError::Internal(format!("Failed to create temp dir: {e}")))?;

        let output = Command::new(&exe)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(temp_dir.path().join(PAGE_PREFIX))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FlattenError::DependencyMissing {
                        engine: Engine::Poppler.to_string(),
                        detail: format!("could not execute {}: {e}", exe.display()),
                        hint: install_hint(Engine::Poppler),
                    }
                } else {
                    FlattenError::RenderFailed {
                        page: None,
                        detail: format!("could not run pdftoppm: {e}"),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(pdf_path, output.status.code(), stderr));
        }

        let files = collect_page_files(temp_dir.path())?;
        info!("pdftoppm produced {} page images", files.len());

        tokio::task::spawn_blocking(move || decode_pages(temp_dir, files, dpi))
            .await
            .map_err(|e| FlattenError::Internal(format!("Decode task panicked: {e}")))?
    }
}

/// Map a non-zero pdftoppm exit onto the error taxonomy.
fn classify_failure(pdf_path: &Path, code: Option<i32>, stderr: String) -> FlattenError {
    match code {
        Some(EXIT_OPEN_PDF) | Some(EXIT_PERMISSIONS) => FlattenError::InvalidInputDocument {
            path: pdf_path.to_path_buf(),
            detail: if stderr.is_empty() {
                "pdftoppm could not open the document".to_string()
            } else {
                stderr
            },
        },
        Some(code) => FlattenError::RenderFailed {
            page: None,
            detail: format!("pdftoppm exited with status {code}: {stderr}"),
        },
        None => FlattenError::RenderFailed {
            page: None,
            detail: "pdftoppm was terminated by a signal".to_string(),
        },
    }
}

/// List `page-<n>.png` files sorted by page number.
///
/// Fails if numbering has gaps, which means pdftoppm skipped a page.
fn collect_page_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>, FlattenError> {
    let read_err = |e: std::io::Error| {
        FlattenError::Internal(format!("Failed to list {}: {e}", dir.display()))
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if let Some(num) = page_number_of(&path) {
            files.push((num, path));
        }
    }
    files.sort_by_key(|(num, _)| *num);

    for (idx, (num, _)) in files.iter().enumerate() {
        if *num != idx + 1 {
            return Err(FlattenError::RenderFailed {
                page: Some(idx + 1),
                detail: "pdftoppm produced no image for this page".to_string(),
            });
        }
    }
    Ok(files)
}

/// `…/page-007.png` → `Some(7)`.
fn page_number_of(path: &Path) -> Option<usize> {
    if path.extension()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(PAGE_PREFIX)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Decode every PNG. Holds `temp_dir` so it is removed only afterwards.
fn decode_pages(
    temp_dir: TempDir,
    files: Vec<(usize, PathBuf)>,
    dpi: u32,
) -> Result<Vec<PageImage>, FlattenError> {
    let mut pages = Vec::with_capacity(files.len());
    for (page_num, path) in files {
        let image = image::open(&path).map_err(|e| FlattenError::RenderFailed {
            page: Some(page_num),
            detail: format!("unreadable page image: {e}"),
        })?;
        debug!(
            "Decoded page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        pages.push(PageImage {
            page_num,
            dpi,
            image,
        });
    }
    drop(temp_dir);
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn page_numbers_are_parsed_from_padded_names() {
        assert_eq!(page_number_of(Path::new("/t/page-1.png")), Some(1));
        assert_eq!(page_number_of(Path::new("/t/page-007.png")), Some(7));
        assert_eq!(page_number_of(Path::new("/t/page-12.png")), Some(12));
        assert_eq!(page_number_of(Path::new("/t/page-1.ppm")), None);
        assert_eq!(page_number_of(Path::new("/t/page.png")), None);
        assert_eq!(page_number_of(Path::new("/t/other-1.png")), None);
        assert_eq!(page_number_of(Path::new("/t/page-1a.png")), None);
    }

    #[test]
    fn files_sorted_numerically_not_lexically() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["01", "02", "10", "03", "04", "05", "06", "07", "08", "09", "11"] {
            std::fs::write(dir.path().join(format!("page-{n}.png")), b"").unwrap();
        }
        std::fs::write(dir.path().join("stray.txt"), b"").unwrap();

        let files = collect_page_files(dir.path()).unwrap();
        let nums: Vec<usize> = files.iter().map(|(n, _)| *n).collect();
        assert_eq!(nums, (1..=11).collect::<Vec<_>>());
    }

    #[test]
    fn gap_in_numbering_is_render_failure() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1, 2, 4] {
            std::fs::write(dir.path().join(format!("page-{n}.png")), b"").unwrap();
        }
        let err = collect_page_files(dir.path()).unwrap_err();
        assert!(
            matches!(err, FlattenError::RenderFailed { page: Some(3), .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn exit_one_is_invalid_input() {
        let err = classify_failure(
            Path::new("broken.pdf"),
            Some(1),
            "Syntax Error: Couldn't find trailer dictionary".into(),
        );
        match err {
            FlattenError::InvalidInputDocument { detail, .. } => {
                assert!(detail.contains("trailer"), "got: {detail}")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn other_exit_codes_are_render_failures() {
        assert!(matches!(
            classify_failure(Path::new("a.pdf"), Some(99), String::new()),
            FlattenError::RenderFailed { page: None, .. }
        ));
        assert!(matches!(
            classify_failure(Path::new("a.pdf"), None, String::new()),
            FlattenError::RenderFailed { page: None, .. }
        ));
    }

    #[test]
    fn decode_pages_reads_pngs_in_given_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for (n, w) in [(1usize, 10u32), (2, 20)] {
            let p = dir.path().join(format!("page-{n}.png"));
            RgbImage::from_pixel(w, 5, Rgb([0, 0, 0])).save(&p).unwrap();
            files.push((n, p));
        }
        let temp = tempfile::tempdir().unwrap();
        let pages = decode_pages(temp, files, 150).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].width(), 10);
        assert_eq!(pages[1].width(), 20);
        assert!(pages.iter().all(|p| p.dpi == 150));
    }

    #[test]
    fn corrupt_png_names_the_page() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("page-1.png");
        std::fs::write(&p, b"not a png").unwrap();
        let temp = tempfile::tempdir().unwrap();
        let err = decode_pages(temp, vec![(1, p)], 200).unwrap_err();
        assert!(matches!(err, FlattenError::RenderFailed { page: Some(1), .. }));
    }
}
