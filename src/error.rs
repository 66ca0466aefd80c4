//! Error types for the pdf-flattener library.
//!
//! Every failure is fatal: the pipeline stops at the first error and nothing
//! is retried. [`FlattenError::stage`] tells the caller which of the four
//! pipeline stages produced the error, so the CLI can report
//! "rasterize stage failed: …" without matching on every variant.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Argument and input validation.
    Resolve,
    /// Rendering each source page to a raster image.
    Rasterize,
    /// Building and writing the output PDF.
    Assemble,
    /// Rewriting `/CreationDate` and `/ModDate` on the output.
    Patch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Rasterize => "rasterize",
            Stage::Assemble => "assemble",
            Stage::Patch => "patch",
        };
        f.write_str(name)
    }
}

/// Which metadata date a [`FlattenError::InvalidDateFormat`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Creation,
    Modification,
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateField::Creation => f.write_str("creation"),
            DateField::Modification => f.write_str("modification"),
        }
    }
}

/// All errors returned by the pdf-flattener library.
#[derive(Debug, Error)]
pub enum FlattenError {
    // ── Resolve ───────────────────────────────────────────────────────────
    /// A CLI/config value is out of range or contradicts another.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A date option is not a real `YYYY-MM-DD` calendar date.
    #[error("Invalid {field} date '{value}': expected YYYY-MM-DD (e.g. 2020-01-31)")]
    InvalidDateFormat { field: DateField, value: String },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    // ── Rasterize ─────────────────────────────────────────────────────────
    /// The rendering engine (pdftoppm / libpdfium) is not available.
    #[error("Rendering engine {engine} is not available: {detail}\n\n{hint}")]
    DependencyMissing {
        engine: String,
        detail: String,
        hint: String,
    },

    /// The source is not a PDF, or the renderer could not parse it.
    #[error("Input '{path}' is not a readable PDF: {detail}")]
    InvalidInputDocument { path: PathBuf, detail: String },

    /// The renderer ran but failed for a reason other than bad input.
    #[error("Rendering failed{}: {detail}", page_suffix(.page))]
    RenderFailed { page: Option<usize>, detail: String },

    /// The renderer produced a different number of pages than the source has.
    #[error("Renderer returned {actual} page images for a {expected}-page document")]
    PageCountMismatch { expected: usize, actual: usize },

    /// Rasterisation was cancelled (Ctrl-C in the CLI) before it finished.
    #[error("Interrupted; no output was written")]
    Interrupted,

    // ── Assemble ──────────────────────────────────────────────────────────
    /// A rendered page could not be encoded into the output document.
    #[error("Failed to encode page {page}: {detail}")]
    PageEncoding { page: usize, detail: String },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Patch ─────────────────────────────────────────────────────────────
    /// The assembled output could not be reopened or rewritten.
    #[error(
        "Failed to set metadata dates on '{path}': {detail}\n\
The flattened file was written but still carries its original dates."
    )]
    MetadataPatchFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn page_suffix(page: &Option<usize>) -> String {
    page.map(|p| format!(" on page {p}")).unwrap_or_default()
}

impl FlattenError {
    /// The pipeline stage this error originates from.
    pub fn stage(&self) -> Stage {
        match self {
            FlattenError::InvalidArgument(_)
            | FlattenError::InvalidDateFormat { .. }
            | FlattenError::FileNotFound { .. }
            | FlattenError::PermissionDenied { .. }
            | FlattenError::NotAPdf { .. } => Stage::Resolve,
            FlattenError::DependencyMissing { .. }
            | FlattenError::InvalidInputDocument { .. }
            | FlattenError::RenderFailed { .. }
            | FlattenError::PageCountMismatch { .. }
            | FlattenError::Interrupted
            | FlattenError::Internal(_) => Stage::Rasterize,
            FlattenError::PageEncoding { .. } | FlattenError::OutputWriteFailed { .. } => {
                Stage::Assemble
            }
            FlattenError::MetadataPatchFailed { .. } => Stage::Patch,
        }
    }
}

impl From<render_locate::LocateError> for FlattenError {
    fn from(e: render_locate::LocateError) -> Self {
        let engine = match &e {
            render_locate::LocateError::NotFound { engine, .. } => engine.to_string(),
            _ => render_locate::Engine::Pdfium.to_string(),
        };
        let hint = e.hint();
        let detail = match &e {
            render_locate::LocateError::NotFound { searched, .. } => {
                format!("searched {} locations", searched.len())
            }
            other => other.to_string(),
        };
        FlattenError::DependencyMissing {
            engine,
            detail,
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_error_names_the_field() {
        let e = FlattenError::InvalidDateFormat {
            field: DateField::Modification,
            value: "01-01-2020".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("modification"), "got: {msg}");
        assert!(msg.contains("01-01-2020"), "got: {msg}");
        assert_eq!(e.stage(), Stage::Resolve);
    }

    #[test]
    fn render_failed_display_with_and_without_page() {
        let with = FlattenError::RenderFailed {
            page: Some(3),
            detail: "bad bitmap".into(),
        };
        assert!(with.to_string().contains("on page 3"), "got: {with}");

        let without = FlattenError::RenderFailed {
            page: None,
            detail: "exit status 99".into(),
        };
        assert!(!without.to_string().contains("page"), "got: {without}");
    }

    #[test]
    fn page_encoding_identifies_page() {
        let e = FlattenError::PageEncoding {
            page: 7,
            detail: "zero-sized image".into(),
        };
        assert!(e.to_string().contains("page 7"));
        assert_eq!(e.stage(), Stage::Assemble);
    }

    #[test]
    fn patch_failure_mentions_left_behind_file() {
        let e = FlattenError::MetadataPatchFailed {
            path: PathBuf::from("flat-a.pdf"),
            detail: "disk full".into(),
        };
        assert!(e.to_string().contains("flat-a.pdf"));
        assert_eq!(e.stage(), Stage::Patch);
    }

    #[test]
    fn locate_error_becomes_dependency_missing_with_hint() {
        let e: FlattenError = render_locate::LocateError::NotFound {
            engine: render_locate::Engine::Poppler,
            searched: vec![PathBuf::from("/usr/bin/pdftoppm")],
            hint: "sudo apt-get install poppler-utils".into(),
        }
        .into();
        assert_eq!(e.stage(), Stage::Rasterize);
        let msg = e.to_string();
        assert!(msg.contains("poppler"), "got: {msg}");
        assert!(msg.contains("apt-get install poppler-utils"), "got: {msg}");
    }

    #[test]
    fn stages_display_lowercase_and_ordered() {
        assert_eq!(Stage::Rasterize.to_string(), "rasterize");
        assert!(Stage::Resolve < Stage::Patch);
    }
}
