//! Input resolution: validate the source file and settle the output path.
//!
//! We validate the PDF magic bytes (`%PDF`) before any renderer is started so
//! callers get a meaningful error rather than a poppler or pdfium failure.
//! Nothing here writes to disk.

use crate::config::FlattenConfig;
use crate::error::FlattenError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of the output file name when `--output` is omitted.
pub const DEFAULT_OUTPUT_PREFIX: &str = "flat-";

/// A validated flattening job. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct FlattenRequest {
    /// Existing, readable source PDF.
    pub input: PathBuf,
    /// Destination of the flattened PDF. Never the same file as `input`.
    pub output: PathBuf,
    pub config: FlattenConfig,
}

/// `flat-{basename(input)}`, relative to the current directory.
pub fn default_output_path(input: &Path) -> Result<PathBuf, FlattenError> {
    let name = input.file_name().ok_or_else(|| {
        FlattenError::InvalidArgument(format!(
            "cannot derive an output name from '{}'; pass --output",
            input.display()
        ))
    })?;

    let mut out = std::ffi::OsString::from(DEFAULT_OUTPUT_PREFIX);
    out.push(name);
    Ok(PathBuf::from(out))
}

/// Resolve the user-supplied paths into a [`FlattenRequest`].
///
/// `config` is expected to come from [`crate::FlattenConfigBuilder::build`],
/// which has already validated DPI and dates.
pub fn resolve_request(
    input: impl AsRef<Path>,
    output: Option<PathBuf>,
    config: FlattenConfig,
) -> Result<FlattenRequest, FlattenError> {
    let input = resolve_local(input.as_ref())?;
    let output = match output {
        Some(p) => p,
        None => default_output_path(&input)?,
    };
    ensure_distinct(&input, &output)?;

    debug!(
        "Resolved request: {} → {} at {} DPI",
        input.display(),
        output.display(),
        config.dpi
    );

    Ok(FlattenRequest {
        input,
        output,
        config,
    })
}

/// Validate existence, readability and PDF magic bytes of a local file.
pub(crate) fn resolve_local(path: &Path) -> Result<PathBuf, FlattenError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(FlattenError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(FlattenError::InvalidArgument(format!(
            "'{}' is a directory, not a PDF file",
            path.display()
        )));
    }

    match std::fs::File::open(&path) {
        Ok(f) => {
            let mut magic = Vec::with_capacity(4);
            f.take(4)
                .read_to_end(&mut magic)
                .map_err(|e| read_error(&path, e))?;
            if magic != b"%PDF" {
                return Err(FlattenError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FlattenError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(FlattenError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Classify an I/O error hit while sniffing the magic bytes.
fn read_error(path: &Path, e: std::io::Error) -> FlattenError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => FlattenError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => FlattenError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => FlattenError::InvalidArgument(format!("cannot read '{}': {e}", path.display())),
    }
}

/// Refuse to overwrite the source with its own flattened copy.
fn ensure_distinct(input: &Path, output: &Path) -> Result<(), FlattenError> {
    // A missing output cannot alias the (existing) input.
    let Ok(out) = output.canonicalize() else {
        return Ok(());
    };
    let inp = input
        .canonicalize()
        .map_err(|_| FlattenError::FileNotFound {
            path: input.to_path_buf(),
        })?;

    if inp == out {
        return Err(FlattenError::InvalidArgument(format!(
            "output '{}' is the input file; choose a different --output",
            output.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[test]
    fn default_output_uses_basename() {
        let out = default_output_path(Path::new("/some/where/report.pdf")).unwrap();
        assert_eq!(out, PathBuf::from("flat-report.pdf"));

        let out = default_output_path(Path::new("scan.PDF")).unwrap();
        assert_eq!(out, PathBuf::from("flat-scan.PDF"));
    }

    #[test]
    fn default_output_without_file_name_is_invalid() {
        let err = default_output_path(Path::new("/")).unwrap_err();
        assert!(matches!(err, FlattenError::InvalidArgument(_)));
    }

    #[test]
    fn missing_input_is_file_not_found() {
        let err = resolve_request(
            "/definitely/not/here.pdf",
            None,
            FlattenConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FlattenError::FileNotFound { .. }), "got: {err:?}");
    }

    #[test]
    fn non_pdf_is_rejected_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "notes.pdf", b"hello world");
        let err = resolve_local(&p).unwrap_err();
        match err {
            FlattenError::NotAPdf { magic, .. } => assert_eq!(magic, b"hell"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tiny_file_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "tiny.pdf", b"%P");
        assert!(matches!(
            resolve_local(&p),
            Err(FlattenError::NotAPdf { .. })
        ));
    }

    #[test]
    fn read_errors_keep_their_kind() {
        use std::io::{Error, ErrorKind};
        let p = Path::new("/tmp/in.pdf");

        let err = read_error(p, Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, FlattenError::PermissionDenied { .. }));

        let err = read_error(p, Error::from(ErrorKind::NotFound));
        assert!(matches!(err, FlattenError::FileNotFound { .. }));

        let err = read_error(p, Error::other("device went away"));
        match err {
            FlattenError::InvalidArgument(msg) => assert!(msg.contains("device went away")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn directory_input_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_local(dir.path()),
            Err(FlattenError::InvalidArgument(_))
        ));
    }

    #[test]
    fn explicit_output_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "in.pdf", b"%PDF-1.7\n");
        let out = dir.path().join("out.pdf");
        let req = resolve_request(&p, Some(out.clone()), FlattenConfig::default()).unwrap();
        assert_eq!(req.output, out);
        assert_eq!(req.input, p);
    }

    #[test]
    fn output_equal_to_input_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "in.pdf", b"%PDF-1.7\n");
        let alias = dir.path().join(".").join("in.pdf");
        let err = resolve_request(&p, Some(alias), FlattenConfig::default()).unwrap_err();
        assert!(matches!(err, FlattenError::InvalidArgument(_)), "got: {err:?}");
    }
}
