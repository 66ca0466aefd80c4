//! # render-locate
//!
//! Find the PDF rendering engines used by `pdf-flattener` and, when one is
//! missing, explain how to install it.
//!
//! Two engines are supported:
//!
//! | Engine  | Artifact                                   | Override env var  |
//! |---------|--------------------------------------------|-------------------|
//! | Poppler | `pdftoppm` executable                      | `POPPLER_PATH`    |
//! | Pdfium  | `libpdfium.so` / `.dylib` / `pdfium.dll`   | `PDFIUM_LIB_PATH` |
//!
//! ## Lookup order
//!
//! `pdftoppm`:
//! 1. an explicit directory passed by the caller,
//! 2. the directory named by `POPPLER_PATH`,
//! 3. every entry of `PATH`,
//! 4. (Windows only) the usual poppler install directories.
//!
//! libpdfium:
//! 1. the file named by `PDFIUM_LIB_PATH`,
//! 2. the per-user cache directory (see [`pdfium_cache_dir`]),
//! 3. the current working directory,
//! 4. the system library search path (inside [`bind_pdfium`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use render_locate::{locate_pdftoppm, bind_pdfium};
//!
//! let pdftoppm = locate_pdftoppm(None).expect("poppler missing");
//! println!("using {}", pdftoppm.display());
//!
//! let pdfium = bind_pdfium().expect("pdfium missing");
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming a directory that contains `pdftoppm`.
pub const POPPLER_PATH_ENV: &str = "POPPLER_PATH";

/// Environment variable naming an existing pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Environment variable overriding [`pdfium_cache_dir`].
pub const PDFIUM_CACHE_DIR_ENV: &str = "PDFIUM_CACHE_DIR";

/// Poppler install directories checked on Windows after `PATH`.
const WINDOWS_POPPLER_DIRS: &[&str] = &[
    r"C:\poppler\Library\bin",
    r"C:\Program Files\poppler-0.68.0\bin",
    r"C:\Program Files\poppler-23.11.0\bin",
    r"C:\Program Files\poppler\bin",
    r"C:\poppler-0.68.0\bin",
    r"C:\poppler\bin",
];

// ── Engine ───────────────────────────────────────────────────────────────────

/// A rendering engine that can be located on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Poppler's `pdftoppm` command-line tool.
    Poppler,
    /// The pdfium shared library, loaded via `pdfium-render`.
    Pdfium,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Poppler => f.write_str("poppler (pdftoppm)"),
            Engine::Pdfium => f.write_str("pdfium"),
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by render-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// The current OS/architecture combination has no known library name.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// The engine was not found in any searched location.
    #[error("{engine} not found (searched {} locations)\n{hint}", .searched.len())]
    NotFound {
        engine: Engine,
        searched: Vec<PathBuf>,
        hint: String,
    },

    /// `pdfium-render` could not load the library.
    #[error("Failed to bind pdfium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

impl LocateError {
    /// The remediation text to show the user, if this error carries one.
    pub fn hint(&self) -> String {
        match self {
            LocateError::NotFound { hint, .. } => hint.clone(),
            LocateError::Bind { .. } => install_hint(Engine::Pdfium),
            LocateError::UnsupportedPlatform { .. } => String::new(),
        }
    }
}

// ── Install hints ────────────────────────────────────────────────────────────

/// Platform-specific instructions for installing `engine`.
pub fn install_hint(engine: Engine) -> String {
    match engine {
        Engine::Poppler => match std::env::consts::OS {
            "windows" => "Install Poppler using one of these methods:\n\
  1. Download from: https://github.com/oschwartz10612/poppler-windows/releases/\n\
  2. Extract to C:\\poppler\n\
  3. Add the bin directory to your PATH\n\
  4. Or set POPPLER_PATH to your Poppler bin directory"
                .to_string(),
            "macos" => "Install Poppler with: brew install poppler\n\
Or set POPPLER_PATH to the directory containing pdftoppm."
                .to_string(),
            _ => "Install Poppler with: sudo apt-get install poppler-utils\n\
(or your distribution's poppler package).\n\
Or set POPPLER_PATH to the directory containing pdftoppm."
                .to_string(),
        },
        Engine::Pdfium => format!(
            "Download a pdfium build from https://github.com/bblanchon/pdfium-binaries/releases\n\
and either set {PDFIUM_LIB_PATH_ENV}=/path/to/{lib}\n\
or copy {lib} into {}.",
            pdfium_cache_dir().display(),
            lib = pdfium_lib_name().unwrap_or("libpdfium"),
        ),
    }
}

// ── Poppler ──────────────────────────────────────────────────────────────────

/// File name of the `pdftoppm` executable on this platform.
pub fn pdftoppm_name() -> &'static str {
    if cfg!(windows) {
        "pdftoppm.exe"
    } else {
        "pdftoppm"
    }
}

/// Locate the `pdftoppm` executable.
///
/// `explicit_dir` takes precedence over every other location. A directory
/// that does not contain the executable is skipped rather than treated as an
/// error, so a stale `POPPLER_PATH` still falls through to `PATH`.
pub fn locate_pdftoppm(explicit_dir: Option<&Path>) -> Result<PathBuf, LocateError> {
    let env_dir = std::env::var_os(POPPLER_PATH_ENV).map(PathBuf::from);
    let path_var = std::env::var_os("PATH");
    let extra: &[&str] = if cfg!(windows) { WINDOWS_POPPLER_DIRS } else { &[] };

    locate_executable(
        pdftoppm_name(),
        explicit_dir,
        env_dir.as_deref(),
        path_var.as_deref(),
        extra,
    )
    .map_err(|searched| LocateError::NotFound {
        engine: Engine::Poppler,
        searched,
        hint: install_hint(Engine::Poppler),
    })
}

/// Candidate directories in lookup order. Returns the first hit, or every
/// path that was tried.
fn locate_executable(
    name: &str,
    explicit_dir: Option<&Path>,
    env_dir: Option<&Path>,
    path_var: Option<&OsStr>,
    extra_dirs: &[&str],
) -> Result<PathBuf, Vec<PathBuf>> {
    let mut search_dirs: Vec<PathBuf> = Vec::new();
    search_dirs.extend(explicit_dir.map(Path::to_path_buf));
    search_dirs.extend(env_dir.map(Path::to_path_buf));
    if let Some(p) = path_var {
        search_dirs.extend(std::env::split_paths(p));
    }
    search_dirs.extend(extra_dirs.iter().map(PathBuf::from));

    let mut searched = Vec::with_capacity(search_dirs.len());
    for dir in search_dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }
    Err(searched)
}

// ── Pdfium ───────────────────────────────────────────────────────────────────

/// File name of the pdfium shared library on this platform.
pub fn pdfium_lib_name() -> Result<&'static str, LocateError> {
    match std::env::consts::OS {
        "macos" => Ok("libpdfium.dylib"),
        "linux" | "freebsd" => Ok("libpdfium.so"),
        "windows" => Ok("pdfium.dll"),
        os => Err(LocateError::UnsupportedPlatform {
            os: os.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }),
    }
}

/// Directory where a user may drop a pdfium build for `flatten-pdf` to find.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/flatten-pdf/pdfium/`
/// - **Linux**: `~/.cache/flatten-pdf/pdfium/`
/// - **Windows**: `%LOCALAPPDATA%\flatten-pdf\pdfium\`
///
/// Override by setting `PDFIUM_CACHE_DIR`.
pub fn pdfium_cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(PDFIUM_CACHE_DIR_ENV) {
        return PathBuf::from(override_dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("flatten-pdf").join("pdfium")
}

/// Locate the pdfium shared library on disk.
///
/// Does not consult the system library search path; [`bind_pdfium`] falls
/// back to it when this returns `NotFound`.
pub fn locate_pdfium() -> Result<PathBuf, LocateError> {
    let lib_name = pdfium_lib_name()?;
    let mut searched = Vec::new();

    if let Some(p) = std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        let p = PathBuf::from(p);
        if p.is_file() {
            return Ok(p);
        }
        searched.push(p);
    }

    let mut candidates = vec![pdfium_cache_dir().join(lib_name)];
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(lib_name));
    }

    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    Err(LocateError::NotFound {
        engine: Engine::Pdfium,
        searched,
        hint: install_hint(Engine::Pdfium),
    })
}

/// Binds to pdfium, trying [`locate_pdfium`] first and the system library
/// search path second.
pub fn bind_pdfium() -> Result<Pdfium, LocateError> {
    match locate_pdfium() {
        Ok(path) => bind_pdfium_from_path(&path),
        Err(LocateError::NotFound { searched, hint, .. }) => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|_| LocateError::NotFound {
                engine: Engine::Pdfium,
                searched,
                hint,
            }),
        Err(e) => Err(e),
    }
}

/// Binds to a pdfium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, LocateError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| LocateError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
