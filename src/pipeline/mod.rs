//! Pipeline stages for PDF flattening.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the rendering backend can change without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode/assemble ──▶ metadata
//! (path)   (poppler   (JPEG → lopdf)      (/Info dates)
//!           or pdfium)
//! ```
//!
//! 1. [`input`]    validate the source path and settle the output path
//! 2. [`render`]   the [`render::PageRenderer`] capability; [`poppler`] runs
//!    `pdftoppm`, [`pdfium`] renders in-process on the blocking pool
//! 3. [`encode`]   JPEG-encode each page raster
//! 4. [`assemble`] one image-only page per raster, written atomically
//! 5. [`metadata`] read source facts; patch `/CreationDate` and `/ModDate`

pub mod assemble;
pub mod encode;
pub mod input;
pub mod metadata;
pub mod pdfium;
pub mod poppler;
pub mod render;
