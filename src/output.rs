//! Result types returned by the flattening entry points.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summary of a finished flattening run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlattenStats {
    /// Pages in the source and therefore in the output.
    pub page_count: usize,
    /// Resolution the pages were rasterised at.
    pub dpi: u32,
    /// Where the flattened PDF was written.
    pub output_path: PathBuf,
    /// Size of the final output file.
    pub output_bytes: u64,
    /// Whether the patch stage rewrote any `/Info` date.
    pub metadata_patched: bool,
    pub render_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub patch_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Facts about a source PDF, read without rendering it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub page_count: usize,
    /// Header version, e.g. `"1.7"`.
    pub pdf_version: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    /// Raw `/CreationDate` string, e.g. `D:20200101120000+00'00'`.
    pub creation_date: Option<String>,
    /// Raw `/ModDate` string.
    pub modification_date: Option<String>,
    pub is_encrypted: bool,
}
