//! Image-only PDF assembly with `lopdf`.
//!
//! Every page of the output is one JPEG XObject scaled to fill a MediaBox
//! of the page's original physical size:
//!
//! ```text
//! width_pt  = width_px  × 72 / dpi
//! height_pt = height_px × 72 / dpi
//! ```
//!
//! The content stream is just `q w 0 0 h 0 0 cm /Im0 Do Q`. There is no text
//! layer, no annotations and no form fields: that is the point of flattening.
//!
//! The file is written to a temp file next to the target and renamed over
//! it, so a failed run never leaves a half-written PDF at the output path.

use crate::error::FlattenError;
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::PageImage;
use crate::progress::ProgressCallback;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Header version of assembled documents.
pub const OUTPUT_PDF_VERSION: &str = "1.5";

/// Resource name of the page image inside each page's `/XObject` dict.
const IMAGE_NAME: &str = "Im0";

/// Physical size in PDF points of an image rendered at `dpi`.
pub fn page_size_points(width_px: u32, height_px: u32, dpi: u32) -> (f32, f32) {
    let scale = 72.0 / dpi as f32;
    (width_px as f32 * scale, height_px as f32 * scale)
}

/// Build an in-memory document with one page per image, in slice order.
pub fn build_document(
    pages: &[PageImage],
    jpeg_quality: u8,
    progress: Option<&ProgressCallback>,
) -> Result<Document, FlattenError> {
    let total = pages.len();
    let mut doc = Document::with_version(OUTPUT_PDF_VERSION);
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(total);

    for page in pages {
        let (w_px, h_px) = (page.width(), page.height());
        if w_px == 0 || h_px == 0 {
            return Err(FlattenError::PageEncoding {
                page: page.page_num,
                detail: format!("empty raster ({w_px}x{h_px})"),
            });
        }

        let jpeg = encode_page(&page.image, jpeg_quality).map_err(|e| FlattenError::PageEncoding {
            page: page.page_num,
            detail: e.to_string(),
        })?;

        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w_px as i64,
                "Height" => h_px as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false);
        let image_id = doc.add_object(image_stream);

        let (w_pt, h_pt) = page_size_points(w_px, h_px, page.dpi);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(w_pt),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(h_pt),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content.encode().map_err(|e| FlattenError::PageEncoding {
            page: page.page_num,
            detail: format!("content stream: {e}"),
        })?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(w_pt),
                Object::Real(h_pt),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
        });
        kids.push(page_id.into());

        debug!(
            "Assembled page {} ({}x{} px → {:.2}x{:.2} pt)",
            page.page_num, w_px, h_px, w_pt, h_pt
        );
        if let Some(cb) = progress {
            cb.on_page_assembled(page.page_num, total);
        }
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal(producer()),
    });
    doc.trailer.set("Info", info_id);

    doc.compress();
    let _ = doc.prune_objects();

    info!("Assembled {} pages", total);
    Ok(doc)
}

/// Serialise `doc` and atomically replace `path` with it.
///
/// Returns the number of bytes written.
pub fn write_document(doc: &mut Document, path: &Path) -> Result<u64, FlattenError> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| FlattenError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?;
    write_atomic(path, &bytes)?;
    Ok(bytes.len() as u64)
}

/// Write `bytes` to a sibling temp file, then rename it onto `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FlattenError> {
    let write_err = |source: std::io::Error| FlattenError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn producer() -> String {
    format!("flatten-pdf {}", env!("CARGO_PKG_VERSION"))
}
