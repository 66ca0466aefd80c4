//! Shared helpers for the integration tests.

#![allow(dead_code)]

use image::{DynamicImage, Luma};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use pdf_flattener::{FlattenError, PageImage, PageRenderer};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Send library logs to the captured test output. `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub const LETTER: (f32, f32) = (612.0, 792.0);
pub const LETTER_LANDSCAPE: (f32, f32) = (792.0, 612.0);
pub const A5: (f32, f32) = (420.0, 595.0);

/// Write a text PDF with one page per entry of `sizes` (in points).
/// Page `n` shows the text "Page n".
pub fn write_source_pdf(path: &Path, sizes: &[(f32, f32)], info: Option<Dictionary>) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for (i, (w, h)) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 72.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(*w), Object::Real(*h)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(info) = info {
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);
    }
    doc.save(path).unwrap();
}

/// Grey level painted on page `n` by [`MediaBoxRenderer`].
pub fn shade_of(page_num: usize) -> u8 {
    (30 + 60 * (page_num - 1) % 200) as u8
}

/// Renders blank pages sized from each MediaBox, page `n` filled with
/// [`shade_of`]`(n)`. Needs neither poppler nor pdfium.
#[derive(Debug, Default, Clone)]
pub struct MediaBoxRenderer {
    /// Return one page fewer than the source has.
    pub drop_last: bool,
    /// Fail instead of rendering.
    pub fail: bool,
}

impl PageRenderer for MediaBoxRenderer {
    fn name(&self) -> &'static str {
        "mediabox-stub"
    }

    async fn render_pages(
        &self,
        pdf_path: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, FlattenError> {
        if self.fail {
            return Err(FlattenError::RenderFailed {
                page: None,
                detail: "stub renderer asked to fail".into(),
            });
        }

        let doc = Document::load(pdf_path).map_err(|e| FlattenError::InvalidInputDocument {
            path: pdf_path.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut pages = Vec::new();
        for (num, id) in doc.get_pages() {
            let page_num = num as usize;
            let (w_pt, h_pt) = media_box_of(&doc, id);
            let w_px = (w_pt * dpi as f32 / 72.0).round() as u32;
            let h_px = (h_pt * dpi as f32 / 72.0).round() as u32;
            let img = image::GrayImage::from_pixel(w_px, h_px, Luma([shade_of(page_num)]));
            pages.push(PageImage {
                page_num,
                dpi,
                image: DynamicImage::ImageLuma8(img),
            });
        }
        if self.drop_last {
            pages.pop();
        }
        Ok(pages)
    }
}

/// Waits `delay` before delegating to [`MediaBoxRenderer`].
#[derive(Debug, Clone)]
pub struct SlowRenderer {
    pub delay: Duration,
}

impl PageRenderer for SlowRenderer {
    fn name(&self) -> &'static str {
        "slow-stub"
    }

    async fn render_pages(
        &self,
        pdf_path: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, FlattenError> {
        tokio::time::sleep(self.delay).await;
        MediaBoxRenderer::default().render_pages(pdf_path, dpi).await
    }
}

pub fn media_box_of(doc: &Document, page_id: lopdf::ObjectId) -> (f32, f32) {
    let mb = doc
        .get_object(page_id)
        .unwrap()
        .as_dict()
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap();
    (mb[2].as_float().unwrap(), mb[3].as_float().unwrap())
}

/// What a flattened output page looks like from the outside.
#[derive(Debug)]
pub struct OutputPage {
    pub media_box: (f32, f32),
    pub width_px: i64,
    pub height_px: i64,
    /// Centre pixel of the decoded page image.
    pub centre_luma: u8,
    pub has_font: bool,
}

pub fn read_output_pages(path: &Path) -> Vec<OutputPage> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_object(id).unwrap().as_dict().unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let image_ref = resources
                .get(b"XObject")
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"Im0")
                .unwrap()
                .as_reference()
                .unwrap();
            let stream = doc.get_object(image_ref).unwrap().as_stream().unwrap();
            let width_px = stream.dict.get(b"Width").unwrap().as_i64().unwrap();
            let height_px = stream.dict.get(b"Height").unwrap().as_i64().unwrap();

            let decoded = image::load_from_memory(&stream.content).unwrap().to_luma8();
            let centre = decoded.get_pixel(decoded.width() / 2, decoded.height() / 2)[0];

            OutputPage {
                media_box: media_box_of(&doc, id),
                width_px,
                height_px,
                centre_luma: centre,
                has_font: resources.get(b"Font").is_ok(),
            }
        })
        .collect()
}

/// `/Info` string entry of the PDF at `path`.
pub fn info_entry(path: &Path, key: &[u8]) -> Option<String> {
    let doc = Document::load(path).unwrap();
    let info = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(d) => d,
        _ => return None,
    };
    match info.get(key).ok()? {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.5
}
