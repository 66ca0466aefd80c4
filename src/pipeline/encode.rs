//! Image encoding: `DynamicImage` → baseline JPEG bytes for a DCTDecode stream.
//!
//! PDF readers can display a JPEG XObject without re-encoding, so the bytes
//! produced here go into the output file verbatim. Alpha is dropped: a page
//! raster has no use for transparency and `/DeviceRGB` has three channels.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Encode a rasterised page as an RGB JPEG at `quality` (1..=100).
pub fn encode_page(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;

    debug!(
        "Encoded {}x{} image → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}
