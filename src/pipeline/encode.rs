//! Image encoding: `DynamicImage` → PNG bytes for tesseract, or base64 PNG
//! wrapped in `ImageData` for the vision backend.
//!
//! PNG is lossless; JPEG ringing around glyph edges costs OCR accuracy on
//! small print. Rasters in exotic layouts (16-bit, 32F) are narrowed to 8-bit
//! first since tesseract's leptonica reader rejects them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{ColorType, DynamicImage};
use std::io::Cursor;
use tracing::debug;

/// Encode an extracted image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let narrowed;
    let img = match img.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => img,
        ColorType::L16 | ColorType::La16 => {
            narrowed = DynamicImage::ImageLuma8(img.to_luma8());
            &narrowed
        }
        _ => {
            narrowed = DynamicImage::ImageRgba8(img.to_rgba8());
            &narrowed
        }
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} PNG bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode an extracted image as a base64 PNG attachment.
///
/// `detail: "high"` makes GPT-4-class models tile the image instead of
/// reading a single 512 px thumbnail, which loses line items.
pub fn encode_image_data(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(encode_png(img)?);
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
