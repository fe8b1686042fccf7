//! Best-effort recompression of submitted images.
//!
//! Gallery posts arrive as base64 (usually a canvas `data:image/png` URI).
//! PNG screenshots blow past the stored-content ceiling fast, so before the
//! size check we bound the image to a max edge and re-encode as JPEG. Any
//! failure keeps the original content; the size check still guards the store.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ColorType, GenericImageView, codecs::jpeg::JpegEncoder, imageops::FilterType};
use tracing::debug;

/// Longest edge after recompression.
pub const MAX_EDGE: u32 = 1600;

/// JPEG quality target for re-encoded images.
pub const JPEG_QUALITY: u8 = 80;

/// Decode, bound, and re-encode a base64 image. Returns `None` when the
/// content is not decodable as an image; the caller falls back to the
/// original content.
pub fn recompress_base64_image(content: &str) -> Option<String> {
    let (had_data_uri, encoded) = strip_data_uri(content);

    let bytes = STANDARD.decode(encoded).ok()?;
    let decoded = image::load_from_memory(&bytes).ok()?;

    let (original_width, original_height) = decoded.dimensions();
    let resized = if original_width > MAX_EDGE || original_height > MAX_EDGE {
        decoded.resize(MAX_EDGE, MAX_EDGE, FilterType::Triangle)
    } else {
        decoded
    };

    let rgb = resized.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg_bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, JPEG_QUALITY);
    encoder
        .encode(rgb.as_raw(), width, height, ColorType::Rgb8.into())
        .ok()?;

    debug!(
        original = bytes.len(),
        recompressed = jpeg_bytes.len(),
        "recompressed image content"
    );

    let reencoded = STANDARD.encode(&jpeg_bytes);
    if had_data_uri {
        Some(format!("data:image/jpeg;base64,{reencoded}"))
    } else {
        Some(reencoded)
    }
}

/// Split an optional `data:<mime>;base64,` prefix off the payload.
fn strip_data_uri(content: &str) -> (bool, &str) {
    if content.starts_with("data:") {
        match content.split_once("base64,") {
            Some((_, rest)) => (true, rest),
            None => (false, content),
        }
    } else {
        (false, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png_base64(width: u32, height: u32) -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 30, 200]),
        ));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        STANDARD.encode(&bytes)
    }

    #[test]
    fn recompresses_data_uri_to_jpeg() {
        let content = format!("data:image/png;base64,{}", png_base64(8, 8));

        let out = recompress_base64_image(&content).unwrap();

        assert!(out.starts_with("data:image/jpeg;base64,"));
        let decoded = STANDARD
            .decode(out.trim_start_matches("data:image/jpeg;base64,"))
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!(img.width(), 8);
    }

    #[test]
    fn bounds_oversized_images_to_max_edge() {
        let content = png_base64(MAX_EDGE * 2, 16);

        let out = recompress_base64_image(&content).unwrap();

        let decoded = STANDARD.decode(&out).unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert!(img.width() <= MAX_EDGE);
        assert!(img.height() <= MAX_EDGE);
    }

    #[test]
    fn garbage_content_is_left_alone() {
        assert!(recompress_base64_image("not an image at all").is_none());
        assert!(recompress_base64_image("data:image/png;base64,!!!").is_none());
    }
}
