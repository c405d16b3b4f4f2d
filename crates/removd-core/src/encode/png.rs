//! PNG encoding, used when a restored result carries transparency.

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::jpeg::check_image;
use super::EncodeError;
use crate::decode::DecodedImage;

/// Encode an RGB or RGBA image to PNG bytes. Alpha is preserved.
pub fn encode_png(image: &DecodedImage) -> Result<Vec<u8>, EncodeError> {
    check_image(image)?;

    let color = if image.has_alpha {
        ExtendedColorType::Rgba8
    } else {
        ExtendedColorType::Rgb8
    };

    let mut buffer = Cursor::new(Vec::new());
    PngEncoder::new(&mut buffer)
        .write_image(&image.pixels, image.width, image.height, color)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}
