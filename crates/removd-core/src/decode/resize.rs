//! Exact-size resizing for the downscale search and resolution restore.
//!
//! All functions return new `DecodedImage` instances without modifying the
//! input.

use super::{DecodeError, DecodedImage, FilterType};

/// Resize an image to exact dimensions.
///
/// # Arguments
///
/// * `image` - The source image to resize
/// * `width` - Target width in pixels
/// * `height` - Target height in pixels
/// * `filter` - Interpolation filter to use
///
/// # Errors
///
/// Returns `DecodeError::InvalidDimensions` for a zero target and
/// `DecodeError::CorruptedFile` if the pixel buffer does not match the
/// image dimensions.
pub fn resize(
    image: &DecodedImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<DecodedImage, DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    // Fast path: if dimensions match, just clone
    if image.width == width && image.height == height {
        return Ok(image.clone());
    }

    let dynamic = image.to_dynamic().ok_or_else(|| {
        DecodeError::CorruptedFile("Pixel buffer does not match dimensions".to_string())
    })?;

    let resized = dynamic.resize_exact(width, height, filter.to_image_filter());

    Ok(DecodedImage::from_dynamic(resized))
}
