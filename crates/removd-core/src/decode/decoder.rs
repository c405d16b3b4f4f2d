//! Image decoding with EXIF orientation handling.
//!
//! Used by the downscale search and the resolution restore step, which both
//! need full pixel data. Header-only inspection lives in `probe`.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::DynamicImage;
use image::ImageReader;

use super::{DecodeError, DecodedImage, Orientation};
use crate::format::ImageKind;

/// Decode PNG or JPEG bytes, applying EXIF orientation correction.
///
/// # Arguments
///
/// * `bytes` - Complete image file bytes
///
/// # Returns
///
/// A `DecodedImage` with RGB or RGBA pixel data and correct orientation applied.
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` if the bytes are neither PNG nor JPEG.
/// Returns `DecodeError::CorruptedFile` if the image data is corrupted.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let kind = reader
        .format()
        .and_then(ImageKind::from_image_format)
        .ok_or(DecodeError::InvalidFormat)?;

    let img = reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let img = match kind {
        ImageKind::Jpeg => apply_orientation(img, read_orientation(bytes)),
        ImageKind::Png => img,
    };

    Ok(DecodedImage::from_dynamic(img))
}

/// Extract EXIF orientation from JPEG bytes.
///
/// Works on a prefix as long as it covers the APP1 segment. Returns
/// `Orientation::Normal` if no EXIF data is found or orientation cannot be
/// determined.
pub fn read_orientation(bytes: &[u8]) -> Orientation {
    let exif_reader = Reader::new();
    let mut cursor = Cursor::new(bytes);

    match exif_reader.read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from)
            .unwrap_or_default(),
        Err(_) => Orientation::Normal,
    }
}

/// Apply EXIF orientation transformation to an image.
fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}
