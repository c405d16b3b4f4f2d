//! JPEG encoding for upload payloads and restored results.
//!
//! JPEG has no alpha channel, so RGBA images are flattened by dropping alpha
//! before encoding.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::EncodeError;
use crate::decode::DecodedImage;

/// Validate that `image` has non-zero dimensions and a matching buffer.
pub(super) fn check_image(image: &DecodedImage) -> Result<(), EncodeError> {
    if image.width == 0 || image.height == 0 {
        return Err(EncodeError::InvalidDimensions {
            width: image.width,
            height: image.height,
        });
    }

    let expected = image.pixel_count() as usize * image.channels();
    if image.pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: image.pixels.len(),
        });
    }
    Ok(())
}

/// Encode an image to JPEG bytes.
///
/// `quality` is clamped to 1-100.
///
/// # Example
///
/// ```ignore
/// use removd_core::decode::DecodedImage;
/// use removd_core::encode::encode_jpeg;
///
/// let image = DecodedImage::new(100, 100, vec![128u8; 100 * 100 * 3]);
/// let jpeg = encode_jpeg(&image, 82).unwrap();
/// assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
/// ```
pub fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    check_image(image)?;

    let quality = quality.clamp(1, 100);
    let mut buffer = Cursor::new(Vec::new());

    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            &image.rgb_pixels(),
            image.width,
            image.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Valid input always produces a JPEG with SOI and EOI markers.
        #[test]
        fn prop_valid_input_produces_valid_jpeg(
            width in 1u32..=40,
            height in 1u32..=40,
            quality in 1u8..=100,
            alpha in any::<bool>(),
        ) {
            let channels = if alpha { 4 } else { 3 };
            let image = DecodedImage {
                width,
                height,
                has_alpha: alpha,
                pixels: vec![90u8; (width * height) as usize * channels],
            };

            let jpeg = encode_jpeg(&image, quality).unwrap();
            prop_assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
            prop_assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
        }

        /// Same input always encodes to the same bytes.
        #[test]
        fn prop_deterministic_output(
            width in 1u32..=20,
            height in 1u32..=20,
            quality in 1u8..=100,
        ) {
            let image = DecodedImage::new(width, height, vec![100u8; (width * height * 3) as usize]);
            prop_assert_eq!(encode_jpeg(&image, quality).unwrap(), encode_jpeg(&image, quality).unwrap());
        }
    }
}
