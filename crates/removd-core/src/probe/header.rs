//! Header decoding from a byte prefix.
//!
//! Only the decoder headers are parsed: the PNG decoder stops at the first
//! `IDAT` chunk and the JPEG decoder at the frame header, so a prefix that
//! covers the metadata is enough. Input that ends too early surfaces as an
//! I/O or decoding error from the `image` crate, which is reported as
//! [`ProbeError::Truncated`].

use std::io::Cursor;

use image::{ImageDecoder, ImageError, ImageReader};

use super::{ProbeError, ProbeResult, RawMetadata};
use crate::decode::{read_orientation, Orientation};
use crate::format::ImageKind;

fn classify_image_error(err: ImageError, bytes_read: usize) -> ProbeError {
    match err {
        ImageError::IoError(_) | ImageError::Decoding(_) => ProbeError::Truncated { bytes_read },
        ImageError::Unsupported(e) => ProbeError::UnsupportedFormat(e.to_string()),
        other => ProbeError::Corrupt(other.to_string()),
    }
}

/// Decode format, dimensions and color information from image bytes.
///
/// `bytes` may be a prefix of the image. The returned metadata has
/// `bytes_read` and `attempts` left at zero for the caller to fill in.
pub fn read_header(bytes: &[u8]) -> Result<ProbeResult, ProbeError> {
    if bytes.is_empty() {
        return Err(ProbeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ProbeError::Io(e.to_string()))?;

    let format = match reader.format() {
        Some(detected) => ImageKind::from_image_format(detected).ok_or_else(|| {
            ProbeError::UnsupportedFormat(
                detected
                    .extensions_str()
                    .first()
                    .copied()
                    .unwrap_or("unknown")
                    .to_string(),
            )
        })?,
        None => return Err(ProbeError::NotAnImage),
    };

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| classify_image_error(e, bytes.len()))?;

    let (stored_width, stored_height) = decoder.dimensions();
    if stored_width == 0 || stored_height == 0 {
        return Err(ProbeError::Corrupt(format!(
            "header reports {stored_width}x{stored_height} pixels"
        )));
    }

    let color = decoder.color_type();
    let channels = color.channel_count();
    let has_profile = matches!(decoder.icc_profile(), Ok(Some(_)));

    let orientation = match format {
        ImageKind::Jpeg => read_orientation(bytes),
        ImageKind::Png => Orientation::Normal,
    };
    // Report the displayed size, the one `decode_image` produces
    let (width, height) = if orientation.swaps_dimensions() {
        (stored_height, stored_width)
    } else {
        (stored_width, stored_height)
    };

    Ok(ProbeResult {
        format,
        width,
        height,
        has_alpha: color.has_alpha(),
        is_data_url: false,
        color_space: if color.has_color() { "srgb" } else { "b-w" }.to_string(),
        metadata: RawMetadata {
            channels,
            bits_per_channel: (color.bits_per_pixel() / u16::from(channels.max(1))) as u8,
            has_profile,
            orientation,
            ..Default::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{jpeg_fixture, jpeg_with_orientation, png_fixture, png_with_text_chunk};

    #[test]
    fn test_read_png_header() {
        let png = png_fixture(40, 30, true);
        let result = read_header(&png).unwrap();
        assert_eq!(result.format, ImageKind::Png);
        assert_eq!(result.dimensions(), (40, 30));
        assert!(result.has_alpha);
        assert_eq!(result.color_space, "srgb");
        assert_eq!(result.metadata.channels, 4);
        assert_eq!(result.metadata.bits_per_channel, 8);
    }

    #[test]
    fn test_read_jpeg_header() {
        let jpeg = jpeg_fixture(64, 48);
        let result = read_header(&jpeg).unwrap();
        assert_eq!(result.format, ImageKind::Jpeg);
        assert_eq!(result.dimensions(), (64, 48));
        assert!(!result.has_alpha);
        assert_eq!(result.metadata.orientation, Orientation::Normal);
    }

    #[test]
    fn test_rotated_jpeg_reports_display_dimensions() {
        let jpeg = jpeg_with_orientation(1250, 800, 6);
        let result = read_header(&jpeg).unwrap();
        assert_eq!(result.metadata.orientation, Orientation::Rotate90CW);
        assert_eq!(result.dimensions(), (800, 1250));

        // Flips keep the stored size
        let flipped = read_header(&jpeg_with_orientation(1250, 800, 2)).unwrap();
        assert_eq!(flipped.dimensions(), (1250, 800));
    }

    #[test]
    fn test_header_from_prefix() {
        let png = png_fixture(200, 100, false);
        // Signature + IHDR + the start of IDAT is plenty
        let result = read_header(&png[..png.len().min(64)]);
        assert!(matches!(result, Ok(_) | Err(ProbeError::Truncated { .. })));
    }

    #[test]
    fn test_truncated_ancillary_chunk_is_retryable() {
        let png = png_with_text_chunk(16, 16, 20_000);
        let err = read_header(&png[..1024]).unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
        assert!(read_header(&png).is_ok());
    }

    #[test]
    fn test_not_an_image() {
        assert_eq!(read_header(&[0xAB; 512]), Err(ProbeError::NotAnImage));
        assert_eq!(read_header(&[]), Err(ProbeError::Empty));
    }

    #[test]
    fn test_unsupported_format() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        assert!(matches!(
            read_header(gif),
            Err(ProbeError::UnsupportedFormat(_))
        ));
    }
}
