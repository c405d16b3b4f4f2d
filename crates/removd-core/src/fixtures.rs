//! Encoded image fixtures.
//!
//! Compiled for this crate's tests and, through the `test-fixtures`
//! feature, for the tests of crates that build on it. Every helper panics
//! on encoder failure.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::decode::DecodedImage;

/// Offset just past the PNG signature and the IHDR chunk.
const AFTER_IHDR: usize = 8 + 4 + 4 + 13 + 4;

fn gradient(width: u32, height: u32, channels: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * channels);
    for y in 0..height {
        for x in 0..width {
            let px = [
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
                200,
            ];
            pixels.extend_from_slice(&px[..channels]);
        }
    }
    pixels
}

pub fn png_fixture(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let (channels, color) = if alpha {
        (4, ExtendedColorType::Rgba8)
    } else {
        (3, ExtendedColorType::Rgb8)
    };
    let mut out = Cursor::new(Vec::new());
    PngEncoder::new(&mut out)
        .write_image(&gradient(width, height, channels), width, height, color)
        .expect("png fixture");
    out.into_inner()
}

pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(&gradient(width, height, 3), width, height, ExtendedColorType::Rgb8)
        .expect("jpeg fixture");
    out.into_inner()
}

/// A JPEG carrying an EXIF APP1 segment with the given orientation tag.
///
/// The pixel data is stored `width` x `height`; viewers rotate it according
/// to `orientation`.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let jpeg = jpeg_fixture(width, height);

    // Little-endian TIFF header with a single IFD0 entry: Orientation (0x0112), SHORT, count 1
    let mut tiff = b"II\x2A\x00\x08\x00\x00\x00\x01\x00\x12\x01\x03\x00\x01\x00\x00\x00".to_vec();
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((tiff.len() + 6 + 2) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    [&jpeg[..2], app1.as_slice(), &jpeg[2..]].concat()
}

/// A PNG with a `tEXt` chunk of `text_len` bytes between IHDR and IDAT,
/// pushing the end of the header well past the first KiB.
pub fn png_with_text_chunk(width: u32, height: u32, text_len: usize) -> Vec<u8> {
    let png = png_fixture(width, height, false);

    let mut data = b"Comment\0".to_vec();
    data.resize(data.len() + text_len, b'a');

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(b"tEXt");
    hasher.update(&data);

    let mut chunk = Vec::with_capacity(data.len() + 12);
    chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
    chunk.extend_from_slice(b"tEXt");
    chunk.extend_from_slice(&data);
    chunk.extend_from_slice(&hasher.finalize().to_be_bytes());

    [&png[..AFTER_IHDR], chunk.as_slice(), &png[AFTER_IHDR..]].concat()
}

/// Pseudo-random RGB pixels; compresses poorly, so JPEG output stays large.
pub fn noise_image(width: u32, height: u32) -> DecodedImage {
    let mut state: u32 = 0x9E37_79B9;
    let pixels = (0..width as usize * height as usize * 3)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    DecodedImage::new(width, height, pixels)
}
