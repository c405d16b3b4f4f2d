//! Image encoding and the downscale search.
//!
//! - [`encode_jpeg`] / [`encode_png`] write a [`DecodedImage`](crate::decode::DecodedImage).
//! - [`shrink_to_fit`] decodes, resizes into a box and searches JPEG quality
//!   until the output fits a byte ceiling.
//!
//! All operations are synchronous and CPU-bound; async callers should run
//! them on a blocking thread.

mod jpeg;
mod png;
mod shrink;

use thiserror::Error;

pub use jpeg::encode_jpeg;
pub use png::encode_png;
pub use shrink::{
    shrink_image, shrink_to_fit, QualityAttempt, ShrinkError, ShrinkOptions, ShrinkOutcome,
};

/// Errors that can occur during encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match the image dimensions.
    #[error("Invalid pixel data: expected {expected} bytes, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero.
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// The codec rejected the image.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}
