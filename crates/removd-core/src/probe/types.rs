//! Core types for header probing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::Orientation;
use crate::format::ImageKind;

/// Error types for probe operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The source holds no bytes at all.
    #[error("Input is empty")]
    Empty,

    /// The bytes are an image, but not one the service accepts.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The bytes are not a recognizable image.
    #[error("Input is not a recognizable image")]
    NotAnImage,

    /// The header ends beyond the bytes read so far. Reading more may help.
    #[error("Image header incomplete after {bytes_read} bytes")]
    Truncated { bytes_read: usize },

    /// The retry bound was reached before the header was complete.
    #[error("Image header not found after {attempts} attempts ({bytes_read} bytes read)")]
    Exhausted { attempts: u32, bytes_read: usize },

    /// The whole source was read and the header still does not decode.
    #[error("Corrupted image header: {0}")]
    Corrupt(String),

    /// Text payload that is neither base64, hex nor a base64 data URL.
    #[error("Invalid text payload: {0}")]
    InvalidText(String),

    /// Local source could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// Remote source could not be fetched.
    #[error("{0}")]
    Fetch(String),
}

impl ProbeError {
    /// Only an incomplete header is worth a larger read window.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProbeError::Truncated { .. })
    }
}

/// How the probed bytes were encoded before image decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Binary,
    Base64,
    Hex,
}

impl PayloadEncoding {
    pub fn is_text(self) -> bool {
        !matches!(self, PayloadEncoding::Binary)
    }
}

/// Decoder-level metadata reported alongside the headline fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetadata {
    pub channels: u8,
    pub bits_per_channel: u8,
    /// An embedded ICC profile was found.
    pub has_profile: bool,
    /// EXIF orientation (JPEG only).
    pub orientation: Orientation,
    pub encoding: PayloadEncoding,
    /// MIME type declared by a data URL prefix.
    pub data_url_mime: Option<String>,
    /// Raw bytes read from the source by the successful attempt.
    pub bytes_read: usize,
    pub attempts: u32,
}

/// Metadata of a probed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub format: ImageKind,
    /// Width as displayed, with EXIF orientation applied.
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub is_data_url: bool,
    /// `srgb` for color images, `b-w` for grayscale.
    pub color_space: String,
    pub metadata: RawMetadata,
}

impl ProbeResult {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
