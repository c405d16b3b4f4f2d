//! Image decoding for removd.
//!
//! This module provides functionality for:
//! - Decoding PNG and JPEG images to RGB/RGBA pixel buffers
//! - Applying EXIF orientation to JPEG images
//! - Resizing to exact dimensions
//!
//! Decoding here always reads the complete image. For learning dimensions
//! from a prefix, see [`crate::probe`].
//!
//! # Examples
//!
//! ```ignore
//! use removd_core::decode::{decode_image, resize, FilterType};
//!
//! let bytes = std::fs::read("photo.jpg").unwrap();
//! let image = decode_image(&bytes).unwrap();
//! let small = resize(&image, 625, 400, FilterType::Lanczos3).unwrap();
//! println!("{}x{} -> {}x{}", image.width, image.height, small.width, small.height);
//! ```

mod decoder;
mod resize;
mod types;

pub use decoder::{decode_image, read_orientation};
pub use resize::resize;
pub use types::{DecodeError, DecodedImage, FilterType, Orientation};
