//! Accepted image formats and the source extension allow-list.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Image formats the transform service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    /// Map a MIME type such as `image/png` back to a kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(ImageKind::Png),
            image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Png => f.write_str("png"),
            ImageKind::Jpeg => f.write_str("jpeg"),
        }
    }
}

/// What a local source's extension says about its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceExtension {
    Image(ImageKind),
    /// A text file holding a base64 (or data URL) encoded image.
    Text,
}

/// Check a path against the allow-list (`png`, `jpg`, `jpeg`, `txt`).
///
/// Returns `None` for anything else so callers can reject the source before
/// reading a single byte.
pub fn source_extension(path: &Path) -> Option<SourceExtension> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some(SourceExtension::Image(ImageKind::Png)),
        "jpg" | "jpeg" => Some(SourceExtension::Image(ImageKind::Jpeg)),
        "txt" => Some(SourceExtension::Text),
        _ => None,
    }
}
