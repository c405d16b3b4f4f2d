//! Image sources and their identifiers.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    /// In-memory bytes, binary or textual (base64, hex, data URL).
    Buffer(Bytes),
    Url(String),
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        Self::Buffer(bytes.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Identifier reported with results. Buffers have no name, so they are
    /// labelled by their position in the request list.
    pub fn id(&self, index: usize) -> SourceId {
        match self {
            ImageSource::Path(path) => SourceId(path.display().to_string()),
            ImageSource::Buffer(_) => SourceId(format!("buffer-{index}")),
            ImageSource::Url(url) => SourceId(url.clone()),
        }
    }

    /// File stem used to name outputs.
    pub fn stem(&self, index: usize) -> String {
        let stem = match self {
            ImageSource::Path(path) => path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            ImageSource::Buffer(_) => return format!("buffer-{index}"),
            ImageSource::Url(url) => url_stem(url),
        };
        stem.filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("image-{index}"))
    }
}

fn url_stem(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let stem = Path::new(name).file_stem()?.to_string_lossy().into_owned();
    Some(stem)
}

/// Identifier of a source in results and progress events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
