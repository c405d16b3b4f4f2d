//! removd core - image intake primitives
//!
//! Synchronous, I/O-free building blocks for preparing images before they
//! are sent to a remote transform service:
//!
//! - [`probe`]: read format and dimensions from a bounded prefix, growing
//!   the window when the header is incomplete.
//! - [`tier`]: map dimensions to a billed size tier and a bounding fit.
//! - [`decode`]: full decode with EXIF orientation, and resizing.
//! - [`encode`]: JPEG/PNG encoding and the downscale search.
//!
//! The async runtime that drives these over files, URLs and batches lives
//! in the `removd` crate.

pub mod decode;
pub mod encode;
pub mod format;
pub mod probe;
pub mod tier;

/// Encoded image fixtures for tests in this and dependent crates.
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use encode::{shrink_to_fit, ShrinkError, ShrinkOptions, ShrinkOutcome};
pub use format::{source_extension, ImageKind, SourceExtension};
pub use probe::{probe_buffer, PayloadEncoding, ProbeError, ProbeResult, ProbeSettings};
pub use tier::{
    classify, fit_within, BoundingBox, Classification, Fit, Megapixels, SizeTier, TierError,
    TierTable, STANDARD_TIERS,
};
