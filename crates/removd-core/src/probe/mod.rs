//! Adaptive partial-content metadata probing.
//!
//! Most images keep their metadata in the first few KiB, so reading a whole
//! file (or downloading a whole object) to learn its dimensions is wasteful.
//! A probe reads a bounded prefix, decodes the header from it, and grows the
//! window only when the header is incomplete.
//!
//! # Pipeline
//!
//! 1. [`ProbePlan`] picks the window for the next attempt.
//! 2. [`unwrap_payload`] turns base64, hex or data URL text into image bytes.
//! 3. [`read_header`] decodes format, dimensions and color information.
//! 4. [`ProbePlan::evaluate`] decides between done, grow and fail.
//!
//! The runtime crate drives the same plan over files and HTTP streams;
//! [`probe_buffer`] drives it over memory.
//!
//! # Examples
//!
//! ```ignore
//! use removd_core::probe::{probe_buffer, ProbeSettings};
//!
//! let bytes = std::fs::read("photo.png").unwrap();
//! let result = probe_buffer(&bytes, ProbeSettings::default()).unwrap();
//! println!("{} {}x{}", result.format, result.width, result.height);
//! ```

mod header;
mod payload;
mod plan;
mod types;

pub use header::read_header;
pub use payload::{unwrap_payload, Unwrapped};
pub use plan::{window_size, ProbePlan, ProbeSettings, ProbeStep, ProbeWindow, WINDOW_UNIT};
pub use types::{PayloadEncoding, ProbeError, ProbeResult, RawMetadata};

/// Unwrap a prefix and decode its header in one step.
pub fn inspect(prefix: &[u8]) -> Result<ProbeResult, ProbeError> {
    let unwrapped = unwrap_payload(prefix)?;
    let mut result = read_header(&unwrapped.bytes)?;
    result.is_data_url = unwrapped.data_url_mime.is_some();
    result.metadata.encoding = unwrapped.encoding;
    result.metadata.data_url_mime = unwrapped.data_url_mime;
    Ok(result)
}

/// Probe an in-memory buffer with a growing window.
pub fn probe_buffer(bytes: &[u8], settings: ProbeSettings) -> Result<ProbeResult, ProbeError> {
    if bytes.is_empty() {
        return Err(ProbeError::Empty);
    }

    let mut plan = ProbePlan::new(settings, Some(bytes.len() as u64));
    let mut last = ProbeError::Empty;

    while let Some(window) = plan.next_window() {
        let end = bytes.len().min(window.len as usize);
        match plan.evaluate(&window, &bytes[..end]) {
            ProbeStep::Done(result) => return Ok(result),
            ProbeStep::Grow(err) => {
                tracing::debug!(
                    attempt = window.attempt,
                    window = window.len,
                    error = %err,
                    "header incomplete, growing window"
                );
                last = err;
            }
            ProbeStep::Fail(err) => return Err(err),
        }
    }

    Err(last)
}
