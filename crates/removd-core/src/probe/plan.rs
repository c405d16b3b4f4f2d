//! Read-window schedule for adaptive probing.
//!
//! A probe reads a bounded prefix, tries to decode the header and, when the
//! header runs past the prefix, doubles the window and tries again. The plan
//! owns the attempt counter and window sizes; callers own the reading, so the
//! same schedule drives in-memory buffers, files and network streams.

use serde::{Deserialize, Serialize};

use super::{inspect, ProbeError, ProbeResult};

/// Unit the window multiplier is expressed in.
pub const WINDOW_UNIT: u64 = 1024;

/// Probe tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// First window is `initial_multiplier * 1 KiB` (or 1% of the source).
    pub initial_multiplier: u32,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            initial_multiplier: 10,
            max_attempts: 10,
        }
    }
}

/// Number of bytes to read for one attempt.
///
/// The window is the larger of `multiplier` KiB and one percent of the total
/// size (rounded to whole KiB), and never more than the total size when the
/// KiB marker alone already exceeds it. With an unknown total the marker is
/// used as is.
pub fn window_size(total: Option<u64>, multiplier: u32) -> u64 {
    let marker = WINDOW_UNIT * u64::from(multiplier);
    let full = total.filter(|t| *t > 0).unwrap_or(marker);

    let one_percent = ((full as f64 * 0.01 / WINDOW_UNIT as f64).round() as u64) * WINDOW_UNIT;
    let size = one_percent.max(marker);

    if marker > full {
        full
    } else {
        size
    }
}

/// One read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeWindow {
    /// 1-based attempt number.
    pub attempt: u32,
    pub multiplier: u32,
    /// Bytes to read.
    pub len: u64,
    /// The window reaches the end of a source of known size.
    pub covers_source: bool,
}

/// What to do after inspecting a window.
#[derive(Debug)]
pub enum ProbeStep {
    Done(ProbeResult),
    /// Read a larger window and try again.
    Grow(ProbeError),
    Fail(ProbeError),
}

/// Iterative probe schedule with an explicit attempt counter.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    settings: ProbeSettings,
    total: Option<u64>,
    attempt: u32,
    multiplier: u32,
}

impl ProbePlan {
    pub fn new(settings: ProbeSettings, total: Option<u64>) -> Self {
        Self {
            settings,
            total,
            attempt: 0,
            multiplier: settings.initial_multiplier.max(1),
        }
    }

    /// Next window to read, or `None` once every attempt has been used.
    pub fn next_window(&mut self) -> Option<ProbeWindow> {
        if self.attempt >= self.settings.max_attempts.max(1) {
            return None;
        }
        if self.attempt > 0 {
            self.multiplier = self.multiplier.saturating_mul(2);
        }
        self.attempt += 1;

        let len = window_size(self.total, self.multiplier);
        Some(ProbeWindow {
            attempt: self.attempt,
            multiplier: self.multiplier,
            len,
            covers_source: self.total.is_some_and(|t| len >= t),
        })
    }

    /// Decide the next step from the bytes read for `window`.
    ///
    /// A prefix shorter than the window means the source ended early, which
    /// counts as covering the whole source.
    pub fn evaluate(&self, window: &ProbeWindow, prefix: &[u8]) -> ProbeStep {
        let reached_end = window.covers_source || (prefix.len() as u64) < window.len;

        match inspect(prefix) {
            Ok(mut result) => {
                result.metadata.bytes_read = prefix.len();
                result.metadata.attempts = window.attempt;
                ProbeStep::Done(result)
            }
            Err(err) if err.is_retryable() => {
                if reached_end {
                    ProbeStep::Fail(ProbeError::Corrupt(format!(
                        "header incomplete at end of input ({} bytes)",
                        prefix.len()
                    )))
                } else if window.attempt >= self.settings.max_attempts.max(1) {
                    ProbeStep::Fail(ProbeError::Exhausted {
                        attempts: window.attempt,
                        bytes_read: prefix.len(),
                    })
                } else {
                    ProbeStep::Grow(err)
                }
            }
            Err(err) => ProbeStep::Fail(err),
        }
    }
}
