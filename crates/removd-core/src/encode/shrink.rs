//! Downscale search: fit an image under a byte ceiling.
//!
//! The image is decoded and resized once, then encoded as JPEG at
//! decreasing quality until the output fits. Each attempt is recorded so
//! callers can log how the search went.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{encode_jpeg, EncodeError};
use crate::decode::{decode_image, resize, DecodeError, DecodedImage, FilterType};
use crate::tier::{fit_within, BoundingBox, TierError};

/// Errors from the downscale search.
#[derive(Debug, Error)]
pub enum ShrinkError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Tier(#[from] TierError),

    #[error("Invalid shrink options: {0}")]
    InvalidOptions(&'static str),

    /// The quality floor was reached and the output is still too large.
    #[error("Could not fit under {ceiling} bytes: smallest output was {smallest} bytes at quality {quality}")]
    CeilingNotMet {
        ceiling: usize,
        smallest: usize,
        quality: u8,
    },
}

/// Search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkOptions {
    /// Maximum output size in bytes.
    pub byte_ceiling: usize,
    /// First JPEG quality tried.
    pub start_quality: u8,
    /// Quality decrement between attempts.
    pub step: u8,
    /// Lowest quality tried before giving up.
    pub quality_floor: u8,
    pub filter: FilterType,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self {
            byte_ceiling: 8_000_000,
            start_quality: 82,
            step: 2,
            quality_floor: 10,
            filter: FilterType::Lanczos3,
        }
    }
}

impl ShrinkOptions {
    fn validate(&self) -> Result<(), ShrinkError> {
        if self.byte_ceiling == 0 {
            return Err(ShrinkError::InvalidOptions("byte ceiling must be non-zero"));
        }
        if self.step == 0 {
            return Err(ShrinkError::InvalidOptions("quality step must be non-zero"));
        }
        if self.quality_floor == 0 || self.quality_floor > self.start_quality {
            return Err(ShrinkError::InvalidOptions(
                "quality floor must be between 1 and the start quality",
            ));
        }
        Ok(())
    }
}

/// One encode of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityAttempt {
    pub quality: u8,
    pub size: usize,
}

/// A JPEG that fits the ceiling.
#[derive(Debug, Clone)]
pub struct ShrinkOutcome {
    pub bytes: Vec<u8>,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    /// Every encode in order, the last being the accepted one.
    pub attempts: Vec<QualityAttempt>,
}

/// Decode `source`, resize it into `target` and search for a JPEG quality
/// that fits `options.byte_ceiling`.
///
/// With `target` set to `None`, or when the source already fits the box, the
/// source dimensions are kept.
pub fn shrink_to_fit(
    source: &[u8],
    target: Option<BoundingBox>,
    options: &ShrinkOptions,
) -> Result<ShrinkOutcome, ShrinkError> {
    options.validate()?;

    let decoded = decode_image(source)?;
    let fit = fit_within(decoded.width, decoded.height, target)?;

    let sized = if fit.preserved_without_resize {
        decoded
    } else {
        resize(
            &decoded,
            fit.target_width,
            fit.target_height,
            options.filter,
        )?
    };

    shrink_image(&sized, options)
}

/// Quality search over an image that is already at its final size.
pub fn shrink_image(
    image: &DecodedImage,
    options: &ShrinkOptions,
) -> Result<ShrinkOutcome, ShrinkError> {
    options.validate()?;

    let mut attempts = Vec::new();
    let mut quality = options.start_quality.min(100);

    loop {
        let bytes = encode_jpeg(image, quality)?;
        attempts.push(QualityAttempt {
            quality,
            size: bytes.len(),
        });
        tracing::debug!(quality, size = bytes.len(), "shrink attempt");

        if bytes.len() <= options.byte_ceiling {
            return Ok(ShrinkOutcome {
                bytes,
                quality,
                width: image.width,
                height: image.height,
                attempts,
            });
        }

        match quality.checked_sub(options.step) {
            Some(next) if next >= options.quality_floor => quality = next,
            _ => break,
        }
    }

    let smallest = attempts
        .iter()
        .min_by_key(|a| a.size)
        .copied()
        .unwrap_or(QualityAttempt { quality, size: 0 });

    Err(ShrinkError::CeilingNotMet {
        ceiling: options.byte_ceiling,
        smallest: smallest.size,
        quality: smallest.quality,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::fixtures::noise_image;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Qualities tried never go below the floor and strictly decrease.
        #[test]
        fn prop_attempts_stay_above_floor(
            start in 20u8..=95,
            step in 1u8..=15,
            floor in 1u8..=20,
        ) {
            prop_assume!(floor <= start);
            let options = ShrinkOptions {
                byte_ceiling: 1,
                start_quality: start,
                step,
                quality_floor: floor,
                ..Default::default()
            };
            let image = noise_image(8, 8);

            // A one-byte ceiling is never met, so every quality gets tried
            let err = shrink_image(&image, &options).unwrap_err();
            prop_assert!(
                matches!(err, ShrinkError::CeilingNotMet { quality, .. } if quality >= floor && quality <= start),
                "unexpected {:?}",
                err
            );
        }
    }
}
