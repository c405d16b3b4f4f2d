//! Size tiers and aspect-preserving fits.
//!
//! The transform service bills by output resolution. Each [`SizeTier`] names a
//! resolution bucket with a credit cost, a megapixel ceiling and the largest
//! box an image of that tier is delivered in. Classification picks the first
//! tier whose ceiling is not exceeded and computes the largest rectangle that
//! keeps the source aspect ratio inside that tier's box.
//!
//! Megapixels are tracked in hundredths ([`Megapixels`]) so that ceilings such
//! as `4.00` compare exactly against values rounded to two decimals.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while classifying dimensions or resolving a tier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TierError {
    /// Width or height is zero.
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// A requested size name is not part of the tier table.
    #[error("Unsupported size: {0}")]
    UnsupportedSize(String),

    /// The tier table violates the ordering invariant.
    #[error("Invalid tier table: {0}")]
    InvalidTable(&'static str),
}

/// A megapixel count rounded to two decimals, stored in hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Megapixels(u32);

impl Megapixels {
    /// Build from a count of hundredths of a megapixel (`400` is `4.00`).
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    /// Megapixels of a `width x height` image, rounded half-up to two decimals.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let pixels = u64::from(width) * u64::from(height);
        let hundredths = (pixels + 5_000) / 10_000;
        Self(u32::try_from(hundredths).unwrap_or(u32::MAX))
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Megapixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// A width/height box in pixels, stored landscape-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Orient the box to match a source image: portrait sources (ratio < 1)
    /// get the box with its sides swapped.
    pub fn oriented_for(self, width: u32, height: u32) -> Self {
        if width < height {
            Self::new(self.height, self.width)
        } else {
            self
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One named resolution bucket.
///
/// The `auto` sentinel has no ceiling, no box and an unknown cost; it asks the
/// service to choose and is billed after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeTier {
    pub name: &'static str,
    /// Credits charged for this tier, `None` when only known after billing.
    pub credit_cost: Option<u32>,
    pub ceiling: Option<Megapixels>,
    pub max_box: Option<BoundingBox>,
}

impl SizeTier {
    pub const fn bounded(
        name: &'static str,
        credit_cost: u32,
        ceiling_hundredths: u32,
        max_box: BoundingBox,
    ) -> Self {
        Self {
            name,
            credit_cost: Some(credit_cost),
            ceiling: Some(Megapixels::from_hundredths(ceiling_hundredths)),
            max_box: Some(max_box),
        }
    }

    pub const fn auto() -> Self {
        Self {
            name: "auto",
            credit_cost: None,
            ceiling: None,
            max_box: None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.ceiling.is_some()
    }
}

/// Tiers offered by the transform service, ascending by ceiling.
pub static STANDARD_TIERS: [SizeTier; 5] = [
    SizeTier::bounded("small", 1, 25, BoundingBox::new(625, 400)),
    SizeTier::bounded("medium", 3, 150, BoundingBox::new(1500, 1000)),
    SizeTier::bounded("hd", 5, 400, BoundingBox::new(2500, 1600)),
    SizeTier::bounded("4k", 8, 1000, BoundingBox::new(4000, 2500)),
    SizeTier::auto(),
];

/// The largest rectangle preserving the source aspect ratio inside a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fit {
    pub target_width: u32,
    pub target_height: u32,
    /// True when the source already fits, so treating it as delivered at its
    /// own resolution loses nothing.
    pub preserved_without_resize: bool,
}

impl Fit {
    /// Identity fit used for unbounded tiers.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            target_width: width,
            target_height: height,
            preserved_without_resize: true,
        }
    }

    pub fn target(&self) -> BoundingBox {
        BoundingBox::new(self.target_width, self.target_height)
    }
}

/// Compute the aspect-preserving fit of `width x height` inside `bounds`.
///
/// `None` bounds (the `auto` tier) yield the identity fit. The result may be
/// larger than the source; `preserved_without_resize` reports whether the
/// source already fits.
pub fn fit_within(width: u32, height: u32, bounds: Option<BoundingBox>) -> Result<Fit, TierError> {
    if width == 0 || height == 0 {
        return Err(TierError::InvalidDimensions { width, height });
    }

    let Some(bounds) = bounds else {
        return Ok(Fit::identity(width, height));
    };

    let bounds = bounds.oriented_for(width, height);
    let (w, h) = (f64::from(width), f64::from(height));
    let scale = (f64::from(bounds.width) / w).min(f64::from(bounds.height) / h);

    let target_width = ((w * scale).round() as u32).max(1);
    let target_height = ((h * scale).round() as u32).max(1);

    Ok(Fit {
        target_width,
        target_height,
        preserved_without_resize: width <= target_width || height <= target_height,
    })
}

/// Result of classifying a pair of dimensions against a tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub tier: SizeTier,
    pub megapixels: Megapixels,
    pub fit: Fit,
}

impl Classification {
    pub fn tier_name(&self) -> &'static str {
        self.tier.name
    }

    pub fn credit_cost(&self) -> Option<u32> {
        self.tier.credit_cost
    }
}

/// A validated, ordered view over a tier list.
#[derive(Debug, Clone, Copy)]
pub struct TierTable<'a> {
    tiers: &'a [SizeTier],
}

impl TierTable<'static> {
    /// The service's standard table.
    pub fn standard() -> Self {
        Self {
            tiers: &STANDARD_TIERS,
        }
    }
}

impl Default for TierTable<'static> {
    fn default() -> Self {
        Self::standard()
    }
}

impl<'a> TierTable<'a> {
    /// Validate a tier list.
    ///
    /// Bounded tiers must come first, carry a box, and have strictly
    /// ascending ceilings. At least one bounded tier is required.
    pub fn new(tiers: &'a [SizeTier]) -> Result<Self, TierError> {
        let mut previous: Option<Megapixels> = None;
        let mut seen_unbounded = false;
        let mut bounded = 0usize;

        for tier in tiers {
            match tier.ceiling {
                Some(ceiling) => {
                    if seen_unbounded {
                        return Err(TierError::InvalidTable(
                            "bounded tiers must precede unbounded ones",
                        ));
                    }
                    if tier.max_box.is_none() {
                        return Err(TierError::InvalidTable("bounded tier without a box"));
                    }
                    if previous.is_some_and(|p| p >= ceiling) {
                        return Err(TierError::InvalidTable("ceilings must be strictly ascending"));
                    }
                    previous = Some(ceiling);
                    bounded += 1;
                }
                None => seen_unbounded = true,
            }
        }

        if bounded == 0 {
            return Err(TierError::InvalidTable("at least one bounded tier is required"));
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &'a [SizeTier] {
        self.tiers
    }

    /// Look a tier up by name.
    pub fn find(&self, name: &str) -> Option<&'a SizeTier> {
        self.tiers.iter().find(|tier| tier.name == name)
    }

    fn bounded(&self) -> impl Iterator<Item = &'a SizeTier> {
        self.tiers.iter().filter(|tier| tier.is_bounded())
    }

    /// Pick the tier for a megapixel count: the first bounded tier whose
    /// ceiling is not exceeded, else the largest bounded tier.
    pub fn select(&self, megapixels: Megapixels) -> &'a SizeTier {
        let mut largest = None;
        for tier in self.bounded() {
            if tier.ceiling.is_some_and(|ceiling| ceiling >= megapixels) {
                return tier;
            }
            largest = Some(tier);
        }
        // `new` guarantees at least one bounded tier.
        largest.unwrap_or(&self.tiers[0])
    }

    /// Classify dimensions and fit them to the selected tier's box.
    pub fn classify(&self, width: u32, height: u32) -> Result<Classification, TierError> {
        if width == 0 || height == 0 {
            return Err(TierError::InvalidDimensions { width, height });
        }
        let megapixels = Megapixels::from_dimensions(width, height);
        let tier = *self.select(megapixels);
        let fit = fit_within(width, height, tier.max_box)?;
        Ok(Classification {
            tier,
            megapixels,
            fit,
        })
    }

    /// Classify, letting an explicitly requested size name override the
    /// selected tier.
    pub fn resolve(
        &self,
        requested: Option<&str>,
        width: u32,
        height: u32,
    ) -> Result<Classification, TierError> {
        let Some(name) = requested else {
            return self.classify(width, height);
        };

        let tier = *self
            .find(name)
            .ok_or_else(|| TierError::UnsupportedSize(name.to_string()))?;
        let fit = fit_within(width, height, tier.max_box)?;
        Ok(Classification {
            tier,
            megapixels: Megapixels::from_dimensions(width, height),
            fit,
        })
    }
}

/// Classify against the standard table.
pub fn classify(width: u32, height: u32) -> Result<Classification, TierError> {
    TierTable::standard().classify(width, height)
}


// ============================================================================
// Property-Based Tests
// ============================================================================
