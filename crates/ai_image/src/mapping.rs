//! Resolution and parameter mapping
//!
//! Backends accept sizes in different vocabularies: aspect-ratio labels, a
//! handful of fixed resolutions, or free dimensions inside a range and on an
//! alignment grid. These helpers turn a generic width/height into each of
//! them.

/// A supported aspect ratio with nominal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectBucket {
    /// Label sent to the backend, e.g. `16:9`
    pub label: &'static str,
    /// Nominal width for this ratio
    pub width: u32,
    /// Nominal height for this ratio
    pub height: u32,
}

impl AspectBucket {
    /// Create a bucket
    #[must_use]
    pub const fn new(label: &'static str, width: u32, height: u32) -> Self {
        Self {
            label,
            width,
            height,
        }
    }

    /// Width divided by height
    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Fallback when a bucket list is empty
pub const SQUARE: AspectBucket = AspectBucket::new("1:1", 1024, 1024);

/// Ratios accepted by the Qwen-Image Space, square first, then wide, then narrow
pub const QWEN_ASPECT_RATIOS: &[AspectBucket] = &[
    SQUARE,
    AspectBucket::new("16:9", 1344, 756),
    AspectBucket::new("3:2", 1248, 832),
    AspectBucket::new("4:3", 1152, 864),
    AspectBucket::new("9:16", 756, 1344),
    AspectBucket::new("2:3", 832, 1248),
    AspectBucket::new("3:4", 864, 1152),
];

/// Ratios accepted by kie.ai Z-Image tasks
pub const KIEAI_ASPECT_RATIOS: &[AspectBucket] = &[
    SQUARE,
    AspectBucket::new("16:9", 1344, 756),
    AspectBucket::new("4:3", 1152, 864),
    AspectBucket::new("9:16", 756, 1344),
    AspectBucket::new("3:4", 864, 1152),
];

/// Resolutions offered by the Z-Image Space
pub const Z_IMAGE_RESOLUTIONS: &[AspectBucket] = &[
    SQUARE,
    AspectBucket::new("3:2", 1248, 832),
    AspectBucket::new("2:3", 832, 1248),
];

/// Resolutions supported by `gpt-image-1.5` on Leonardo
pub const GPT_IMAGE_RESOLUTIONS: &[AspectBucket] = &[
    SQUARE,
    AspectBucket::new("3:2", 1536, 1024),
    AspectBucket::new("2:3", 1024, 1536),
];

fn ratio_of(width: u32, height: u32) -> f64 {
    if height == 0 {
        return 1.0;
    }
    f64::from(width) / f64::from(height)
}

fn nearest(buckets: &[AspectBucket], width: u32, height: u32) -> AspectBucket {
    let ratio = ratio_of(width, height);
    // min_by keeps the first of equally close buckets, which gives list order priority
    buckets
        .iter()
        .min_by(|a, b| {
            (a.ratio() - ratio)
                .abs()
                .total_cmp(&(b.ratio() - ratio).abs())
        })
        .copied()
        .unwrap_or(SQUARE)
}

/// Pick the aspect-ratio label closest to `width / height`
///
/// Ties go to the bucket listed first.
#[must_use]
pub fn nearest_aspect_ratio(buckets: &[AspectBucket], width: u32, height: u32) -> AspectBucket {
    nearest(buckets, width, height)
}

/// Pick the fixed resolution whose ratio is closest to `width / height`
///
/// Returns `(width, height)` of the chosen entry. Ties go to the entry
/// listed first.
#[must_use]
pub fn closest_resolution(options: &[AspectBucket], width: u32, height: u32) -> (u32, u32) {
    let bucket = nearest(options, width, height);
    (bucket.width, bucket.height)
}

/// Clamp into a range, then round down onto an alignment grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampAlign {
    min: u32,
    max: u32,
    align: u32,
}

impl ClampAlign {
    /// Create a mapper; `min` is rounded up and `max` rounded down to the
    /// grid so every output is inside the range
    #[must_use]
    pub const fn new(min: u32, max: u32, align: u32) -> Self {
        let align = if align == 0 { 1 } else { align };
        let min = min.div_ceil(align) * align;
        let max = max / align * align;
        let max = if max < min { min } else { max };
        Self { min, max, align }
    }

    /// Lower bound after alignment
    #[must_use]
    pub const fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound after alignment
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Alignment unit
    #[must_use]
    pub const fn align(&self) -> u32 {
        self.align
    }

    /// Map a single dimension
    #[must_use]
    pub fn apply(&self, value: u32) -> u32 {
        let clamped = value.max(self.min).min(self.max);
        clamped / self.align * self.align
    }

    /// Map a width/height pair
    #[must_use]
    pub fn apply_pair(&self, width: u32, height: u32) -> (u32, u32) {
        (self.apply(width), self.apply(height))
    }
}

/// Seedream models on Leonardo: 256..=1440, multiples of 8
pub const SEEDREAM_DIMENSIONS: ClampAlign = ClampAlign::new(256, 1440, 8);

/// FLUX.2 klein Space: 256..=2048, multiples of 8
pub const FLUX_KLEIN_DIMENSIONS: ClampAlign = ClampAlign::new(256, 2048, 8);
