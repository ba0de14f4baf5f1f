//! Shared types for the paint-by-numbers pipeline.

use serde::{Deserialize, Serialize};

use crate::color::{ClusteringColorSpace, parse_hex_color};
use crate::facet::FacetResult;
use crate::quantize::ColorMap;
use crate::reducer::MergeTarget;

/// Re-export `RgbaImage` so downstream crates can hand decoded images
/// to the pipeline without depending on `image` directly.
pub use image::RgbaImage;

/// An RGB colour triple.
pub type Rgb = [u8; 3];

/// A 2D point in floating-point image coordinates.
///
/// Border paths use *wall space*: a pixel `(x, y)` owns the walls at
/// `x ± 0.5` and `y ± 0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Point halfway between `self` and `other`.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Seed for the clustering PRNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RandomSeed {
    /// Reproducible run: the same seed yields the same palette.
    Fixed(u64),
    /// Non-reproducible run seeded from the current time in milliseconds.
    #[default]
    Time,
}

impl RandomSeed {
    /// Resolve to a concrete seed value.
    #[must_use]
    pub fn resolve(self) -> u64 {
        match self {
            Self::Fixed(seed) => seed,
            Self::Time => web_time::SystemTime::now()
                .duration_since(web_time::UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Configuration for the paint-by-numbers pipeline.
///
/// Every field has a default; a JSON document only needs to carry the
/// keys it wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of k-means clusters (palette size upper bound). At least 2.
    pub kmeans_clusters: usize,

    /// Colour space the clustering distance is measured in.
    pub kmeans_color_space: ClusteringColorSpace,

    /// Clustering stops once the largest centroid displacement of a
    /// step falls below this value.
    pub kmeans_min_delta: f64,

    /// Hard cap on the number of k-means steps.
    pub kmeans_max_iterations: usize,

    /// Optional `#rrggbb` colours every centroid is snapped to.
    pub color_restrictions: Vec<String>,

    /// PRNG seed for centroid initialisation.
    pub random_seed: RandomSeed,

    /// Longest image side before quantization. `None` keeps the
    /// source resolution.
    pub working_resolution: Option<u32>,

    /// Number of narrow pixel strip cleanup passes.
    pub narrow_strip_cleanup_runs: usize,

    /// Facets with fewer pixels than this are merged into a neighbour.
    pub min_facet_size: usize,

    /// Optional cap on the number of facets left after reduction.
    pub max_facet_count: Option<usize>,

    /// Process small facets from the largest to the smallest.
    pub merge_largest_first: bool,

    /// Which neighbour absorbs a facet that is removed.
    pub merge_target: MergeTarget,

    /// Number of Haar halving passes over every border segment.
    pub border_smoothing_iterations: usize,

    /// Keep points lying on the image's outer edge unsmoothed.
    pub preserve_edge_points: bool,
}

impl PipelineConfig {
    /// Default number of clusters.
    pub const DEFAULT_KMEANS_CLUSTERS: usize = 16;
    /// Default convergence threshold.
    pub const DEFAULT_KMEANS_MIN_DELTA: f64 = 1.0;
    /// Default k-means step cap.
    pub const DEFAULT_KMEANS_MAX_ITERATIONS: usize = 100;
    /// Default working resolution.
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 1024;
    /// Default narrow strip cleanup passes.
    pub const DEFAULT_NARROW_STRIP_CLEANUP_RUNS: usize = 3;
    /// Default minimum facet size in pixels.
    pub const DEFAULT_MIN_FACET_SIZE: usize = 20;
    /// Default number of border smoothing passes.
    pub const DEFAULT_BORDER_SMOOTHING_ITERATIONS: usize = 2;

    /// Largest supported cluster count.
    pub const MAX_KMEANS_CLUSTERS: usize = 65_535;

    /// Check every setting against its documented domain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSettings`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.kmeans_clusters < 2 || self.kmeans_clusters > Self::MAX_KMEANS_CLUSTERS {
            return Err(PipelineError::InvalidSettings(format!(
                "kmeans_clusters must be between 2 and {}, got {}",
                Self::MAX_KMEANS_CLUSTERS,
                self.kmeans_clusters,
            )));
        }
        if !self.kmeans_min_delta.is_finite() || self.kmeans_min_delta < 0.0 {
            return Err(PipelineError::InvalidSettings(format!(
                "kmeans_min_delta must be finite and non-negative, got {}",
                self.kmeans_min_delta,
            )));
        }
        if self.kmeans_max_iterations == 0 {
            return Err(PipelineError::InvalidSettings(
                "kmeans_max_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_facet_count == Some(0) {
            return Err(PipelineError::InvalidSettings(
                "max_facet_count must be at least 1 when set".to_string(),
            ));
        }
        if self.working_resolution == Some(0) {
            return Err(PipelineError::InvalidSettings(
                "working_resolution must be at least 1 when set".to_string(),
            ));
        }
        for color in &self.color_restrictions {
            if parse_hex_color(color).is_none() {
                return Err(PipelineError::InvalidSettings(format!(
                    "color restriction {color:?} is not a #rrggbb colour",
                )));
            }
        }
        Ok(())
    }

    /// Parsed colour restrictions. Entries that fail to parse are
    /// skipped; [`validate`](Self::validate) rejects them up front.
    #[must_use]
    pub fn restriction_colors(&self) -> Vec<Rgb> {
        self.color_restrictions
            .iter()
            .filter_map(|c| parse_hex_color(c))
            .collect()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kmeans_clusters: Self::DEFAULT_KMEANS_CLUSTERS,
            kmeans_color_space: ClusteringColorSpace::default(),
            kmeans_min_delta: Self::DEFAULT_KMEANS_MIN_DELTA,
            kmeans_max_iterations: Self::DEFAULT_KMEANS_MAX_ITERATIONS,
            color_restrictions: Vec::new(),
            random_seed: RandomSeed::default(),
            working_resolution: Some(Self::DEFAULT_WORKING_RESOLUTION),
            narrow_strip_cleanup_runs: Self::DEFAULT_NARROW_STRIP_CLEANUP_RUNS,
            min_facet_size: Self::DEFAULT_MIN_FACET_SIZE,
            max_facet_count: None,
            merge_largest_first: true,
            merge_target: MergeTarget::default(),
            border_smoothing_iterations: Self::DEFAULT_BORDER_SMOOTHING_ITERATIONS,
            preserve_edge_points: true,
        }
    }
}

/// Final output of a pipeline run, handed to renderers.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Reduced palette and the per-pixel palette index grid.
    pub color_map: ColorMap,
    /// Facets with traced, smoothed and shared border segments and
    /// label placements.
    pub facets: FacetResult,
    /// Dimensions of the processed (possibly resized) image.
    pub dimensions: Dimensions,
    /// The seed the clustering stage actually used.
    pub seed: u64,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty or the image has no pixels.
    #[error("input image data is empty")]
    EmptyInput,

    /// A setting is outside its documented domain.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Two vectors of different dimensionality were combined.
    #[error("dimension mismatch: expected {expected} components, found {found}")]
    DimensionMismatch {
        /// Dimensionality of the first operand.
        expected: usize,
        /// Dimensionality of the offending operand.
        found: usize,
    },

    /// Averaging was asked for over no vectors at all.
    #[error("cannot average an empty set of vectors")]
    EmptyVectorSet,
}
