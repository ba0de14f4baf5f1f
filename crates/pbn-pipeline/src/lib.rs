//! pbn-pipeline: Pure paint-by-numbers facet pipeline (sans-IO).
//!
//! Converts a raster image into a reduced palette, a partition of the
//! image into same-colour facets, smoothed facet outlines and label
//! anchors through:
//! decode -> resize -> k-means quantize -> strip cleanup ->
//! facet building -> facet reduction -> border tracing ->
//! border segmentation -> label placement.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! byte slices and images and returns structured data. Rendering lives
//! in `pbn-export`; reading files lives in the bench binary.

pub mod builder;
pub mod color;
pub mod diagnostics;
pub mod downsample;
pub mod facet;
pub mod flood_fill;
pub mod geom;
pub mod grid;
pub mod kmeans;
pub mod labels;
pub mod pipeline;
pub mod polylabel;
pub mod quantize;
pub mod reducer;
pub mod segmenter;
pub mod tracer;
pub mod types;
pub mod vector;

pub use color::ClusteringColorSpace;
pub use diagnostics::process_with_diagnostics;
pub use facet::{Facet, FacetBoundarySegment, FacetResult, Neighbour, Orientation, PathPoint, PathSegment};
pub use geom::{BoundingBox, PixelPoint};
pub use grid::Grid;
pub use labels::LabelPlacement;
pub use pipeline::{Pipeline, PipelineStage};
pub use quantize::ColorMap;
pub use reducer::MergeTarget;
pub use types::{
    Dimensions, PipelineConfig, PipelineError, Point, ProcessResult, RandomSeed, Rgb, RgbaImage,
};

/// Run the full pipeline on encoded image bytes.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration,
/// then produces a [`ProcessResult`] holding the palette, the colour
/// index grid and the labelled facets with their shared border
/// segments.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSettings`] if the configuration is
/// out of range, [`PipelineError::EmptyInput`] if `image_bytes` is
/// empty, and [`PipelineError::ImageDecode`] if the image format is
/// unrecognized.
pub fn process(image_bytes: &[u8], config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    Pipeline::new(image_bytes.to_vec(), config.clone())?.complete()
}

/// Run the pipeline on an already decoded image, reporting progress.
///
/// `progress` receives each stage's name and completed fraction.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSettings`] for a bad configuration
/// and [`PipelineError::EmptyInput`] for an image without pixels.
pub fn process_image(
    image: &RgbaImage,
    config: &PipelineConfig,
    progress: &mut dyn FnMut(&str, f64),
) -> Result<ProcessResult, PipelineError> {
    Pipeline::from_rgba(image.clone(), config.clone())?
        .with_progress(progress)
        .complete()
}
