//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use pbn_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let result = Pipeline::new(png, PipelineConfig::default())?
//!     .decode()?
//!     .resize()
//!     .quantize()?
//!     .cleanup_strips()
//!     .build_facets()
//!     .reduce()
//!     .trace_borders()
//!     .segment_borders()
//!     .place_labels()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages). Settings are validated and the
//! random seed resolved once, in [`Pipeline::new`], so a run never fails
//! halfway on a bad setting.
//!
//! Stages from [`FacetsBuilt`] onward own the colour map and the facet
//! arena exclusively; each stage mutates them in place and hands them
//! on. The raster images are dropped as soon as the colour map exists.

use std::fmt;

use tracing::debug;

use crate::diagnostics::StageMetrics;
use crate::downsample::{decode, downsample};
use crate::facet::FacetResult;
use crate::labels::{LabelStats, place_labels};
use crate::quantize::{ColorMap, Quantized, create_color_map, narrow_pixel_strip_cleanup, quantize};
use crate::reducer::{ReductionStats, reduce_facets};
use crate::segmenter::{SegmentStats, segment_borders};
use crate::tracer::{TraceStats, trace_borders};
use crate::types::{Dimensions, PipelineConfig, PipelineError, ProcessResult, RgbaImage};

const DECODE: &str = "decode";
const RESIZE: &str = "resize";
const QUANTIZE: &str = "quantize";
const STRIP_CLEANUP: &str = "strip_cleanup";
const BUILD_FACETS: &str = "build_facets";
const REDUCE_FACETS: &str = "reduce_facets";
const TRACE_BORDERS: &str = "trace_borders";
const SEGMENT_BORDERS: &str = "segment_borders";
const PLACE_LABELS: &str = "place_labels";

/// Progress sink: stage name and completed fraction in `[0, 1]`.
type Progress<'p> = Box<dyn FnMut(&str, f64) + 'p>;

/// State shared by every stage: settings, the resolved seed and the
/// progress sink.
struct Context<'p> {
    config: PipelineConfig,
    seed: u64,
    progress: Progress<'p>,
}

impl Context<'_> {
    fn report(&mut self, stage: &str, fraction: f64) {
        (self.progress)(stage, fraction);
    }
}

fn dimensions_of(image: &RgbaImage) -> Dimensions {
    Dimensions {
        width: image.width(),
        height: image.height(),
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image bytes and validated config are stored but not yet
/// touched. Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending<'p> {
    ctx: Context<'p>,
    source: Vec<u8>,
}

impl Pending<'_> {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// The seed clustering will use.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.ctx.seed
    }

    /// Attach a progress callback, invoked with the running stage's
    /// name and a completed fraction.
    pub fn with_progress<'q>(self, progress: impl FnMut(&str, f64) + 'q) -> Pending<'q> {
        Pending {
            ctx: Context {
                config: self.ctx.config,
                seed: self.ctx.seed,
                progress: Box::new(progress),
            },
            source: self.source,
        }
    }
}

impl<'p> Pending<'p> {
    /// Decode the source image and advance to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty. Returns [`PipelineError::ImageDecode`] if the image
    /// format is unrecognized or the data is corrupt.
    pub fn decode(mut self) -> Result<Decoded<'p>, PipelineError> {
        let original = decode(&self.source)?;
        self.ctx.report(DECODE, 1.0);
        Ok(Decoded {
            ctx: self.ctx,
            original,
            source_len: self.source.len(),
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image.
#[must_use = "pipeline stages are consumed by advancing; call .resize() to continue"]
pub struct Decoded<'p> {
    ctx: Context<'p>,
    original: RgbaImage,
    source_len: usize,
}

impl<'p> Decoded<'p> {
    /// The decoded RGBA image.
    #[must_use]
    pub const fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// Shrink to the working resolution and advance to [`Resized`].
    pub fn resize(mut self) -> Resized<'p> {
        let (image, applied) = downsample(&self.original, self.ctx.config.working_resolution);
        self.ctx.report(RESIZE, 1.0);
        Resized {
            ctx: self.ctx,
            original_size: dimensions_of(&self.original),
            image,
            applied,
        }
    }
}

// ───────────────────────── Stage 2: Resized ──────────────────────────

/// Pipeline state after resizing to the working resolution.
#[must_use = "pipeline stages are consumed by advancing; call .quantize() to continue"]
pub struct Resized<'p> {
    ctx: Context<'p>,
    original_size: Dimensions,
    image: RgbaImage,
    applied: bool,
}

impl<'p> Resized<'p> {
    /// The image every later stage works on.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether the image was actually shrunk.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Cluster the image's colours, recolour it and build the colour
    /// map. Advances to [`Clustered`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] for an image without
    /// pixels and propagates vector errors from clustering.
    pub fn quantize(self) -> Result<Clustered<'p>, PipelineError> {
        let mut ctx = self.ctx;
        let dimensions = dimensions_of(&self.image);
        let quantized = {
            let Context {
                config,
                seed,
                progress,
            } = &mut ctx;
            quantize(&self.image, config, *seed, &mut |f| progress(QUANTIZE, f))?
        };
        let color_map = create_color_map(&quantized.pixels);
        ctx.report(QUANTIZE, 1.0);
        Ok(Clustered {
            ctx,
            dimensions,
            quantized,
            color_map,
        })
    }
}

// ───────────────────────── Stage 3: Clustered ────────────────────────

/// Pipeline state after colour clustering.
#[must_use = "pipeline stages are consumed by advancing; call .cleanup_strips() to continue"]
pub struct Clustered<'p> {
    ctx: Context<'p>,
    dimensions: Dimensions,
    quantized: Quantized,
    color_map: ColorMap,
}

impl<'p> Clustered<'p> {
    /// Clustering outcome, including the recoloured pixels.
    #[must_use]
    pub const fn quantized(&self) -> &Quantized {
        &self.quantized
    }

    /// Palette and per-pixel palette indices.
    #[must_use]
    pub const fn color_map(&self) -> &ColorMap {
        &self.color_map
    }

    /// Remove one-pixel-wide strips and advance to [`Cleaned`].
    pub fn cleanup_strips(mut self) -> Cleaned<'p> {
        let runs = self.ctx.config.narrow_strip_cleanup_runs;
        let changed = narrow_pixel_strip_cleanup(&mut self.color_map, runs);
        self.ctx.report(STRIP_CLEANUP, 1.0);
        Cleaned {
            ctx: self.ctx,
            dimensions: self.dimensions,
            color_map: self.color_map,
            changed,
        }
    }
}

// ───────────────────────── Stage 4: Cleaned ──────────────────────────

/// Pipeline state after narrow strip cleanup.
#[must_use = "pipeline stages are consumed by advancing; call .build_facets() to continue"]
pub struct Cleaned<'p> {
    ctx: Context<'p>,
    dimensions: Dimensions,
    color_map: ColorMap,
    changed: usize,
}

impl<'p> Cleaned<'p> {
    /// Palette and per-pixel palette indices after cleanup.
    #[must_use]
    pub const fn color_map(&self) -> &ColorMap {
        &self.color_map
    }

    /// Pixels recoloured by the cleanup.
    #[must_use]
    pub const fn changed(&self) -> usize {
        self.changed
    }

    /// Flood-fill the colour map into facets. Advances to
    /// [`FacetsBuilt`].
    pub fn build_facets(self) -> FacetsBuilt<'p> {
        let mut ctx = self.ctx;
        let progress = &mut ctx.progress;
        let facets = crate::builder::build_facets(&self.color_map, &mut |f| {
            progress(BUILD_FACETS, f);
        });
        FacetsBuilt {
            work: Working {
                ctx,
                dimensions: self.dimensions,
                color_map: self.color_map,
                facets,
            },
        }
    }
}

// ──────────────────── Stages 5-9: facet stages ───────────────────────

/// Everything the facet stages hand on to each other.
struct Working<'p> {
    ctx: Context<'p>,
    dimensions: Dimensions,
    color_map: ColorMap,
    facets: FacetResult,
}

/// Read access shared by every facet stage.
macro_rules! facet_accessors {
    ($($stage:ident),* $(,)?) => {
        $(
            impl $stage<'_> {
                /// Palette and per-pixel palette indices.
                #[must_use]
                pub const fn color_map(&self) -> &ColorMap {
                    &self.work.color_map
                }

                /// The facet arena.
                #[must_use]
                pub const fn facets(&self) -> &FacetResult {
                    &self.work.facets
                }

                /// Working image dimensions.
                #[must_use]
                pub const fn dimensions(&self) -> Dimensions {
                    self.work.dimensions
                }
            }
        )*
    };
}

facet_accessors!(FacetsBuilt, Reduced, Traced, Segmented, Labeled);

/// Pipeline state after facet discovery.
#[must_use = "pipeline stages are consumed by advancing; call .reduce() to continue"]
pub struct FacetsBuilt<'p> {
    work: Working<'p>,
}

impl<'p> FacetsBuilt<'p> {
    /// Merge small facets and enforce the facet cap. Advances to
    /// [`Reduced`].
    pub fn reduce(self) -> Reduced<'p> {
        let mut work = self.work;
        let stats = {
            let Working {
                ctx,
                color_map,
                facets,
                ..
            } = &mut work;
            let Context {
                config, progress, ..
            } = ctx;
            reduce_facets(facets, color_map, config, &mut |f| {
                progress(REDUCE_FACETS, f);
            })
        };
        Reduced { work, stats }
    }
}

/// Pipeline state after facet reduction.
#[must_use = "pipeline stages are consumed by advancing; call .trace_borders() to continue"]
pub struct Reduced<'p> {
    work: Working<'p>,
    stats: ReductionStats,
}

impl<'p> Reduced<'p> {
    /// Reduction counts.
    #[must_use]
    pub const fn stats(&self) -> ReductionStats {
        self.stats
    }

    /// Trace every facet's outer border. Advances to [`Traced`].
    pub fn trace_borders(self) -> Traced<'p> {
        let mut work = self.work;
        let progress = &mut work.ctx.progress;
        let stats = trace_borders(&mut work.facets, &mut |f| progress(TRACE_BORDERS, f));
        Traced { work, stats }
    }
}

/// Pipeline state after border tracing.
#[must_use = "pipeline stages are consumed by advancing; call .segment_borders() to continue"]
pub struct Traced<'p> {
    work: Working<'p>,
    stats: TraceStats,
}

impl<'p> Traced<'p> {
    /// Tracing counts.
    #[must_use]
    pub const fn stats(&self) -> TraceStats {
        self.stats
    }

    /// Split, smooth and match the traced borders. Advances to
    /// [`Segmented`].
    pub fn segment_borders(self) -> Segmented<'p> {
        let mut work = self.work;
        let iterations = work.ctx.config.border_smoothing_iterations;
        let preserve = work.ctx.config.preserve_edge_points;
        let progress = &mut work.ctx.progress;
        let stats = segment_borders(&mut work.facets, iterations, preserve, &mut |f| {
            progress(SEGMENT_BORDERS, f);
        });
        Segmented { work, stats }
    }
}

/// Pipeline state after segmentation.
#[must_use = "pipeline stages are consumed by advancing; call .place_labels() to continue"]
pub struct Segmented<'p> {
    work: Working<'p>,
    stats: SegmentStats,
}

impl<'p> Segmented<'p> {
    /// Segmentation counts.
    #[must_use]
    pub const fn stats(&self) -> SegmentStats {
        self.stats
    }

    /// Choose a label anchor for every facet. Advances to [`Labeled`].
    pub fn place_labels(self) -> Labeled<'p> {
        let mut work = self.work;
        let progress = &mut work.ctx.progress;
        let stats = place_labels(&mut work.facets, &mut |f| progress(PLACE_LABELS, f));
        Labeled { work, stats }
    }
}

/// Final pipeline state.
pub struct Labeled<'p> {
    work: Working<'p>,
    stats: LabelStats,
}

impl Labeled<'_> {
    /// Label counts.
    #[must_use]
    pub const fn stats(&self) -> LabelStats {
        self.stats
    }

    /// Consume the pipeline and return the renderer-facing result.
    #[must_use]
    pub fn into_result(self) -> ProcessResult {
        ProcessResult {
            color_map: self.work.color_map,
            facets: self.work.facets,
            dimensions: self.work.dimensions,
            seed: self.work.ctx.seed,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 10;

/// The output produced by a single pipeline stage.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Decoded RGBA image.
    Decoded {
        /// The original image.
        original: &'a RgbaImage,
    },
    /// Image at working resolution.
    Resized {
        /// The working image.
        image: &'a RgbaImage,
    },
    /// Palette and colour-index grid, before or after strip cleanup.
    ColorMap {
        /// The colour map.
        color_map: &'a ColorMap,
    },
    /// Facet arena plus the colour map it was built from.
    Facets {
        /// The colour map.
        color_map: &'a ColorMap,
        /// The facets.
        facets: &'a FacetResult,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Each stage struct implements it and [`Stage`] delegates to whichever
/// variant it holds.
///
/// ```rust
/// # use pbn_pipeline::{Pipeline, PipelineConfig, PipelineError};
/// # use pbn_pipeline::pipeline::{Stage, Advance};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, PipelineConfig::default())?.into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage<'p>: Sized {
    /// Name of the stage, as passed to the progress callback.
    const NAME: &'static str;

    /// Zero-based index of this stage (`0` for Pending through `9` for
    /// Labeled).
    const INDEX: usize;

    /// [`NAME`](Self::NAME) through a value, for uniform dispatch.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// [`INDEX`](Self::INDEX) through a value.
    fn index(&self) -> usize {
        Self::INDEX
    }

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` only for [`Pending`], which has done no work.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage, or hand back the final stage
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when decoding or clustering fails.
    fn advance(self) -> Result<Advance<'p>, PipelineError>;

    /// Run all remaining stages and return the final result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<ProcessResult, PipelineError>;
}

impl<'p> PipelineStage<'p> for Pending<'p> {
    const NAME: &'static str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.decode()?.into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.decode()?.complete()
    }
}

impl<'p> PipelineStage<'p> for Decoded<'p> {
    const NAME: &'static str = DECODE;
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Decoded {
            original: &self.original,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.original.width(),
            height: self.original.height(),
            pixel_count: u64::from(self.original.width()) * u64::from(self.original.height()),
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.resize().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.resize().complete()
    }
}

impl<'p> PipelineStage<'p> for Resized<'p> {
    const NAME: &'static str = RESIZE;
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Resized { image: &self.image }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Resize {
            original_width: self.original_size.width,
            original_height: self.original_size.height,
            width: self.image.width(),
            height: self.image.height(),
            max_dimension: self.ctx.config.working_resolution,
            applied: self.applied,
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.quantize()?.into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.quantize()?.complete()
    }
}

impl<'p> PipelineStage<'p> for Clustered<'p> {
    const NAME: &'static str = QUANTIZE;
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::ColorMap {
            color_map: &self.color_map,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Quantize {
            color_space: self.ctx.config.kmeans_color_space.to_string(),
            clusters: self.ctx.config.kmeans_clusters,
            distinct_colors: self.quantized.distinct_colors,
            iterations: self.quantized.iterations,
            delta: self.quantized.delta,
            palette_size: self.color_map.palette.len(),
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.cleanup_strips().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.cleanup_strips().complete()
    }
}

impl<'p> PipelineStage<'p> for Cleaned<'p> {
    const NAME: &'static str = STRIP_CLEANUP;
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::ColorMap {
            color_map: &self.color_map,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::StripCleanup {
            runs: self.ctx.config.narrow_strip_cleanup_runs,
            changed_pixels: self.changed,
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.build_facets().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.build_facets().complete()
    }
}

impl<'p> PipelineStage<'p> for FacetsBuilt<'p> {
    const NAME: &'static str = BUILD_FACETS;
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        facets_output(&self.work)
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let facets = &self.work.facets;
        let links: usize = facets.live_facets().map(|f| f.neighbours.len()).sum();
        Some(StageMetrics::FacetBuild {
            facet_count: facets.live_count(),
            neighbour_pairs: links / 2,
            largest_facet: facets.live_facets().map(|f| f.point_count).max().unwrap_or(0),
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.reduce().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.reduce().complete()
    }
}

impl<'p> PipelineStage<'p> for Reduced<'p> {
    const NAME: &'static str = REDUCE_FACETS;
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        facets_output(&self.work)
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let config = &self.work.ctx.config;
        Some(StageMetrics::Reduce {
            min_facet_size: config.min_facet_size,
            max_facet_count: config.max_facet_count,
            facets_before: self.stats.facets_before,
            facets_after: self.stats.facets_after,
            removed_small: self.stats.removed_small,
            removed_for_cap: self.stats.removed_for_cap,
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.trace_borders().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.trace_borders().complete()
    }
}

impl<'p> PipelineStage<'p> for Traced<'p> {
    const NAME: &'static str = TRACE_BORDERS;
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        facets_output(&self.work)
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Trace {
            traced: self.stats.traced,
            skipped: self.stats.skipped,
            total_points: self.stats.total_points,
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.segment_borders().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.segment_borders().complete()
    }
}

impl<'p> PipelineStage<'p> for Segmented<'p> {
    const NAME: &'static str = SEGMENT_BORDERS;
    const INDEX: usize = 8;

    fn output(&self) -> StageOutput<'_> {
        facets_output(&self.work)
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Segment {
            smoothing_iterations: self.work.ctx.config.border_smoothing_iterations,
            segments: self.stats.segments,
            matched: self.stats.matched,
            points_before: self.stats.points_before,
            points_after: self.stats.points_after,
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Next(self.place_labels().into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        self.place_labels().complete()
    }
}

impl<'p> PipelineStage<'p> for Labeled<'p> {
    const NAME: &'static str = PLACE_LABELS;
    const INDEX: usize = 9;

    fn output(&self) -> StageOutput<'_> {
        facets_output(&self.work)
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Label {
            labeled: self.stats.labeled,
            unplottable: self.stats.unplottable,
            holes: self.stats.holes,
        })
    }

    fn advance(self) -> Result<Advance<'p>, PipelineError> {
        Ok(Advance::Complete(self.into()))
    }

    fn complete(self) -> Result<ProcessResult, PipelineError> {
        Ok(self.into_result())
    }
}

fn facets_output<'a>(work: &'a Working<'_>) -> StageOutput<'a> {
    StageOutput::Facets {
        color_map: &work.color_map,
        facets: &work.facets,
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
#[must_use]
pub enum Stage<'p> {
    /// See [`Pending`].
    Pending(Pending<'p>),
    /// See [`Decoded`].
    Decoded(Decoded<'p>),
    /// See [`Resized`].
    Resized(Resized<'p>),
    /// See [`Clustered`].
    Clustered(Clustered<'p>),
    /// See [`Cleaned`].
    Cleaned(Cleaned<'p>),
    /// See [`FacetsBuilt`].
    FacetsBuilt(FacetsBuilt<'p>),
    /// See [`Reduced`].
    Reduced(Reduced<'p>),
    /// See [`Traced`].
    Traced(Traced<'p>),
    /// See [`Segmented`].
    Segmented(Segmented<'p>),
    /// See [`Labeled`].
    Labeled(Labeled<'p>),
}

/// Compile-time guard: if a [`Stage`] variant is added, this match becomes
/// non-exhaustive and the build fails, prompting a [`STAGE_COUNT`] bump.
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage<'_>) {
    match s {
        Stage::Pending(_)
        | Stage::Decoded(_)
        | Stage::Resized(_)
        | Stage::Clustered(_)
        | Stage::Cleaned(_)
        | Stage::FacetsBuilt(_)
        | Stage::Reduced(_)
        | Stage::Traced(_)
        | Stage::Segmented(_)
        | Stage::Labeled(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance<'p> {
    /// The pipeline advanced to this next stage.
    Next(Stage<'p>),
    /// The pipeline was already at the final stage.
    Complete(Stage<'p>),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Decoded(s) => s.$method($($arg),*),
            Self::Resized(s) => s.$method($($arg),*),
            Self::Clustered(s) => s.$method($($arg),*),
            Self::Cleaned(s) => s.$method($($arg),*),
            Self::FacetsBuilt(s) => s.$method($($arg),*),
            Self::Reduced(s) => s.$method($($arg),*),
            Self::Traced(s) => s.$method($($arg),*),
            Self::Segmented(s) => s.$method($($arg),*),
            Self::Labeled(s) => s.$method($($arg),*),
        }
    };
}

impl<'p> Stage<'p> {
    /// Name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Labeled(_))
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance<'p>, PipelineError> {
        delegate!(self, advance)
    }

    /// Advance to the next stage, or `None` if already complete (the
    /// final stage is consumed).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        Ok(match self.advance()? {
            Advance::Next(stage) => Some(stage),
            Advance::Complete(_) => None,
        })
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<ProcessResult, PipelineError> {
        delegate!(self, complete)
    }
}

/// Writes the stage name, the same string the progress callback gets.
impl fmt::Display for Stage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! stage_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl<'p> From<$variant<'p>> for Stage<'p> {
                fn from(s: $variant<'p>) -> Self {
                    Self::$variant(s)
                }
            }
        )*
    };
}

stage_from!(
    Pending,
    Decoded,
    Resized,
    Clustered,
    Cleaned,
    FacetsBuilt,
    Reduced,
    Traced,
    Segmented,
    Labeled,
);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental paint-by-numbers pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Validate `config`, resolve the random seed and store the source
    /// bytes. No image processing is performed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSettings`] if any setting is
    /// outside its domain.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Result<Pending<'static>, PipelineError> {
        let ctx = context(config)?;
        Ok(Pending {
            ctx,
            source: image_bytes,
        })
    }

    /// Start from an already decoded image, skipping the decode stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSettings`] for bad settings and
    /// [`PipelineError::EmptyInput`] for an image without pixels.
    pub fn from_rgba(image: RgbaImage, config: PipelineConfig) -> Result<Decoded<'static>, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::EmptyInput);
        }
        let ctx = context(config)?;
        Ok(Decoded {
            ctx,
            original: image,
            source_len: 0,
        })
    }
}

impl<'p> Decoded<'p> {
    /// Attach a progress callback, invoked with the running stage's
    /// name and a completed fraction.
    pub fn with_progress<'q>(self, progress: impl FnMut(&str, f64) + 'q) -> Decoded<'q> {
        Decoded {
            ctx: Context {
                config: self.ctx.config,
                seed: self.ctx.seed,
                progress: Box::new(progress),
            },
            original: self.original,
            source_len: self.source_len,
        }
    }
}

fn context(config: PipelineConfig) -> Result<Context<'static>, PipelineError> {
    config.validate()?;
    let seed = config.random_seed.resolve();
    debug!(seed, clusters = config.kmeans_clusters, "pipeline configured");
    Ok(Context {
        config,
        seed,
        progress: Box::new(|_, _| {}),
    })
}
