//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation for tuning the
//! clustering and facet-reduction settings. Every call to
//! [`process_with_diagnostics`] collects them alongside the pipeline
//! result.
//!
//! Time is read through the [`Clock`] trait so the core never touches a
//! platform clock itself; the bench binary supplies one backed by
//! [`std::time::Instant`].
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{PipelineConfig, PipelineError, ProcessResult};

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run, one entry per
/// stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Image decoding.
    pub decode: StageDiagnostics,
    /// Resize to working resolution.
    pub resize: StageDiagnostics,
    /// K-means colour clustering and colour-map construction.
    pub quantize: StageDiagnostics,
    /// Narrow pixel strip cleanup.
    pub strip_cleanup: StageDiagnostics,
    /// Flood-fill facet discovery and adjacency.
    pub build_facets: StageDiagnostics,
    /// Small-facet merging and facet cap.
    pub reduce_facets: StageDiagnostics,
    /// Wall-following border tracing.
    pub trace_borders: StageDiagnostics,
    /// Segment split, smoothing and matching.
    pub segment_borders: StageDiagnostics,
    /// Label anchor search.
    pub place_labels: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: Option<StageMetrics>,
}

impl StageDiagnostics {
    fn of<'p, S: PipelineStage<'p>>(stage: &S, duration: Duration) -> Self {
        Self {
            duration,
            metrics: stage.metrics(),
        }
    }
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Working-resolution resize metrics.
    Resize {
        /// Width before resizing.
        original_width: u32,
        /// Height before resizing.
        original_height: u32,
        /// Width after resizing.
        width: u32,
        /// Height after resizing.
        height: u32,
        /// Configured longest-side limit, if any.
        max_dimension: Option<u32>,
        /// Whether the image was actually resized.
        applied: bool,
    },
    /// Colour clustering metrics.
    Quantize {
        /// Colour space k-means ran in.
        color_space: String,
        /// Requested cluster count.
        clusters: usize,
        /// Distinct chopped colours fed to k-means.
        distinct_colors: usize,
        /// K-means steps run.
        iterations: usize,
        /// Largest centroid displacement of the final step.
        delta: f64,
        /// Distinct colours left after recolouring.
        palette_size: usize,
    },
    /// Narrow pixel strip cleanup metrics.
    StripCleanup {
        /// Configured number of passes.
        runs: usize,
        /// Pixels recoloured over all passes.
        changed_pixels: usize,
    },
    /// Facet discovery metrics.
    FacetBuild {
        /// Facets found.
        facet_count: usize,
        /// Unordered adjacent facet pairs.
        neighbour_pairs: usize,
        /// Pixels in the largest facet.
        largest_facet: usize,
    },
    /// Facet reduction metrics.
    Reduce {
        /// Size threshold in pixels.
        min_facet_size: usize,
        /// Facet cap, if any.
        max_facet_count: Option<usize>,
        /// Live facets before reduction.
        facets_before: usize,
        /// Live facets after reduction.
        facets_after: usize,
        /// Facets removed for being too small.
        removed_small: usize,
        /// Facets removed to honour the cap.
        removed_for_cap: usize,
    },
    /// Border tracing metrics.
    Trace {
        /// Facets with a traced border.
        traced: usize,
        /// Facets skipped without a border.
        skipped: usize,
        /// Border points over all facets.
        total_points: usize,
    },
    /// Segmentation metrics.
    Segment {
        /// Haar passes applied per segment.
        smoothing_iterations: usize,
        /// Canonical segments stored.
        segments: usize,
        /// Shared borders matched between two facets.
        matched: usize,
        /// Points before smoothing.
        points_before: usize,
        /// Points after smoothing.
        points_after: usize,
    },
    /// Label placement metrics.
    Label {
        /// Facets with a plottable label.
        labeled: usize,
        /// Facets without a usable label point.
        unplottable: usize,
        /// Enclosed neighbours treated as holes.
        holes: usize,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Working image width in pixels.
    pub image_width: u32,
    /// Working image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Seed the clustering PRNG used.
    pub seed: u64,
    /// Final palette size.
    pub palette_size: usize,
    /// Live facets in the output.
    pub facet_count: usize,
    /// Canonical border segments in the output.
    pub segment_count: usize,
    /// Facets with a plottable label.
    pub labeled: usize,
}

impl PipelineDiagnostics {
    /// Stage names paired with their diagnostics, in execution order.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 9] {
        [
            ("Decode", &self.decode),
            ("Resize", &self.resize),
            ("Quantize", &self.quantize),
            ("Strip Cleanup", &self.strip_cleanup),
            ("Build Facets", &self.build_facets),
            ("Reduce Facets", &self.reduce_facets),
            ("Trace Borders", &self.trace_borders),
            ("Segment Borders", &self.segment_borders),
            ("Place Labels", &self.place_labels),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)  seed={}",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.pixel_count,
            self.summary.seed,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = diag.metrics.as_ref().map_or_else(String::new, format_metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Palette: {}  |  Facets: {}  |  Segments: {}  |  Labels: {}",
            self.summary.palette_size,
            self.summary.facet_count,
            self.summary.segment_count,
            self.summary.labeled,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Resize {
            original_width,
            original_height,
            width,
            height,
            applied,
            ..
        } => {
            if *applied {
                format!("{original_width}x{original_height} -> {width}x{height}")
            } else {
                format!("{width}x{height} (unchanged)")
            }
        }
        StageMetrics::Quantize {
            color_space,
            clusters,
            distinct_colors,
            iterations,
            delta,
            palette_size,
        } => format!(
            "{color_space} k={clusters} {distinct_colors} colours -> {palette_size} in {iterations} steps (delta={delta:.3})",
        ),
        StageMetrics::StripCleanup {
            runs,
            changed_pixels,
        } => format!("{runs} runs, {changed_pixels} px changed"),
        StageMetrics::FacetBuild {
            facet_count,
            neighbour_pairs,
            largest_facet,
        } => format!("{facet_count} facets, {neighbour_pairs} adjacencies, largest={largest_facet}px"),
        StageMetrics::Reduce {
            min_facet_size,
            facets_before,
            facets_after,
            removed_small,
            removed_for_cap,
            ..
        } => format!(
            "min={min_facet_size} {facets_before}->{facets_after} facets (small={removed_small} cap={removed_for_cap})",
        ),
        StageMetrics::Trace {
            traced,
            skipped,
            total_points,
        } => format!("{traced} borders, {total_points} pts, {skipped} skipped"),
        StageMetrics::Segment {
            smoothing_iterations,
            segments,
            matched,
            points_before,
            points_after,
        } => format!(
            "{segments} segments ({matched} shared), haar x{smoothing_iterations} {points_before}->{points_after} pts",
        ),
        StageMetrics::Label {
            labeled,
            unplottable,
            holes,
        } => format!("{labeled} labels, {unplottable} unplottable, {holes} holes"),
    }
}

fn measure<C: Clock, S>(
    clock: &C,
    run: impl FnOnce() -> Result<S, PipelineError>,
) -> Result<(S, Duration), PipelineError> {
    let start = clock.now();
    let stage = run()?;
    Ok((stage, clock.elapsed(&start)))
}

/// Run the full pipeline, timing every stage.
///
/// # Errors
///
/// Returns the same errors as [`crate::process`].
pub fn process_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
    progress: &mut dyn FnMut(&str, f64),
) -> Result<(ProcessResult, PipelineDiagnostics), PipelineError> {
    let start = clock.now();
    let pending = Pipeline::new(image_bytes.to_vec(), config.clone())?.with_progress(progress);

    let (decoded, t) = measure(clock, || pending.decode())?;
    let decode = StageDiagnostics::of(&decoded, t);
    let (resized, t) = measure(clock, || Ok(decoded.resize()))?;
    let resize = StageDiagnostics::of(&resized, t);
    let (clustered, t) = measure(clock, || resized.quantize())?;
    let quantize = StageDiagnostics::of(&clustered, t);
    let (cleaned, t) = measure(clock, || Ok(clustered.cleanup_strips()))?;
    let strip_cleanup = StageDiagnostics::of(&cleaned, t);
    let (built, t) = measure(clock, || Ok(cleaned.build_facets()))?;
    let build_facets = StageDiagnostics::of(&built, t);
    let (reduced, t) = measure(clock, || Ok(built.reduce()))?;
    let reduce_facets = StageDiagnostics::of(&reduced, t);
    let (traced, t) = measure(clock, || Ok(reduced.trace_borders()))?;
    let trace_borders = StageDiagnostics::of(&traced, t);
    let (segmented, t) = measure(clock, || Ok(traced.segment_borders()))?;
    let segment_borders = StageDiagnostics::of(&segmented, t);
    let (labeled, t) = measure(clock, || Ok(segmented.place_labels()))?;
    let place_labels = StageDiagnostics::of(&labeled, t);

    let result = labeled.into_result();
    let total_duration = clock.elapsed(&start);

    let summary = PipelineSummary {
        image_width: result.dimensions.width,
        image_height: result.dimensions.height,
        pixel_count: u64::from(result.dimensions.width) * u64::from(result.dimensions.height),
        seed: result.seed,
        palette_size: result.color_map.palette.len(),
        facet_count: result.facets.live_count(),
        segment_count: result.facets.segments.len(),
        labeled: result
            .facets
            .live_facets()
            .filter(|f| f.label.is_some_and(|l| l.is_plottable()))
            .count(),
    };

    let diagnostics = PipelineDiagnostics {
        decode,
        resize,
        quantize,
        strip_cleanup,
        build_facets,
        reduce_facets,
        trace_borders,
        segment_borders,
        place_labels,
        total_duration,
        summary,
    };
    Ok((result, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RandomSeed;

    /// Every reading is one millisecond after the previous one.
    struct StepClock;

    impl Clock for StepClock {
        type Instant = ();

        fn now(&self) {}

        fn elapsed(&self, _since: &()) -> Duration {
            Duration::from_millis(1)
        }
    }

    fn stage(metrics: StageMetrics) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(2),
            metrics: Some(metrics),
        }
    }

    fn two_tone_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(12, 8, |x, _| {
            if x < 6 {
                image::Rgba([200, 20, 20, 255])
            } else {
                image::Rgba([20, 20, 200, 255])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    fn sample() -> PipelineDiagnostics {
        PipelineDiagnostics {
            decode: stage(StageMetrics::Decode {
                input_bytes: 1000,
                width: 100,
                height: 80,
                pixel_count: 8000,
            }),
            resize: stage(StageMetrics::Resize {
                original_width: 100,
                original_height: 80,
                width: 100,
                height: 80,
                max_dimension: Some(1024),
                applied: false,
            }),
            quantize: stage(StageMetrics::Quantize {
                color_space: "Lab".to_string(),
                clusters: 8,
                distinct_colors: 300,
                iterations: 12,
                delta: 0.4,
                palette_size: 8,
            }),
            strip_cleanup: stage(StageMetrics::StripCleanup {
                runs: 3,
                changed_pixels: 41,
            }),
            build_facets: stage(StageMetrics::FacetBuild {
                facet_count: 120,
                neighbour_pairs: 300,
                largest_facet: 2000,
            }),
            reduce_facets: stage(StageMetrics::Reduce {
                min_facet_size: 20,
                max_facet_count: None,
                facets_before: 120,
                facets_after: 35,
                removed_small: 85,
                removed_for_cap: 0,
            }),
            trace_borders: stage(StageMetrics::Trace {
                traced: 35,
                skipped: 0,
                total_points: 4000,
            }),
            segment_borders: stage(StageMetrics::Segment {
                smoothing_iterations: 2,
                segments: 90,
                matched: 70,
                points_before: 4000,
                points_after: 1100,
            }),
            place_labels: stage(StageMetrics::Label {
                labeled: 34,
                unplottable: 1,
                holes: 3,
            }),
            total_duration: Duration::from_millis(18),
            summary: PipelineSummary {
                image_width: 100,
                image_height: 80,
                pixel_count: 8000,
                seed: 7,
                palette_size: 8,
                facet_count: 35,
                segment_count: 90,
                labeled: 34,
            },
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn report_lists_every_stage() {
        let report = sample().report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        for (name, _) in sample().stages() {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("120->35 facets"));
        assert!(report.contains("seed=7"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        let total = json["total_duration"].as_f64().unwrap();
        assert!((total - 0.018).abs() < 1e-9);
        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_duration, Duration::from_millis(18));
        assert_eq!(back.quantize.metrics, sample().quantize.metrics);
    }

    #[test]
    fn negative_duration_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<PipelineDiagnostics>(json).is_err());
    }

    #[test]
    fn process_with_diagnostics_times_every_stage() {
        let config = PipelineConfig {
            kmeans_clusters: 2,
            min_facet_size: 1,
            random_seed: RandomSeed::Fixed(3),
            ..PipelineConfig::default()
        };
        let mut names = Vec::new();
        let (result, diag) =
            process_with_diagnostics(&two_tone_png(), &config, &StepClock, &mut |name, _| {
                if names.last().is_none_or(|last: &String| last != name) {
                    names.push(name.to_string());
                }
            })
            .unwrap();

        assert_eq!(diag.total_duration, Duration::from_millis(1));
        assert!(diag.stages().iter().all(|(_, s)| s.metrics.is_some()));
        assert_eq!(diag.summary.seed, 3);
        assert_eq!(diag.summary.facet_count, result.facets.live_count());
        assert_eq!(diag.summary.facet_count, 2);
        assert!(names.contains(&"quantize".to_string()));
        assert!(names.contains(&"place_labels".to_string()));
    }
}
