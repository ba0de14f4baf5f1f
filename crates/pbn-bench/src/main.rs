//! pbn-bench: CLI tool for paint-by-numbers parameter experimentation
//! and diagnostics.
//!
//! Runs the facet pipeline on a given image file with configurable
//! parameters, printing detailed per-stage diagnostics. Useful for:
//!
//! - Comparing clustering colour spaces and merge policies
//! - Tuning cluster count, minimum facet size and smoothing passes
//! - Measuring per-stage durations to identify bottlenecks
//! - Seeing how parameter changes affect palette, facet and segment counts
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin pbn-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser, ValueEnum};
use pbn_export::{SvgMetadata, SvgOptions};
use pbn_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use pbn_pipeline::{ClusteringColorSpace, MergeTarget, PipelineConfig, ProcessResult, RandomSeed};
use tracing::{debug, info, trace};
use tracing_subscriber::EnvFilter;

/// Paint-by-numbers pipeline experimentation and diagnostics.
///
/// Runs the facet pipeline on a given image with configurable
/// parameters and prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "pbn-bench", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Number of k-means clusters.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_KMEANS_CLUSTERS)]
    clusters: usize,

    /// Colour space k-means measures distance in.
    #[arg(long, value_enum, default_value_t = Space::Rgb)]
    color_space: Space,

    /// Stop clustering once centroids move less than this.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_KMEANS_MIN_DELTA)]
    min_delta: f64,

    /// Hard cap on k-means steps.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_KMEANS_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Snap every palette colour to one of these `#rrggbb` colours
    /// (repeatable).
    #[arg(long = "restrict", value_name = "COLOR")]
    restrictions: Vec<String>,

    /// Fixed PRNG seed. Without it every run is seeded from the clock.
    #[arg(long)]
    seed: Option<u64>,

    /// Working resolution (max dimension in pixels after downsampling).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: u32,

    /// Keep the source resolution.
    #[arg(long)]
    no_resize: bool,

    /// Narrow pixel strip cleanup passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_NARROW_STRIP_CLEANUP_RUNS)]
    strip_cleanup_runs: usize,

    /// Facets smaller than this many pixels are merged away.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_FACET_SIZE)]
    min_facet_size: usize,

    /// Keep at most this many facets.
    #[arg(long)]
    max_facets: Option<usize>,

    /// Merge small facets starting from the smallest.
    #[arg(long)]
    smallest_first: bool,

    /// Which neighbour absorbs a removed facet.
    #[arg(long, value_enum, default_value_t = Merge::SharedBorder)]
    merge_target: Merge,

    /// Haar smoothing passes over every border segment.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BORDER_SMOOTHING_ITERATIONS)]
    smoothing_iterations: usize,

    /// Smooth points on the image's outer edge too.
    #[arg(long)]
    no_preserve_edges: bool,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write the palette listing to file.
    #[arg(long)]
    palette: Option<PathBuf>,

    /// SVG scale factor.
    #[arg(long, default_value_t = 1.0)]
    size_multiplier: f64,

    /// Leave facets unfilled in the SVG.
    #[arg(long)]
    no_fill: bool,

    /// Omit black facet outlines in the SVG.
    #[arg(long)]
    no_stroke: bool,

    /// Omit colour numbers in the SVG.
    #[arg(long)]
    no_labels: bool,

    /// Largest label font size.
    #[arg(long, default_value_t = pbn_export::svg::DEFAULT_FONT_SIZE)]
    font_size: f64,

    /// Label text colour.
    #[arg(long, default_value = "black")]
    font_color: String,

    /// Number printed for the first palette colour.
    #[arg(long, default_value_t = 0)]
    label_start: usize,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing keys take their default values.
    #[arg(long, conflicts_with = "config_file")]
    config_json: Option<String>,

    /// Read the full pipeline config from a JSON file. Same rules as
    /// `--config-json`.
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Log more (`-v` info, `-vv` debug, `-vvv` trace). `RUST_LOG`
    /// overrides this.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Clustering colour space selection.
#[derive(Clone, Copy, ValueEnum)]
enum Space {
    /// Raw sRGB channels.
    Rgb,
    /// Hue, saturation, lightness.
    Hsl,
    /// CIE-Lab.
    Lab,
}

/// Merge target selection.
#[derive(Clone, Copy, ValueEnum)]
enum Merge {
    /// Neighbour with the longest shared border.
    SharedBorder,
    /// Neighbour with the closest palette colour.
    ClosestColor,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config-json` and `--config-file` are parsed directly and all
/// individual parameter flags are ignored. Otherwise a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if let Some(ref path) = cli.config_file {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&json)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    Ok(PipelineConfig {
        kmeans_clusters: cli.clusters,
        kmeans_color_space: match cli.color_space {
            Space::Rgb => ClusteringColorSpace::Rgb,
            Space::Hsl => ClusteringColorSpace::Hsl,
            Space::Lab => ClusteringColorSpace::Lab,
        },
        kmeans_min_delta: cli.min_delta,
        kmeans_max_iterations: cli.max_iterations,
        color_restrictions: cli.restrictions.clone(),
        random_seed: cli.seed.map_or(RandomSeed::Time, RandomSeed::Fixed),
        working_resolution: (!cli.no_resize).then_some(cli.working_resolution),
        narrow_strip_cleanup_runs: cli.strip_cleanup_runs,
        min_facet_size: cli.min_facet_size,
        max_facet_count: cli.max_facets,
        merge_largest_first: !cli.smallest_first,
        merge_target: match cli.merge_target {
            Merge::SharedBorder => MergeTarget::SharedBorder,
            Merge::ClosestColor => MergeTarget::ClosestColor,
        },
        border_smoothing_iterations: cli.smoothing_iterations,
        preserve_edge_points: !cli.no_preserve_edges,
    })
}

/// SVG rendering switches from CLI arguments.
fn svg_options_from_cli(cli: &Cli) -> SvgOptions {
    SvgOptions {
        size_multiplier: cli.size_multiplier,
        fill: !cli.no_fill,
        stroke: !cli.no_stroke,
        labels: !cli.no_labels,
        font_size: cli.font_size,
        font_color: cli.font_color.clone(),
        label_start_number: cli.label_start,
        ..SvgOptions::default()
    }
}

/// Route `tracing` output to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let mut progress = |stage: &str, fraction: f64| trace!(stage, fraction, "progress");
        match pbn_pipeline::process_with_diagnostics(&image_bytes, &config, &StdClock, &mut progress)
        {
            Ok((result, diagnostics)) => {
                info!(
                    run = run + 1,
                    total_ms = diagnostics.total_duration.as_secs_f64() * 1000.0,
                    "run finished"
                );
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write outputs on the first run only.
                if run == 0 {
                    write_outputs(&cli, &config, &result);
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Write the SVG and palette listing if requested. Write failures are
/// reported but do not fail the run.
fn write_outputs(cli: &Cli, config: &PipelineConfig, result: &ProcessResult) {
    if let Some(ref svg_path) = cli.svg {
        let title = cli
            .image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bench");
        let desc = format!(
            "k={} min_facet_size={} smoothing={} seed={}",
            config.kmeans_clusters,
            config.min_facet_size,
            config.border_smoothing_iterations,
            result.seed,
        );
        let config_json = serde_json::to_string(config).ok();
        let metadata = SvgMetadata {
            title: Some(title),
            description: Some(&desc),
            config_json: config_json.as_deref(),
        };
        let svg = pbn_export::to_svg(result, &svg_options_from_cli(cli), &metadata);
        write_file("SVG", svg_path, &svg);
    }

    if let Some(ref palette_path) = cli.palette {
        let listing = pbn_export::palette_listing(result);
        write_file("Palette", palette_path, &listing);
    }
}

fn write_file(what: &str, path: &Path, contents: &str) {
    match std::fs::write(path, contents) {
        Ok(()) => {
            debug!(path = %path.display(), bytes = contents.len(), "output written");
            eprintln!("{what} written to {} ({} bytes)", path.display(), contents.len());
        }
        Err(e) => {
            eprintln!("Error writing {what} to {}: {e}", path.display());
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (index, (name, _)) in first.stages().iter().enumerate() {
        let stage_total: f64 = all_diagnostics
            .iter()
            .filter_map(|d| d.stages().get(index).map(|(_, s)| s.duration))
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = stage_total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }

    // Facet counts only vary between runs when the seed does.
    let facets: Vec<usize> = all_diagnostics
        .iter()
        .map(|d| d.summary.facet_count)
        .collect();
    let fewest = facets.iter().min().copied().unwrap_or(0);
    let most = facets.iter().max().copied().unwrap_or(0);
    println!();
    println!("Facets: min={fewest}  max={most}");
}
