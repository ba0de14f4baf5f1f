//! Colour quantization: k-means palette reduction, colour-map indexing
//! and narrow pixel strip cleanup.

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::color::{ClusteringColorSpace, rgb_to_lab};
use crate::grid::Grid;
use crate::kmeans::KMeans;
use crate::types::{PipelineConfig, PipelineError, Rgb, RgbaImage};
use crate::vector::Vector;

/// Clear the two low bits of every channel.
#[must_use]
pub const fn chop_color(rgb: Rgb) -> Rgb {
    [rgb[0] & !0b11, rgb[1] & !0b11, rgb[2] & !0b11]
}

/// One clustering input vector per distinct (chopped) colour.
///
/// Vectors appear in row-major first-appearance order. Each carries
/// its colour as tag and its share of the image's pixels as weight.
#[must_use]
pub fn color_vectors(image: &RgbaImage, space: ClusteringColorSpace) -> Vec<Vector<Rgb>> {
    let mut order: Vec<Rgb> = Vec::new();
    let mut counts: HashMap<Rgb, usize> = HashMap::new();
    for pixel in image.pixels() {
        let rgb = chop_color([pixel[0], pixel[1], pixel[2]]);
        let count = counts.entry(rgb).or_insert(0);
        if *count == 0 {
            order.push(rgb);
        }
        *count += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let total = image.pixels().len() as f64;
    order
        .into_iter()
        .map(|rgb| {
            #[allow(clippy::cast_precision_loss)]
            let weight = counts.get(&rgb).copied().unwrap_or(0) as f64 / total;
            Vector::weighted(space.from_rgb(rgb).to_vec(), weight, rgb)
        })
        .collect()
}

/// Outcome of the clustering stage.
#[derive(Debug, Clone)]
pub struct Quantized {
    /// The image recoloured with centroid colours.
    pub pixels: Grid<Rgb>,
    /// Centroid colours in cluster order, after restriction snapping.
    pub centroids: Vec<Rgb>,
    /// Number of distinct chopped colours fed to k-means.
    pub distinct_colors: usize,
    /// Number of k-means steps run.
    pub iterations: usize,
    /// Largest centroid displacement of the final step.
    pub delta: f64,
}

/// Reduce `image` to at most `config.kmeans_clusters` colours.
///
/// Runs k-means from a PRNG seeded with `seed` until the centroid
/// displacement drops below `kmeans_min_delta` or the step budget is
/// spent. `progress` receives the fraction of the budget used after
/// every step.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for an image without pixels.
pub fn quantize(
    image: &RgbaImage,
    config: &PipelineConfig,
    seed: u64,
    progress: &mut dyn FnMut(f64),
) -> Result<Quantized, PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::EmptyInput);
    }
    let space = config.kmeans_color_space;
    let vectors = color_vectors(image, space);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut kmeans = KMeans::new(&vectors, config.kmeans_clusters, &mut rng)?;
    loop {
        kmeans.step()?;
        #[allow(clippy::cast_precision_loss)]
        let fraction = kmeans.iteration() as f64 / config.kmeans_max_iterations as f64;
        progress(fraction.min(1.0));
        if kmeans.has_converged(config.kmeans_min_delta)
            || kmeans.iteration() >= config.kmeans_max_iterations
        {
            break;
        }
    }

    let mut centroids: Vec<Rgb> = kmeans
        .centroids()
        .iter()
        .map(|c| {
            let values = [0, 1, 2].map(|i| c.values.get(i).copied().unwrap_or(0.0));
            space.to_rgb(values)
        })
        .collect();

    let restrictions = config.restriction_colors();
    if !restrictions.is_empty() {
        centroids = snap_to_restrictions(&centroids, &restrictions);
    }

    let lookup: HashMap<Rgb, Rgb> = vectors
        .iter()
        .zip(kmeans.assignments())
        .map(|(v, &cluster)| (v.tag, centroids[cluster]))
        .collect();

    let (w, h) = (image.width() as usize, image.height() as usize);
    let pixels = Grid::from_fn(w, h, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let p = image.get_pixel(x as u32, y as u32);
        let chopped = chop_color([p[0], p[1], p[2]]);
        lookup.get(&chopped).copied().unwrap_or(chopped)
    });

    info!(
        distinct_colors = vectors.len(),
        clusters = config.kmeans_clusters,
        iterations = kmeans.iteration(),
        delta = kmeans.delta(),
        "colour clustering finished"
    );

    Ok(Quantized {
        pixels,
        centroids,
        distinct_colors: vectors.len(),
        iterations: kmeans.iteration(),
        delta: kmeans.delta(),
    })
}

/// Replace every colour by the restriction colour closest in Lab.
#[must_use]
pub fn snap_to_restrictions(colors: &[Rgb], restrictions: &[Rgb]) -> Vec<Rgb> {
    let restriction_labs: Vec<[f64; 3]> = restrictions.iter().map(|&r| rgb_to_lab(r)).collect();
    colors
        .iter()
        .map(|&color| {
            let lab = rgb_to_lab(color);
            let mut best = color;
            let mut best_distance = f64::INFINITY;
            for (&candidate, candidate_lab) in restrictions.iter().zip(&restriction_labs) {
                let d: f64 = lab
                    .iter()
                    .zip(candidate_lab)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if d < best_distance {
                    best_distance = d;
                    best = candidate;
                }
            }
            best
        })
        .collect()
}

/// A palette plus the per-pixel palette index grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap {
    /// Distinct colours in row-major first-appearance order.
    pub palette: Vec<Rgb>,
    /// Palette index of every pixel.
    pub indices: Grid<usize>,
}

impl ColorMap {
    /// Image width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.indices.width()
    }

    /// Image height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.indices.height()
    }

    /// Colour of the pixel at `(x, y)`.
    #[must_use]
    pub fn color_at(&self, x: usize, y: usize) -> Rgb {
        self.palette[self.indices.get(x, y)]
    }

    /// Number of pixels using each palette entry.
    #[must_use]
    pub fn pixel_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.palette.len()];
        for &i in self.indices.cells() {
            counts[i] += 1;
        }
        counts
    }
}

/// Index a recoloured image: build the palette in first-appearance
/// order and map each pixel to its entry.
#[must_use]
pub fn create_color_map(pixels: &Grid<Rgb>) -> ColorMap {
    let mut palette = Vec::new();
    let mut index_of: HashMap<Rgb, usize> = HashMap::new();
    let indices = Grid::from_fn(pixels.width(), pixels.height(), |x, y| {
        let rgb = pixels.get(x, y);
        *index_of.entry(rgb).or_insert_with(|| {
            palette.push(rgb);
            palette.len() - 1
        })
    });
    ColorMap { palette, indices }
}

/// Euclidean RGB distance between every pair of palette entries.
#[must_use]
pub fn color_distance_matrix(palette: &[Rgb]) -> Vec<Vec<f64>> {
    palette
        .iter()
        .map(|a| {
            palette
                .iter()
                .map(|b| {
                    a.iter()
                        .zip(b)
                        .map(|(&x, &y)| {
                            let d = f64::from(x) - f64::from(y);
                            d * d
                        })
                        .sum::<f64>()
                        .sqrt()
                })
                .collect()
        })
        .collect()
}

/// Remove one-pixel-wide strips from the colour map.
///
/// An interior pixel whose colour differs from both vertical
/// neighbours takes the closer of the two (ties go up); otherwise one
/// that differs from both horizontal neighbours takes the closer of
/// those (ties go left). Repeated `runs` times. Returns the number of
/// pixels changed.
pub fn narrow_pixel_strip_cleanup(color_map: &mut ColorMap, runs: usize) -> usize {
    let distances = color_distance_matrix(&color_map.palette);
    let (w, h) = (color_map.width(), color_map.height());
    let indices = &mut color_map.indices;
    let mut changed = 0;

    for run in 0..runs {
        let mut changed_this_run = 0;
        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let current = indices.get(x, y);
                let top = indices.get(x, y - 1);
                let bottom = indices.get(x, y + 1);
                let left = indices.get(x - 1, y);
                let right = indices.get(x + 1, y);

                let replacement = if current != top && current != bottom {
                    Some(closer(&distances, current, top, bottom))
                } else if current != left && current != right {
                    Some(closer(&distances, current, left, right))
                } else {
                    None
                };
                if let Some(r) = replacement
                    && r != current
                {
                    indices.set(x, y, r);
                    changed_this_run += 1;
                }
            }
        }
        debug!(run, changed = changed_this_run, "narrow strip cleanup pass");
        changed += changed_this_run;
        if changed_this_run == 0 {
            break;
        }
    }
    changed
}

fn closer(distances: &[Vec<f64>], current: usize, first: usize, second: usize) -> usize {
    if distances[current][second] < distances[current][first] {
        second
    } else {
        first
    }
}
