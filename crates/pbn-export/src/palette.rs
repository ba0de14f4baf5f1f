//! Plain-text palette listing.

use std::fmt::Write;

use pbn_pipeline::ProcessResult;
use pbn_pipeline::color::to_hex;

/// One line per palette entry: `index: #rrggbb (share)`, where share is
/// the percentage of image pixels painted in that colour.
#[must_use]
pub fn palette_listing(result: &ProcessResult) -> String {
    let counts = result.color_map.pixel_counts();
    let total: usize = counts.iter().sum();

    let mut out = String::new();
    for (index, &color) in result.color_map.palette.iter().enumerate() {
        let count = counts.get(index).copied().unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let share = if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        };
        let _ = writeln!(out, "{index}: {} ({share:.2}%)", to_hex(color));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pbn_pipeline::{PipelineConfig, RandomSeed, RgbaImage, process_image};

    use super::*;

    #[test]
    fn listing_has_a_line_per_colour_with_shares() {
        // Three quarters red, one quarter blue.
        let image = RgbaImage::from_fn(8, 8, |x, y| {
            if x >= 4 && y >= 4 {
                image::Rgba([0, 0, 255, 255])
            } else {
                image::Rgba([255, 0, 0, 255])
            }
        });
        let config = PipelineConfig {
            kmeans_clusters: 2,
            min_facet_size: 1,
            random_seed: RandomSeed::Fixed(9),
            ..PipelineConfig::default()
        };
        let result = process_image(&image, &config, &mut |_, _| {}).unwrap();
        let listing = palette_listing(&result);

        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.ends_with("#fc0000 (75.00%)")));
        assert!(lines.iter().any(|l| l.ends_with("#0000fc (25.00%)")));
        assert!(lines[0].starts_with("0: #"));
    }
}
