//! Integration tests: run decoded images through the full pipeline and
//! check the facet partition and the shared borders it produces.

#![allow(clippy::unwrap_used)]

use pbn_pipeline::flood_fill::fill;
use pbn_pipeline::{
    Neighbour, PipelineConfig, PixelPoint, ProcessResult, RandomSeed, RgbaImage, process_image,
};

const RED: image::Rgba<u8> = image::Rgba([255, 0, 0, 255]);
const BLUE: image::Rgba<u8> = image::Rgba([0, 0, 255, 255]);

fn config(clusters: usize, min_facet_size: usize, smoothing: usize) -> PipelineConfig {
    PipelineConfig {
        kmeans_clusters: clusters,
        min_facet_size,
        border_smoothing_iterations: smoothing,
        random_seed: RandomSeed::Fixed(5),
        working_resolution: None,
        ..PipelineConfig::default()
    }
}

fn run(image: &RgbaImage, config: &PipelineConfig) -> ProcessResult {
    process_image(image, config, &mut |_, _| {}).unwrap()
}

/// Four colour blocks with a diagonal stripe crossing them.
fn patchwork(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if x.abs_diff(y) <= 1 {
            image::Rgba([250, 250, 250, 255])
        } else {
            match (x * 2 / width, y * 2 / height) {
                (0, 0) => RED,
                (1, 0) => BLUE,
                (0, _) => image::Rgba([0, 160, 0, 255]),
                _ => image::Rgba([20, 20, 20, 255]),
            }
        }
    })
}

#[test]
fn halves_share_one_matched_border() {
    let image = RgbaImage::from_fn(4, 4, |x, _| if x < 2 { RED } else { BLUE });
    let result = run(&image, &config(2, 1, 0));
    assert_eq!(result.facets.live_count(), 2);

    for facet in result.facets.live_facets() {
        assert_eq!(facet.point_count, 8);
        let facing: Vec<_> = facet
            .border_segments
            .iter()
            .filter(|s| matches!(s.neighbour, Neighbour::Facet(_)))
            .collect();
        assert_eq!(facing.len(), 1);
        assert!(
            facet
                .border_segments
                .iter()
                .any(|s| s.neighbour == Neighbour::Outside)
        );
    }

    let left = result.facets.facet_map.get(0, 0);
    let right = result.facets.facet_map.get(3, 0);
    let shared = |id: usize, other: usize| {
        result
            .facets
            .facet(id)
            .and_then(|f| {
                f.border_segments
                    .iter()
                    .find(|s| s.neighbour == Neighbour::Facet(other))
                    .copied()
            })
            .unwrap()
    };
    let (a, b) = (shared(left, right), shared(right, left));
    assert_eq!(a.segment, b.segment);

    let pa = result.facets.oriented_points(&a);
    let pb = result.facets.oriented_points(&b);
    assert_eq!(pa.first(), pb.last());
    assert_eq!(pa.last(), pb.first());
}

#[test]
fn single_pixel_image_is_one_outside_loop() {
    let image = RgbaImage::from_pixel(1, 1, RED);
    let result = run(&image, &config(2, 1, 0));
    assert_eq!(result.facets.live_count(), 1);

    let facet = result.facets.facet(0).unwrap();
    assert_eq!(facet.point_count, 1);
    assert_eq!(facet.border_path.len(), 4);
    assert!(
        facet
            .border_segments
            .iter()
            .all(|s| s.neighbour == Neighbour::Outside)
    );
}

#[test]
fn small_facet_is_absorbed_into_surroundings() {
    let image = RgbaImage::from_fn(10, 10, |x, y| if (x, y) == (5, 5) { BLUE } else { RED });
    let result = run(&image, &config(2, 20, 0));

    assert_eq!(result.facets.live_count(), 1);
    let survivor = result.facets.live_facets().next().unwrap();
    assert_eq!(survivor.point_count, 100);
    assert!(survivor.neighbours.is_empty());
    assert!(
        result
            .facets
            .facet_map
            .cells()
            .iter()
            .all(|&id| id == survivor.id)
    );
    let deleted = (0..result.facets.facets.len()).filter(|&id| id != survivor.id);
    for id in deleted {
        assert!(result.facets.facet(id).is_none());
    }
}

#[test]
fn same_seed_is_deterministic() {
    let image = patchwork(24, 18);
    let config = config(4, 3, 2);
    let first = run(&image, &config);
    let second = run(&image, &config);

    assert_eq!(first.seed, second.seed);
    assert_eq!(first.color_map.palette, second.color_map.palette);
    assert_eq!(first.facets.facet_map.cells(), second.facets.facet_map.cells());
    assert_eq!(first.facets.segments, second.facets.segments);
}

#[test]
fn facets_partition_the_image() {
    let image = patchwork(24, 18);
    let result = run(&image, &config(4, 3, 2));
    let facets = &result.facets;

    let total: usize = facets.live_facets().map(|f| f.point_count).sum();
    assert_eq!(total, 24 * 18);

    for (x, y, id) in facets.facet_map.iter() {
        let facet = facets.facet(id).unwrap();
        assert_eq!(facet.color, result.color_map.indices.get(x, y));
        assert!(facet.bbox.contains(PixelPoint::new(x, y)));
    }
}

/// Three colours with many diagonal pinches between same-colour pixels.
fn pinched() -> RgbaImage {
    const CELLS: [u8; 40] = [
        0, 2, 1, 1, 0, 2, 2, 0, //
        0, 2, 2, 2, 1, 0, 2, 2, //
        2, 2, 1, 2, 2, 2, 2, 2, //
        0, 2, 2, 1, 2, 0, 0, 1, //
        0, 2, 0, 2, 0, 0, 2, 2,
    ];
    RgbaImage::from_fn(8, 5, |x, y| match CELLS[(y * 8 + x) as usize] {
        0 => RED,
        1 => BLUE,
        _ => image::Rgba([0, 160, 0, 255]),
    })
}

fn assert_consistent_borders(result: &ProcessResult) {
    let facets = &result.facets;
    #[allow(clippy::cast_precision_loss)]
    let (max_x, max_y) = (facets.width as f64 - 0.5, facets.height as f64 - 0.5);

    for facet in facets.live_facets() {
        assert!(!facet.border_segments.is_empty());
        assert!(!facets.full_path(facet.id).is_empty());
        for boundary in &facet.border_segments {
            assert!(boundary.segment < facets.segments.len());
            if let Neighbour::Facet(other) = boundary.neighbour {
                let other = facets.facet(other).unwrap();
                assert!(other.neighbours.contains(&facet.id));
                assert!(facet.neighbours.contains(&other.id));

                // A facet lying inside `other` is absent from its outer border.
                let facing: Vec<_> = other
                    .border_segments
                    .iter()
                    .filter(|s| s.neighbour == Neighbour::Facet(facet.id))
                    .collect();
                assert!(
                    facing.is_empty() || facing.iter().any(|s| s.segment == boundary.segment),
                    "facet {} segment {} not shared by facet {}",
                    facet.id,
                    boundary.segment,
                    other.id
                );
            }
            for p in facets.oriented_points(boundary) {
                assert!((-0.5..=max_x).contains(&p.x));
                assert!((-0.5..=max_y).contains(&p.y));
            }
        }
    }
}

#[test]
fn borders_are_consistent_between_neighbours() {
    let result = run(&patchwork(24, 18), &config(4, 3, 2));
    assert_consistent_borders(&result);
}

#[test]
fn pinched_borders_are_consistent_between_neighbours() {
    let config = PipelineConfig {
        narrow_strip_cleanup_runs: 0,
        ..config(3, 1, 0)
    };
    let result = run(&pinched(), &config);
    assert!(result.facets.live_count() > 3);
    assert_consistent_borders(&result);
}

#[test]
fn every_facet_gets_a_label_inside_the_image() {
    let image = patchwork(24, 18);
    let result = run(&image, &config(4, 3, 2));
    for facet in result.facets.live_facets() {
        let label = facet.label.unwrap();
        assert!((-0.5..=23.5).contains(&label.point.x));
        assert!((-0.5..=17.5).contains(&label.point.y));
    }
}

#[test]
fn flood_fill_covers_a_full_grid() {
    let region = fill(PixelPoint::new(17, 9), 50, 40, |_| true);
    assert_eq!(region.len(), 2000);
    let unique: std::collections::HashSet<_> = region.iter().collect();
    assert_eq!(unique.len(), 2000);
}
