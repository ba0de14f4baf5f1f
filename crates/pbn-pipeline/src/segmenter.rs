//! Border segmentation, Haar smoothing and cross-facet segment matching.
//!
//! A traced border is cut wherever the facet on the far side changes.
//! Each run is smoothed on its own, which lets the two copies of a
//! shared border drift apart slightly; matching then pairs them up so
//! both facets draw the same canonical point sequence.

use tracing::info;

use crate::facet::{
    FacetBoundarySegment, FacetResult, Neighbour, Orientation, PathPoint, PathSegment, to_signed,
};
use crate::types::Point;

/// Greatest endpoint distance, in pixels, at which two smoothed
/// segments are still considered the same border.
pub const MAX_MATCH_DISTANCE: f64 = 4.0;

/// Segments with at most this many points are not smoothed.
pub const MIN_SMOOTHING_LENGTH: usize = 5;

/// Counts reported by [`segment_borders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStats {
    /// Canonical segments stored in the result.
    pub segments: usize,
    /// Shared borders whose two copies were matched into one.
    pub matched: usize,
    /// Points before smoothing.
    pub points_before: usize,
    /// Points after smoothing.
    pub points_after: usize,
}

/// Split, smooth and match the borders of every live facet.
///
/// Fills [`FacetResult::segments`] and each facet's
/// `border_segments`.
pub fn segment_borders(
    result: &mut FacetResult,
    smoothing_iterations: usize,
    preserve_edge_points: bool,
    progress: &mut dyn FnMut(f64),
) -> SegmentStats {
    let mut prepared: Vec<Vec<PathSegment>> = result
        .facets
        .iter()
        .map(|slot| {
            slot.as_ref()
                .map(|f| prepare_segments(result, &f.border_path))
                .unwrap_or_default()
        })
        .collect();
    progress(1.0 / 3.0);

    let points_before = count_points(&prepared);
    let (w, h) = (result.width, result.height);
    for segments in &mut prepared {
        for segment in segments.iter_mut() {
            segment.points = smooth_points(
                &segment.points,
                smoothing_iterations,
                preserve_edge_points.then_some((w, h)),
            );
        }
    }
    let points_after = count_points(&prepared);
    progress(2.0 / 3.0);

    let matched = match_segments(result, prepared);
    progress(1.0);

    let stats = SegmentStats {
        segments: result.segments.len(),
        matched,
        points_before,
        points_after,
    };
    info!(
        segments = stats.segments,
        matched = stats.matched,
        points_before,
        points_after,
        "border segments prepared"
    );
    stats
}

fn count_points(prepared: &[Vec<PathSegment>]) -> usize {
    prepared.iter().flatten().map(|s| s.points.len()).sum()
}

/// Cut a closed border path into runs of constant neighbour.
///
/// A new run starts at every point whose neighbour differs from the
/// previous point's. A rotation that keeps the same facet neighbour on
/// both walls also starts a new run when the pixel diagonally across
/// the corner belongs to a different facet: the two walls then touch
/// separate stretches of the neighbour. If the last run faces the same
/// neighbour as the first and the seam from the last point back to the
/// first would not itself start a run, the two are joined.
#[must_use]
pub fn prepare_segments(result: &FacetResult, path: &[PathPoint]) -> Vec<PathSegment> {
    let mut runs: Vec<(Neighbour, Vec<Point>)> = Vec::new();
    let mut previous: Option<(PathPoint, Neighbour)> = None;

    for &point in path {
        let neighbour = point.neighbour(result);
        let starts_run = match previous {
            None => true,
            Some((prev, prev_neighbour)) => {
                neighbour != prev_neighbour || splits_at_corner(result, prev, point, neighbour)
            }
        };
        if starts_run {
            runs.push((neighbour, Vec::new()));
        }
        if let Some((_, points)) = runs.last_mut() {
            points.push(point.wall());
        }
        previous = Some((point, neighbour));
    }

    if runs.len() > 1
        && let (Some(&first), Some(&last)) = (path.first(), path.last())
        && let Some(&(neighbour, _)) = runs.first()
        && runs.last().map(|r| r.0) == Some(neighbour)
        && !splits_at_corner(result, last, first, neighbour)
        && let Some((_, mut tail)) = runs.pop()
    {
        tail.extend(runs[0].1.drain(..));
        runs[0].1 = tail;
    }

    runs.into_iter()
        .map(|(neighbour, points)| PathSegment { points, neighbour })
        .collect()
}

/// Whether a same-neighbour rotation corner hides a different facet
/// diagonally across the corner.
fn splits_at_corner(result: &FacetResult, prev: PathPoint, current: PathPoint, neighbour: Neighbour) -> bool {
    if prev.pixel != current.pixel || prev.orientation == current.orientation {
        return false;
    }
    if neighbour == Neighbour::Outside {
        return false;
    }
    let horizontal = [prev.orientation, current.orientation]
        .into_iter()
        .find(|o| matches!(o, Orientation::Left | Orientation::Right));
    let vertical = [prev.orientation, current.orientation]
        .into_iter()
        .find(|o| matches!(o, Orientation::Top | Orientation::Bottom));
    let (Some(hx), Some(vy)) = (horizontal, vertical) else {
        return false;
    };
    let (dx, _) = hx.offset();
    let (_, dy) = vy.offset();
    let (x, y) = (to_signed(current.pixel.x) + dx, to_signed(current.pixel.y) + dy);
    result.neighbour_at(x, y) != neighbour
}

/// Apply `iterations` Haar halving passes to a point sequence.
///
/// Each pass keeps the endpoints and replaces every interior pair with
/// its midpoint. Sequences of at most [`MIN_SMOOTHING_LENGTH`] points
/// are returned unchanged. With `edge` set to the image size, pairs
/// touching the image's outer edge are copied verbatim.
#[must_use]
pub fn smooth_points(points: &[Point], iterations: usize, edge: Option<(usize, usize)>) -> Vec<Point> {
    let mut current = points.to_vec();
    for _ in 0..iterations {
        if current.len() <= MIN_SMOOTHING_LENGTH {
            break;
        }
        current = haar_pass(&current, edge);
    }
    current
}

fn haar_pass(points: &[Point], edge: Option<(usize, usize)>) -> Vec<Point> {
    let n = points.len();
    let mut reduced = Vec::with_capacity(n / 2 + 2);
    reduced.push(points[0]);
    let mut i = 1;
    while i + 2 < n {
        let (a, b) = (points[i], points[i + 1]);
        let keep = edge.is_some_and(|(w, h)| is_on_outer_edge(a, w, h) || is_on_outer_edge(b, w, h));
        if keep {
            reduced.push(a);
            reduced.push(b);
        } else {
            reduced.push(a.midpoint(b));
        }
        i += 2;
    }
    reduced.push(points[n - 1]);
    reduced
}

/// Whether a wall-space point lies on the image's outer boundary.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn is_on_outer_edge(p: Point, width: usize, height: usize) -> bool {
    p.x == -0.5 || p.y == -0.5 || p.x == width as f64 - 0.5 || p.y == height as f64 - 0.5
}

/// Pair each facet's segments with its neighbours' copies.
///
/// Facets are visited in ascending id. Every segment not yet claimed
/// becomes canonical; if it faces a facet, that facet's unclaimed
/// segments facing back are searched for the one whose endpoints lie
/// within [`MAX_MATCH_DISTANCE`] with the smallest summed distance,
/// trying both directions (same direction wins ties, then the lower
/// segment index). The match references the canonical segment instead
/// of keeping its own copy. Returns the number of matches.
fn match_segments(result: &mut FacetResult, prepared: Vec<Vec<PathSegment>>) -> usize {
    let mut assigned: Vec<Vec<Option<FacetBoundarySegment>>> =
        prepared.iter().map(|s| vec![None; s.len()]).collect();
    let mut canonical: Vec<PathSegment> = Vec::new();
    let mut matched = 0;

    for id in 0..prepared.len() {
        for j in 0..prepared[id].len() {
            if assigned[id][j].is_some() {
                continue;
            }
            let segment = &prepared[id][j];
            let index = canonical.len();
            canonical.push(segment.clone());
            assigned[id][j] = Some(FacetBoundarySegment {
                segment: index,
                neighbour: segment.neighbour,
                reversed: false,
            });

            let Neighbour::Facet(other) = segment.neighbour else {
                continue;
            };
            let Some(candidates) = prepared.get(other) else {
                continue;
            };
            if let Some((k, reversed)) = best_match(segment, id, candidates, &assigned[other]) {
                assigned[other][k] = Some(FacetBoundarySegment {
                    segment: index,
                    neighbour: Neighbour::Facet(id),
                    reversed,
                });
                matched += 1;
            }
        }
    }

    result.segments = canonical;
    for (id, slots) in assigned.into_iter().enumerate() {
        if let Some(facet) = result.facet_mut(id) {
            facet.border_segments = slots.into_iter().flatten().collect();
        }
    }
    matched
}

/// Index and direction of the closest unclaimed copy of `segment`
/// among `candidates`, the segments of the facet it faces.
fn best_match(
    segment: &PathSegment,
    owner: usize,
    candidates: &[PathSegment],
    claimed: &[Option<FacetBoundarySegment>],
) -> Option<(usize, bool)> {
    let (start, end) = (segment.points.first()?, segment.points.last()?);
    let mut best: Option<(f64, usize, bool)> = None;

    for (k, candidate) in candidates.iter().enumerate() {
        if claimed.get(k).is_some_and(Option::is_some) || candidate.neighbour != Neighbour::Facet(owner) {
            continue;
        }
        let (Some(c_start), Some(c_end)) = (candidate.points.first(), candidate.points.last()) else {
            continue;
        };
        for (reversed, a, b) in [(false, c_start, c_end), (true, c_end, c_start)] {
            let d1 = start.distance(*a);
            let d2 = end.distance(*b);
            if d1 > MAX_MATCH_DISTANCE || d2 > MAX_MATCH_DISTANCE {
                continue;
            }
            let total = d1 + d2;
            if best.is_none_or(|(best_total, _, _)| total < best_total) {
                best = Some((total, k, reversed));
            }
        }
    }
    best.map(|(_, k, reversed)| (k, reversed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builder::build_facets;
    use crate::grid::Grid;
    use crate::quantize::ColorMap;
    use crate::tracer::trace_borders;

    fn noop(_: f64) {}

    fn traced(width: usize, height: usize, f: impl FnMut(usize, usize) -> usize) -> FacetResult {
        let map = ColorMap {
            palette: vec![[0, 0, 0], [255, 255, 255], [255, 0, 0]],
            indices: Grid::from_fn(width, height, f),
        };
        let mut result = build_facets(&map, &mut noop);
        trace_borders(&mut result, &mut noop);
        result
    }

    /// Three colours with many diagonal pinches.
    const PINCHED: [usize; 40] = [
        0, 2, 1, 1, 0, 2, 2, 0, //
        0, 2, 2, 2, 1, 0, 2, 2, //
        2, 2, 1, 2, 2, 2, 2, 2, //
        0, 2, 2, 1, 2, 0, 0, 1, //
        0, 2, 0, 2, 0, 0, 2, 2,
    ];

    fn pinched() -> FacetResult {
        traced(8, 5, |x, y| PINCHED[y * 8 + x])
    }

    /// Every border facing another facet must reference a segment that
    /// facet also uses, unless the facet is enclosed and so never traced
    /// from the outside.
    fn assert_borders_shared(result: &FacetResult) {
        for f in result.live_facets() {
            for boundary in &f.border_segments {
                let Neighbour::Facet(other) = boundary.neighbour else {
                    continue;
                };
                let facing: Vec<_> = result
                    .facet(other)
                    .unwrap()
                    .border_segments
                    .iter()
                    .filter(|s| s.neighbour == Neighbour::Facet(f.id))
                    .collect();
                if facing.is_empty() {
                    continue;
                }
                assert!(
                    facing.iter().any(|s| s.segment == boundary.segment),
                    "facet {} segment {} has no copy on facet {other}",
                    f.id,
                    boundary.segment
                );
            }
        }
    }

    fn line(n: usize) -> Vec<Point> {
        #[allow(clippy::cast_precision_loss)]
        let points = (0..n).map(|i| Point::new(i as f64, (i % 2) as f64)).collect();
        points
    }

    #[test]
    fn zero_iterations_is_identity() {
        let points = line(40);
        assert_eq!(smooth_points(&points, 0, None), points);
    }

    #[test]
    fn short_segments_untouched() {
        let points = line(5);
        assert_eq!(smooth_points(&points, 3, None), points);
    }

    #[test]
    fn haar_halves_point_count() {
        for len in [6_usize, 7, 20, 33, 100, 257, 1024] {
            for k in 1..=4_u32 {
                let out = smooth_points(&line(len), k as usize, None).len();
                let mut expected = len;
                for _ in 0..k {
                    if expected <= MIN_SMOOTHING_LENGTH {
                        break;
                    }
                    expected = expected.div_ceil(2);
                }
                assert!(
                    out.abs_diff(expected) <= 1,
                    "len={len} k={k}: got {out}, expected about {expected}"
                );
            }
        }
    }

    #[test]
    fn haar_keeps_endpoints_and_averages_pairs() {
        let points = line(6);
        let out = smooth_points(&points, 1, None);
        assert_eq!(out.first(), points.first());
        assert_eq!(out.last(), points.last());
        assert_eq!(out[1], Point::new(1.5, 0.5));
    }

    #[test]
    fn edge_points_preserved() {
        let points: Vec<Point> = (0..8_u8).map(|i| Point::new(f64::from(i), -0.5)).collect();
        let out = smooth_points(&points, 1, Some((10, 10)));
        assert_eq!(out.len(), 8);
        let unguarded = smooth_points(&points, 1, None);
        assert!(unguarded.len() < 8);
    }

    #[test]
    fn two_halves_segment_and_match() {
        let mut result = traced(4, 4, |x, _| usize::from(x >= 2));
        segment_borders(&mut result, 0, true, &mut noop);

        for f in result.live_facets() {
            let facing: Vec<_> = f
                .border_segments
                .iter()
                .filter(|s| matches!(s.neighbour, Neighbour::Facet(_)))
                .collect();
            assert_eq!(facing.len(), 1);
            assert!(f.border_segments.iter().any(|s| s.neighbour == Neighbour::Outside));
        }

        let a = result.facet(0).map(|f| f.border_segments.clone()).unwrap_or_default();
        let b = result.facet(1).map(|f| f.border_segments.clone()).unwrap_or_default();
        let shared_a = a.iter().find(|s| s.neighbour == Neighbour::Facet(1));
        let shared_b = b.iter().find(|s| s.neighbour == Neighbour::Facet(0));
        let (sa, sb) = (shared_a.unwrap(), shared_b.unwrap());
        assert_eq!(sa.segment, sb.segment);
        assert_ne!(sa.reversed, sb.reversed);

        let pa = result.oriented_points(sa);
        let pb = result.oriented_points(sb);
        assert_eq!(pa.len(), 4);
        assert!(pa.iter().all(|p| (p.x - 1.5).abs() < f64::EPSILON));
        let reversed: Vec<Point> = pb.iter().rev().copied().collect();
        assert_eq!(pa, reversed);
    }

    #[test]
    fn wraparound_runs_are_joined() {
        let result = traced(4, 4, |x, _| usize::from(x >= 2));
        let path = result.facet(0).map(|f| f.border_path.clone()).unwrap_or_default();
        let segments = prepare_segments(&result, &path);
        assert_eq!(segments.len(), 2);
        let total: usize = segments.iter().map(|s| s.points.len()).sum();
        assert_eq!(total, path.len());
    }

    #[test]
    fn corner_split_holds_across_path_seam() {
        let mut result = pinched();
        let id = result.facet_map.get(3, 3);
        let path = result.facet(id).map(|f| f.border_path.clone()).unwrap_or_default();
        assert_eq!(path.len(), 4);

        // Top and right face one stretch of the surrounding facet, the
        // left wall another: the pixel diagonally up-left is a different
        // facet.
        let segments = prepare_segments(&result, &path);
        assert_eq!(segments.len(), 3);
        let total: usize = segments.iter().map(|s| s.points.len()).sum();
        assert_eq!(total, 4);

        segment_borders(&mut result, 0, true, &mut noop);
        let facet = result.facet(id).unwrap();
        let walls: usize = facet
            .border_segments
            .iter()
            .map(|s| result.oriented_points(s).len())
            .sum();
        assert_eq!(walls, 4);
        assert_borders_shared(&result);
    }

    #[test]
    fn pinched_borders_shared_after_smoothing() {
        let mut result = pinched();
        segment_borders(&mut result, 2, true, &mut noop);
        assert_borders_shared(&result);
    }

    #[test]
    fn neighbour_constant_within_segment() {
        let result = traced(7, 6, |x, y| {
            if (2..5).contains(&x) && (2..4).contains(&y) {
                1
            } else if y >= 4 {
                2
            } else {
                0
            }
        });
        for f in result.live_facets() {
            let lookup: Vec<(Point, Neighbour)> = f
                .border_path
                .iter()
                .map(|p| (p.wall(), p.neighbour(&result)))
                .collect();
            for segment in prepare_segments(&result, &f.border_path) {
                for point in &segment.points {
                    let n = lookup.iter().find(|(p, _)| p == point).map(|(_, n)| *n);
                    assert_eq!(n, Some(segment.neighbour));
                }
            }
        }
    }

    #[test]
    fn uniform_image_has_single_outside_segment() {
        let mut result = traced(3, 3, |_, _| 0);
        let stats = segment_borders(&mut result, 2, true, &mut noop);
        assert_eq!(stats.segments, 1);
        assert_eq!(stats.matched, 0);
        let f = result.facet(0).map(|f| f.border_segments.clone()).unwrap_or_default();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].neighbour, Neighbour::Outside);
    }

    #[test]
    fn matching_survives_smoothing() {
        let mut result = traced(12, 12, |x, y| usize::from(x + y >= 12));
        let stats = segment_borders(&mut result, 2, true, &mut noop);
        assert_eq!(stats.matched, 1);
        let a = result.facet(0).map(|f| f.border_segments.clone()).unwrap_or_default();
        let b = result.facet(1).map(|f| f.border_segments.clone()).unwrap_or_default();
        let sa = a.iter().find(|s| s.neighbour == Neighbour::Facet(1)).map(|s| s.segment);
        let sb = b.iter().find(|s| s.neighbour == Neighbour::Facet(0)).map(|s| s.segment);
        assert!(sa.is_some());
        assert_eq!(sa, sb);
    }
}
