//! Iterative 4-connected flood fill.
//!
//! Uses an explicit stack and a per-call visited set, so regions as
//! large as the whole image are fine and every matching pixel is
//! reported exactly once.

use std::collections::HashSet;

use crate::geom::PixelPoint;
use crate::grid::neighbors_4;

/// Collect the 4-connected region around `start` where `include` holds.
///
/// Returns an empty list when `start` is out of bounds or fails the
/// predicate.
#[must_use]
pub fn fill(
    start: PixelPoint,
    width: usize,
    height: usize,
    include: impl FnMut(PixelPoint) -> bool,
) -> Vec<PixelPoint> {
    let mut points = Vec::new();
    fill_with(start, width, height, include, |p| points.push(p));
    points
}

/// Like [`fill`], but hands each discovered pixel to `on_fill` instead
/// of materializing the region. Returns the region size.
pub fn fill_with(
    start: PixelPoint,
    width: usize,
    height: usize,
    mut include: impl FnMut(PixelPoint) -> bool,
    mut on_fill: impl FnMut(PixelPoint),
) -> usize {
    if start.x >= width || start.y >= height || !include(start) {
        return 0;
    }

    let mut visited: HashSet<PixelPoint> = HashSet::new();
    let mut stack = vec![start];
    visited.insert(start);
    let mut count = 0;

    while let Some(p) = stack.pop() {
        on_fill(p);
        count += 1;
        for n in neighbors_4(p, width, height) {
            if !visited.contains(&n) && include(n) {
                visited.insert(n);
                stack.push(n);
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_predicate_covers_grid_once() {
        for start in [
            PixelPoint::new(0, 0),
            PixelPoint::new(6, 4),
            PixelPoint::new(3, 2),
        ] {
            let points = fill(start, 7, 5, |_| true);
            assert_eq!(points.len(), 35);
            let unique: HashSet<_> = points.iter().copied().collect();
            assert_eq!(unique.len(), 35);
        }
    }

    #[test]
    fn respects_predicate_and_connectivity() {
        // Column x=2 is a wall; only the left part is reachable.
        let points = fill(PixelPoint::new(0, 0), 5, 3, |p| p.x != 2);
        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.x < 2));
    }

    #[test]
    fn diagonal_is_not_connected() {
        let points = fill(PixelPoint::new(0, 0), 2, 2, |p| p.x == p.y);
        assert_eq!(points, vec![PixelPoint::new(0, 0)]);
    }

    #[test]
    fn start_failing_predicate_is_empty() {
        assert!(fill(PixelPoint::new(1, 1), 3, 3, |_| false).is_empty());
        assert!(fill(PixelPoint::new(5, 1), 3, 3, |_| true).is_empty());
    }

    #[test]
    fn callback_mode_counts() {
        let mut seen = 0;
        let n = fill_with(PixelPoint::new(0, 0), 10, 10, |_| true, |_| seen += 1);
        assert_eq!(n, 100);
        assert_eq!(seen, 100);
    }

    #[test]
    fn large_region_does_not_overflow() {
        let n = fill_with(PixelPoint::new(0, 0), 1000, 1000, |_| true, |_| {});
        assert_eq!(n, 1_000_000);
    }
}
