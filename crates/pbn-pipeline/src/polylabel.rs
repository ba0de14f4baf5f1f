//! Pole of inaccessibility: the interior point farthest from every
//! polygon edge.
//!
//! A quadtree search over the outer ring's bounding box. Each cell
//! bounds the best distance any point inside it can reach; cells are
//! explored most-promising first and split until none can improve on
//! the best point by more than the precision.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;

use crate::types::Point;

/// The chosen anchor and its distance to the nearest edge.
///
/// The distance is negative when the point lies outside the polygon
/// and zero for degenerate input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylabelResult {
    /// Best point found.
    pub point: Point,
    /// Signed distance from `point` to the nearest ring edge.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    center: Point,
    half: f64,
    distance: f64,
    max: f64,
}

impl Cell {
    fn new(center: Point, half: f64, rings: &[Vec<Point>]) -> Self {
        let distance = signed_distance(center, rings);
        Self {
            center,
            half,
            distance,
            max: half.mul_add(SQRT_2, distance),
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.max.total_cmp(&other.max)
    }
}

/// Find the pole of inaccessibility of `rings` (outer ring first, then
/// holes) to within `precision` pixels.
///
/// The ring centroid and the bounding-box centre are always evaluated,
/// so a degenerate grid still returns a sensible anchor. An empty or
/// zero-area outer ring yields its first corner with distance zero.
#[must_use]
pub fn polylabel(rings: &[Vec<Point>], precision: f64) -> PolylabelResult {
    let Some(outer) = rings.first().filter(|r| !r.is_empty()) else {
        return PolylabelResult {
            point: Point::new(0.0, 0.0),
            distance: 0.0,
        };
    };

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in outer {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let width = max_x - min_x;
    let height = max_y - min_y;
    let cell_size = width.min(height);
    if cell_size <= 0.0 || !cell_size.is_finite() {
        return PolylabelResult {
            point: Point::new(min_x, min_y),
            distance: 0.0,
        };
    }
    let precision = if precision > 0.0 { precision } else { 1.0 };
    let half = cell_size / 2.0;

    let mut queue = BinaryHeap::new();
    let mut x = min_x;
    while x < max_x {
        let mut y = min_y;
        while y < max_y {
            queue.push(Cell::new(Point::new(x + half, y + half), half, rings));
            y += cell_size;
        }
        x += cell_size;
    }

    let mut best = Cell::new(centroid(outer), 0.0, rings);
    let bbox_cell = Cell::new(
        Point::new(min_x + width / 2.0, min_y + height / 2.0),
        0.0,
        rings,
    );
    if bbox_cell.distance > best.distance {
        best = bbox_cell;
    }

    while let Some(cell) = queue.pop() {
        if cell.distance > best.distance {
            best = cell;
        }
        if cell.max - best.distance <= precision {
            continue;
        }
        let h = cell.half / 2.0;
        for (dx, dy) in [(-h, -h), (h, -h), (-h, h), (h, h)] {
            queue.push(Cell::new(
                Point::new(cell.center.x + dx, cell.center.y + dy),
                h,
                rings,
            ));
        }
    }

    PolylabelResult {
        point: best.center,
        distance: best.distance,
    }
}

/// Area-weighted centroid of a ring, or its first point when the ring
/// has no area.
fn centroid(ring: &[Point]) -> Point {
    let mut area = 0.0;
    let (mut x, mut y) = (0.0, 0.0);
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + n - 1) % n];
        let f = a.x.mul_add(b.y, -(b.x * a.y));
        x += (a.x + b.x) * f;
        y += (a.y + b.y) * f;
        area += f * 3.0;
    }
    if area == 0.0 {
        ring[0]
    } else {
        Point::new(x / area, y / area)
    }
}

/// Whether `p` is inside the polygon formed by `rings` (even-odd rule,
/// so holes count as outside).
#[must_use]
pub fn point_in_polygon(p: Point, rings: &[Vec<Point>]) -> bool {
    let mut inside = false;
    for ring in rings {
        let n = ring.len();
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + n - 1) % n];
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Distance from `p` to the nearest ring edge, positive inside.
#[must_use]
pub fn signed_distance(p: Point, rings: &[Vec<Point>]) -> f64 {
    let mut min_sq = f64::INFINITY;
    for ring in rings {
        let n = ring.len();
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + n - 1) % n];
            min_sq = min_sq.min(segment_distance_squared(p, a, b));
        }
    }
    let d = min_sq.sqrt();
    if point_in_polygon(p, rings) { d } else { -d }
}

fn segment_distance_squared(p: Point, a: Point, b: Point) -> f64 {
    let (mut x, mut y) = (a.x, a.y);
    let (dx, dy) = (b.x - x, b.y - y);
    if dx != 0.0 || dy != 0.0 {
        let t = ((p.x - x) * dx + (p.y - y) * dy) / dx.mul_add(dx, dy * dy);
        if t > 1.0 {
            x = b.x;
            y = b.y;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }
    p.distance_squared(Point::new(x, y))
}
