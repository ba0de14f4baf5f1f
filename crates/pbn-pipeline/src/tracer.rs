//! Wall-following border tracer.
//!
//! Each facet's outer border is walked one pixel wall at a time. At
//! every step the tracer tries, in order: rotating onto another wall
//! of the same pixel, moving straight along to the next pixel's wall,
//! and stepping diagonally to cross a convex corner. Rotation must come
//! first; preferring the straight or diagonal moves skips walls at
//! pinch points and leaves the loop open.
//!
//! Visited walls are recorded in two boolean grids shared by all
//! facets: `x_walls` holds vertical walls (`(w + 1) × h`) and
//! `y_walls` horizontal walls (`w × (h + 1)`). A wall separating two
//! facets is walked by both, so the marks left by one facet are
//! cleared before the next is traced. Facets must therefore be traced
//! one after another.

use tracing::{debug, info};

use crate::facet::{FacetResult, Orientation, PathPoint, to_signed};
use crate::geom::PixelPoint;
use crate::grid::Grid;

/// Counts reported by [`trace_borders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceStats {
    /// Facets that received a border path.
    pub traced: usize,
    /// Live facets skipped because no start wall was found.
    pub skipped: usize,
    /// Path points over all facets.
    pub total_points: usize,
}

/// Visited-wall bookkeeping for one tracing run.
struct Walls {
    x_walls: Grid<bool>,
    y_walls: Grid<bool>,
    touched: Vec<(Orientation, PixelPoint)>,
}

impl Walls {
    fn new(width: usize, height: usize) -> Self {
        Self {
            x_walls: Grid::new(width + 1, height, false),
            y_walls: Grid::new(width, height + 1, false),
            touched: Vec::new(),
        }
    }

    /// Grid and cell holding the wall on side `o` of pixel `(x, y)`.
    /// Negative coordinates never reach here: only walls of facet
    /// pixels are addressed.
    const fn cell(o: Orientation, x: usize, y: usize) -> (bool, usize, usize) {
        match o {
            Orientation::Left => (true, x, y),
            Orientation::Right => (true, x + 1, y),
            Orientation::Top => (false, x, y),
            Orientation::Bottom => (false, x, y + 1),
        }
    }

    fn is_visited(&self, p: PixelPoint, o: Orientation) -> bool {
        let (vertical, cx, cy) = Self::cell(o, p.x, p.y);
        if vertical {
            self.x_walls.get(cx, cy)
        } else {
            self.y_walls.get(cx, cy)
        }
    }

    fn visit(&mut self, p: PixelPoint, o: Orientation) {
        let (vertical, cx, cy) = Self::cell(o, p.x, p.y);
        if vertical {
            self.x_walls.set(cx, cy, true);
        } else {
            self.y_walls.set(cx, cy, true);
        }
        self.touched.push((o, p));
    }

    fn reset(&mut self) {
        for (o, p) in std::mem::take(&mut self.touched) {
            let (vertical, cx, cy) = Self::cell(o, p.x, p.y);
            if vertical {
                self.x_walls.set(cx, cy, false);
            } else {
                self.y_walls.set(cx, cy, false);
            }
        }
    }
}

/// The two walls perpendicular to `o`, in the order they are tried.
const fn sides(o: Orientation) -> [Orientation; 2] {
    match o {
        Orientation::Left => [Orientation::Top, Orientation::Bottom],
        Orientation::Top => [Orientation::Right, Orientation::Left],
        Orientation::Right => [Orientation::Bottom, Orientation::Top],
        Orientation::Bottom => [Orientation::Left, Orientation::Right],
    }
}

/// Trace the outer border of every live facet, largest first.
///
/// Ties in size are broken by id so the output is reproducible.
pub fn trace_borders(result: &mut FacetResult, progress: &mut dyn FnMut(f64)) -> TraceStats {
    let mut order: Vec<(usize, usize)> = result
        .live_facets()
        .map(|f| (f.point_count, f.id))
        .collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut walls = Walls::new(result.width, result.height);
    let mut stats = TraceStats {
        traced: 0,
        skipped: 0,
        total_points: 0,
    };

    let total = order.len().max(1);
    for (i, &(_, id)) in order.iter().enumerate() {
        let path = trace_facet(result, &mut walls, id);
        walls.reset();
        if path.is_empty() {
            debug!(facet = id, "no border start found, facet skipped");
            stats.skipped += 1;
        } else {
            stats.traced += 1;
            stats.total_points += path.len();
        }
        if let Some(facet) = result.facet_mut(id) {
            facet.border_path = path;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = (i + 1) as f64 / total as f64;
        progress(fraction);
    }

    info!(
        traced = stats.traced,
        skipped = stats.skipped,
        points = stats.total_points,
        "facet borders traced"
    );
    stats
}

/// Walk facet `id`'s outer border. Returns an empty path for a
/// deleted facet or one without pixels.
fn trace_facet(result: &FacetResult, walls: &mut Walls, id: usize) -> Vec<PathPoint> {
    let Some(facet) = result.facet(id) else {
        return Vec::new();
    };
    // The first member pixel on the bounding box's top row always has
    // an exposed top wall.
    let row = facet.bbox.min_y;
    let Some(start_x) =
        (facet.bbox.min_x..=facet.bbox.max_x).find(|&x| result.facet_map.get(x, row) == id)
    else {
        return Vec::new();
    };

    let mut current = PathPoint::new(PixelPoint::new(start_x, row), Orientation::Top);
    walls.visit(current.pixel, current.orientation);
    let mut path = vec![current];

    while let Some(next) = next_step(result, walls, id, current) {
        walls.visit(next.pixel, next.orientation);
        path.push(next);
        current = next;
    }
    path
}

/// Pixel at `p + (dx, dy)` if it is inside the image and in facet `id`.
fn member_at(result: &FacetResult, id: usize, p: PixelPoint, dx: i64, dy: i64) -> Option<PixelPoint> {
    let (x, y) = (to_signed(p.x) + dx, to_signed(p.y) + dy);
    if result.is_member(id, x, y) {
        Some(PixelPoint::new(usize::try_from(x).ok()?, usize::try_from(y).ok()?))
    } else {
        None
    }
}

fn is_member_offset(result: &FacetResult, id: usize, p: PixelPoint, dx: i64, dy: i64) -> bool {
    member_at(result, id, p, dx, dy).is_some()
}

/// The next wall to walk to, by rotation, then straight, then diagonal.
fn next_step(
    result: &FacetResult,
    walls: &Walls,
    id: usize,
    at: PathPoint,
) -> Option<PathPoint> {
    let p = at.pixel;
    let o = at.orientation;
    let (ex, ey) = o.offset();
    let candidates = sides(o);

    // Rotate onto another exposed wall of the same pixel.
    for s in candidates {
        let (dx, dy) = s.offset();
        if !is_member_offset(result, id, p, dx, dy) && !walls.is_visited(p, s) {
            return Some(PathPoint::new(p, s));
        }
    }

    // Continue along the same wall line onto the next pixel.
    for s in candidates {
        let (dx, dy) = s.offset();
        if let Some(q) = member_at(result, id, p, dx, dy)
            && !is_member_offset(result, id, q, ex, ey)
            && !walls.is_visited(q, o)
        {
            return Some(PathPoint::new(q, o));
        }
    }

    // Cross a convex corner onto the diagonal pixel.
    for s in candidates {
        let (dx, dy) = s.offset();
        if let Some(r) = member_at(result, id, p, dx + ex, dy + ey)
            && !walls.is_visited(r, s.opposite())
            && !walls.is_visited(p, s)
        {
            return Some(PathPoint::new(r, s.opposite()));
        }
    }

    None
}
