//! Facet records and the arena that owns them.
//!
//! Facet ids index [`FacetResult::facets`]. A deleted facet leaves a
//! `None` in its slot so every other id stays valid; lookups of a
//! deleted id are a normal outcome, not an error.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geom::{BoundingBox, PixelPoint};
use crate::grid::Grid;
use crate::labels::LabelPlacement;
use crate::types::Point;

/// What lies on the far side of a border wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Neighbour {
    /// The wall is on the image's outer edge.
    Outside,
    /// The wall separates this facet from the facet with this id.
    Facet(usize),
}

impl fmt::Display for Neighbour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outside => write!(f, "outside"),
            Self::Facet(id) => write!(f, "facet {id}"),
        }
    }
}

/// Which side of a pixel a border wall is on, pointing away from the
/// facet interior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Wall at `x - 0.5`.
    Left = 0,
    /// Wall at `y - 0.5`.
    Top = 1,
    /// Wall at `x + 0.5`.
    Right = 2,
    /// Wall at `y + 0.5`.
    Bottom = 3,
}

impl Orientation {
    /// Pixel step from the facet pixel to the pixel across the wall.
    #[must_use]
    pub const fn offset(self) -> (i64, i64) {
        match self {
            Self::Left => (-1, 0),
            Self::Top => (0, -1),
            Self::Right => (1, 0),
            Self::Bottom => (0, 1),
        }
    }

    /// The wall on the other side of the same pixel.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Top => Self::Bottom,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
        }
    }
}

/// A traced border point: a facet pixel plus the wall it stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPoint {
    /// The facet pixel owning the wall.
    pub pixel: PixelPoint,
    /// Which of the pixel's walls.
    pub orientation: Orientation,
}

impl PathPoint {
    /// Create a path point.
    #[must_use]
    pub const fn new(pixel: PixelPoint, orientation: Orientation) -> Self {
        Self { pixel, orientation }
    }

    /// The wall's midpoint in wall space.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn wall(&self) -> Point {
        let (dx, dy) = self.orientation.offset();
        Point::new(
            self.pixel.x as f64 + 0.5 * dx as f64,
            self.pixel.y as f64 + 0.5 * dy as f64,
        )
    }

    /// Signed coordinates of the pixel across the wall.
    #[must_use]
    pub fn across(&self) -> (i64, i64) {
        let (dx, dy) = self.orientation.offset();
        (to_signed(self.pixel.x) + dx, to_signed(self.pixel.y) + dy)
    }

    /// The facet (or the image exterior) on the far side of the wall.
    #[must_use]
    pub fn neighbour(&self, result: &FacetResult) -> Neighbour {
        let (x, y) = self.across();
        result.neighbour_at(x, y)
    }
}

pub(crate) fn to_signed(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// A run of border points facing a single neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    /// Wall-space points in traversal order.
    pub points: Vec<Point>,
    /// What the run faces.
    pub neighbour: Neighbour,
}

/// A facet's reference to a shared [`PathSegment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetBoundarySegment {
    /// Index into [`FacetResult::segments`].
    pub segment: usize,
    /// What the segment faces, seen from this facet.
    pub neighbour: Neighbour,
    /// Walk the segment's points back to front for this facet.
    pub reversed: bool,
}

/// A maximal 4-connected region of one palette colour.
#[derive(Debug, Clone)]
pub struct Facet {
    /// Stable id; also the facet's index in the arena.
    pub id: usize,
    /// Palette index.
    pub color: usize,
    /// Pixel-space bounding box.
    pub bbox: BoundingBox,
    /// Number of member pixels.
    pub point_count: usize,
    /// Ids of adjacent facets.
    pub neighbours: BTreeSet<usize>,
    /// Traced outer border, empty until tracing runs.
    pub border_path: Vec<PathPoint>,
    /// Border split into neighbour runs, empty until segmenting runs.
    pub border_segments: Vec<FacetBoundarySegment>,
    /// Label anchor, set by label placement.
    pub label: Option<LabelPlacement>,
}

impl Facet {
    /// A fresh single-pixel facet, grown by the builder.
    #[must_use]
    pub const fn new(id: usize, color: usize, start: PixelPoint) -> Self {
        Self {
            id,
            color,
            bbox: BoundingBox::at(start),
            point_count: 0,
            neighbours: BTreeSet::new(),
            border_path: Vec::new(),
            border_segments: Vec::new(),
            label: None,
        }
    }
}

/// Facet arena plus the per-pixel facet id map.
#[derive(Debug, Clone)]
pub struct FacetResult {
    /// Image width.
    pub width: usize,
    /// Image height.
    pub height: usize,
    /// Facet id of every pixel.
    pub facet_map: Grid<usize>,
    /// Facet slots; `None` marks a deleted facet.
    pub facets: Vec<Option<Facet>>,
    /// Canonical border segments referenced by
    /// [`FacetBoundarySegment::segment`].
    pub segments: Vec<PathSegment>,
}

impl FacetResult {
    /// The facet with `id`, or `None` if it was deleted or never existed.
    #[must_use]
    pub fn facet(&self, id: usize) -> Option<&Facet> {
        self.facets.get(id).and_then(Option::as_ref)
    }

    /// Mutable access to a live facet.
    pub fn facet_mut(&mut self, id: usize) -> Option<&mut Facet> {
        self.facets.get_mut(id).and_then(Option::as_mut)
    }

    /// Live facets in id order.
    pub fn live_facets(&self) -> impl Iterator<Item = &Facet> {
        self.facets.iter().flatten()
    }

    /// Number of live facets.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_facets().count()
    }

    /// Facet at signed pixel coordinates, or [`Neighbour::Outside`]
    /// beyond the image edge.
    #[must_use]
    pub fn neighbour_at(&self, x: i64, y: i64) -> Neighbour {
        self.facet_map
            .get_signed(x, y)
            .map_or(Neighbour::Outside, Neighbour::Facet)
    }

    /// Whether the pixel at signed coordinates belongs to facet `id`.
    #[must_use]
    pub fn is_member(&self, id: usize, x: i64, y: i64) -> bool {
        self.facet_map.get_signed(x, y) == Some(id)
    }

    /// A boundary segment's points in this facet's traversal direction.
    #[must_use]
    pub fn oriented_points(&self, boundary: &FacetBoundarySegment) -> Vec<Point> {
        let Some(segment) = self.segments.get(boundary.segment) else {
            return Vec::new();
        };
        if boundary.reversed {
            segment.points.iter().rev().copied().collect()
        } else {
            segment.points.clone()
        }
    }

    /// The facet's closed outline, stitched from its boundary segments.
    ///
    /// At each join the previous segment's last point is repeated so
    /// the outline has no gap where two canonical segments meet.
    /// Returns an empty path for deleted or unsegmented facets.
    #[must_use]
    pub fn full_path(&self, id: usize) -> Vec<Point> {
        let Some(facet) = self.facet(id) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut previous_last: Option<Point> = None;
        for boundary in &facet.border_segments {
            let points = self.oriented_points(boundary);
            if let Some(last) = previous_last {
                path.push(last);
            }
            previous_last = points.last().copied();
            path.extend(points);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_facet_result() -> FacetResult {
        let facet_map = Grid::from_fn(2, 1, |x, _| x);
        let mut a = Facet::new(0, 0, PixelPoint::new(0, 0));
        a.point_count = 1;
        let mut b = Facet::new(1, 1, PixelPoint::new(1, 0));
        b.point_count = 1;
        FacetResult {
            width: 2,
            height: 1,
            facet_map,
            facets: vec![Some(a), Some(b)],
            segments: Vec::new(),
        }
    }

    #[test]
    fn orientation_offsets_are_unit_steps() {
        for o in [
            Orientation::Left,
            Orientation::Top,
            Orientation::Right,
            Orientation::Bottom,
        ] {
            let (dx, dy) = o.offset();
            let (ox, oy) = o.opposite().offset();
            assert_eq!(dx.abs() + dy.abs(), 1);
            assert_eq!((dx + ox, dy + oy), (0, 0));
        }
        assert_eq!(Orientation::Bottom as u8, 3);
    }

    #[test]
    fn wall_points_sit_half_a_pixel_out() {
        let p = PixelPoint::new(3, 5);
        assert_eq!(
            PathPoint::new(p, Orientation::Left).wall(),
            Point::new(2.5, 5.0)
        );
        assert_eq!(
            PathPoint::new(p, Orientation::Bottom).wall(),
            Point::new(3.0, 5.5)
        );
    }

    #[test]
    fn neighbour_lookup_across_wall() {
        let result = two_facet_result();
        let left = PixelPoint::new(0, 0);
        assert_eq!(
            PathPoint::new(left, Orientation::Right).neighbour(&result),
            Neighbour::Facet(1)
        );
        assert_eq!(
            PathPoint::new(left, Orientation::Left).neighbour(&result),
            Neighbour::Outside
        );
        assert_eq!(
            PathPoint::new(left, Orientation::Top).neighbour(&result),
            Neighbour::Outside
        );
    }

    #[test]
    fn deleted_facet_lookup_is_none() {
        let mut result = two_facet_result();
        result.facets[1] = None;
        assert!(result.facet(1).is_none());
        assert!(result.facet(7).is_none());
        assert_eq!(result.live_count(), 1);
        assert!(result.full_path(1).is_empty());
    }

    #[test]
    fn full_path_orients_and_repeats_joins() {
        let mut result = two_facet_result();
        result.segments = vec![
            PathSegment {
                points: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
                neighbour: Neighbour::Outside,
            },
            PathSegment {
                points: vec![Point::new(1.0, 1.0), Point::new(0.0, 1.0)],
                neighbour: Neighbour::Facet(1),
            },
        ];
        if let Some(a) = result.facet_mut(0) {
            a.border_segments = vec![
                FacetBoundarySegment {
                    segment: 0,
                    neighbour: Neighbour::Outside,
                    reversed: false,
                },
                FacetBoundarySegment {
                    segment: 1,
                    neighbour: Neighbour::Facet(1),
                    reversed: true,
                },
            ];
        }
        assert_eq!(
            result.full_path(0),
            vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(0.0, 1.0),
                Point::new(1.0, 1.0),
            ]
        );
    }
}
