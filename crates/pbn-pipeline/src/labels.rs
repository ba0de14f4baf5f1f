//! Label anchors for every live facet.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::facet::FacetResult;
use crate::polylabel::{point_in_polygon, polylabel};
use crate::types::Point;

/// Search precision for label anchors, in pixels.
pub const LABEL_PRECISION: f64 = 1.0;

/// Where a facet's number goes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelPlacement {
    /// Anchor point in wall space.
    pub point: Point,
    /// Distance from the anchor to the nearest border.
    pub distance: f64,
    /// Top-left corner of the square the label may occupy.
    pub bounds_min: Point,
    /// Bottom-right corner of that square.
    pub bounds_max: Point,
}

impl LabelPlacement {
    /// Build a placement from a pole of inaccessibility.
    ///
    /// The label square has half-size `2 * sqrt(2 * distance)`.
    #[must_use]
    pub fn new(point: Point, distance: f64) -> Self {
        let half = if distance > 0.0 {
            2.0 * (2.0 * distance).sqrt()
        } else {
            0.0
        };
        Self {
            point,
            distance,
            bounds_min: Point::new(point.x - half, point.y - half),
            bounds_max: Point::new(point.x + half, point.y + half),
        }
    }

    /// Whether the anchor is usable at all.
    #[must_use]
    pub fn is_plottable(&self) -> bool {
        self.distance.is_finite() && self.distance > 0.0
    }

    /// Width of the label square.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.bounds_max.x - self.bounds_min.x
    }

    /// Height of the label square.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.bounds_max.y - self.bounds_min.y
    }
}

/// Counts reported by [`place_labels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelStats {
    /// Facets that received a plottable label.
    pub labeled: usize,
    /// Facets whose best anchor is unusable.
    pub unplottable: usize,
    /// Neighbours treated as holes over all facets.
    pub holes: usize,
}

/// Choose a label anchor for every live facet.
///
/// Neighbours lying wholly inside a facet are passed to the search as
/// holes so the anchor does not land on an enclosed island.
pub fn place_labels(result: &mut FacetResult, progress: &mut dyn FnMut(f64)) -> LabelStats {
    let ids: Vec<usize> = result.live_facets().map(|f| f.id).collect();
    let mut stats = LabelStats {
        labeled: 0,
        unplottable: 0,
        holes: 0,
    };

    let total = ids.len().max(1);
    for (i, &id) in ids.iter().enumerate() {
        let rings = facet_rings(result, id);
        stats.holes += rings.len().saturating_sub(1);

        let pole = polylabel(&rings, LABEL_PRECISION);
        let placement = LabelPlacement::new(pole.point, pole.distance);
        if placement.is_plottable() {
            stats.labeled += 1;
        } else {
            debug!(facet = id, distance = pole.distance, "label not plottable");
            stats.unplottable += 1;
        }
        if let Some(facet) = result.facet_mut(id) {
            facet.label = Some(placement);
        }

        #[allow(clippy::cast_precision_loss)]
        let fraction = (i + 1) as f64 / total as f64;
        progress(fraction);
    }

    info!(
        labeled = stats.labeled,
        unplottable = stats.unplottable,
        holes = stats.holes,
        "labels placed"
    );
    stats
}

/// The facet's outline followed by the outlines of neighbours it
/// fully encloses.
fn facet_rings(result: &FacetResult, id: usize) -> Vec<Vec<Point>> {
    let Some(facet) = result.facet(id) else {
        return Vec::new();
    };
    let outer = result.full_path(id);
    if outer.is_empty() {
        return Vec::new();
    }
    let outer_ring = std::slice::from_ref(&outer);

    let mut holes = Vec::new();
    for &n in &facet.neighbours {
        let Some(neighbour) = result.facet(n) else {
            continue;
        };
        if !facet.bbox.contains_box(&neighbour.bbox) {
            continue;
        }
        let path = result.full_path(n);
        if !path.is_empty() && path.iter().all(|&p| point_in_polygon(p, outer_ring)) {
            holes.push(path);
        }
    }
    let mut rings = vec![outer];
    rings.extend(holes);
    rings
}
