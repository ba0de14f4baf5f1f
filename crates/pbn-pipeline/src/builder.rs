//! Facet discovery: flood-fill the colour map into facets, then link
//! adjacent facets.

use tracing::info;

use crate::facet::{Facet, FacetResult};
use crate::flood_fill::fill_with;
use crate::geom::PixelPoint;
use crate::grid::Grid;
use crate::quantize::ColorMap;

/// Facet-map value of a pixel not yet claimed by any facet.
const UNASSIGNED: usize = usize::MAX;

/// Split the colour map into maximal 4-connected same-colour facets.
///
/// Pixels are scanned row-major, so facet ids follow the position of
/// each facet's first pixel. A uniform image yields a single facet.
#[must_use]
pub fn build_facets(color_map: &ColorMap, progress: &mut dyn FnMut(f64)) -> FacetResult {
    let (width, height) = (color_map.width(), color_map.height());
    let mut facet_map = Grid::new(width, height, UNASSIGNED);
    let mut facets = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if facet_map.get(x, y) != UNASSIGNED {
                continue;
            }
            let id = facets.len();
            let color = color_map.indices.get(x, y);
            let mut facet = Facet::new(id, color, PixelPoint::new(x, y));
            // Every same-colour pixel connected to an unassigned seed is
            // itself unassigned, so the colour test alone bounds the fill.
            let count = fill_with(
                PixelPoint::new(x, y),
                width,
                height,
                |p| color_map.indices.at(p) == color,
                |p| {
                    facet_map.set(p.x, p.y, id);
                    facet.bbox.include(p);
                },
            );
            facet.point_count = count;
            facets.push(Some(facet));
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = (y + 1) as f64 / height as f64;
        progress(fraction);
    }

    let mut result = FacetResult {
        width,
        height,
        facet_map,
        facets,
        segments: Vec::new(),
    };
    build_neighbours(&mut result);

    info!(facets = result.facets.len(), "facets built");
    result
}

/// Recompute every facet's neighbour set from the facet map.
///
/// Each pixel is compared with its right and lower neighbour; any
/// differing pair links both facets.
pub fn build_neighbours(result: &mut FacetResult) {
    for facet in result.facets.iter_mut().flatten() {
        facet.neighbours.clear();
    }
    let (w, h) = (result.width, result.height);
    for y in 0..h {
        for x in 0..w {
            let here = result.facet_map.get(x, y);
            let mut link = |other: usize| {
                if other != here {
                    if let Some(Some(f)) = result.facets.get_mut(here) {
                        f.neighbours.insert(other);
                    }
                    if let Some(Some(f)) = result.facets.get_mut(other) {
                        f.neighbours.insert(here);
                    }
                }
            };
            if x + 1 < w {
                link(result.facet_map.get(x + 1, y));
            }
            if y + 1 < h {
                link(result.facet_map.get(x, y + 1));
            }
        }
    }
}
