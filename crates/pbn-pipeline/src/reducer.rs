//! Facet reduction: fold small facets into a neighbour and optionally
//! cap the total facet count.
//!
//! A removed facet is absorbed whole by one adjacent facet. The union
//! of two adjacent 4-connected regions is 4-connected, so every
//! surviving facet stays connected. Removed ids are tombstoned in the
//! arena and rewritten out of every neighbour set.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::facet::FacetResult;
use crate::geom::PixelPoint;
use crate::grid::neighbors_4;
use crate::quantize::{ColorMap, color_distance_matrix};
use crate::types::PipelineConfig;

/// How the absorbing neighbour of a removed facet is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergeTarget {
    /// The neighbour sharing the longest border; ties go to the lowest id.
    #[default]
    SharedBorder,
    /// The neighbour whose palette colour is closest; ties go to the
    /// longer shared border, then the lowest id.
    ClosestColor,
}

impl MergeTarget {
    /// All variants in display order.
    pub const ALL: [Self; 2] = [Self::SharedBorder, Self::ClosestColor];
}

impl fmt::Display for MergeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedBorder => write!(f, "SharedBorder"),
            Self::ClosestColor => write!(f, "ClosestColor"),
        }
    }
}

/// Counts reported by [`reduce_facets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionStats {
    /// Live facets before reduction.
    pub facets_before: usize,
    /// Live facets after reduction.
    pub facets_after: usize,
    /// Facets removed for being below the size threshold.
    pub removed_small: usize,
    /// Facets removed to honour the facet cap.
    pub removed_for_cap: usize,
}

/// Merge facets smaller than `min_facet_size` and enforce
/// `max_facet_count`.
///
/// The first pass visits facets sorted by size (largest first when
/// `merge_largest_first`), removing any still below the threshold.
/// The second pass removes the smallest facet until the cap holds.
/// The colour map's indices are rewritten to match the absorbing
/// facet's colour. A facet without neighbours is never removed.
pub fn reduce_facets(
    result: &mut FacetResult,
    color_map: &mut ColorMap,
    config: &PipelineConfig,
    progress: &mut dyn FnMut(f64),
) -> ReductionStats {
    let distances = color_distance_matrix(&color_map.palette);
    let facets_before = result.live_count();
    let mut live = facets_before;

    let mut order: Vec<(usize, usize)> = result
        .live_facets()
        .map(|f| (f.point_count, f.id))
        .collect();
    if config.merge_largest_first {
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    } else {
        order.sort_unstable();
    }

    let mut removed_small = 0;
    let total = order.len().max(1);
    for (i, &(_, id)) in order.iter().enumerate() {
        let small = result
            .facet(id)
            .is_some_and(|f| f.point_count < config.min_facet_size);
        if small {
            let removed = delete_facet(result, color_map, &distances, config.merge_target, id);
            removed_small += removed;
            live -= removed;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = 0.5 * (i + 1) as f64 / total as f64;
        progress(fraction);
    }

    let mut removed_for_cap = 0;
    if let Some(max) = config.max_facet_count
        && live > max
    {
        let excess = live - max;
        let mut heap: BinaryHeap<Reverse<(usize, usize)>> = result
            .live_facets()
            .map(|f| Reverse((f.point_count, f.id)))
            .collect();
        while live > max {
            let Some(Reverse((count, id))) = heap.pop() else {
                break;
            };
            // Stale entry: deleted, or grown since it was queued.
            let Some(facet) = result.facet(id) else {
                continue;
            };
            if facet.point_count != count {
                continue;
            }
            let target = choose_target(result, &distances, config.merge_target, id);
            let removed = delete_facet(result, color_map, &distances, config.merge_target, id);
            if removed == 0 {
                continue;
            }
            removed_for_cap += removed;
            live -= removed;
            if let Some(t) = target.and_then(|t| result.facet(t)) {
                heap.push(Reverse((t.point_count, t.id)));
            }
            #[allow(clippy::cast_precision_loss)]
            let fraction = 0.5 + 0.5 * (removed_for_cap.min(excess)) as f64 / excess as f64;
            progress(fraction);
        }
    }
    progress(1.0);

    info!(
        before = facets_before,
        after = live,
        removed_small,
        removed_for_cap,
        "facet reduction finished"
    );

    ReductionStats {
        facets_before,
        facets_after: live,
        removed_small,
        removed_for_cap,
    }
}

/// Remove facet `id` by merging it into its chosen neighbour.
///
/// Returns the number of facets that disappeared: zero when `id` is
/// already gone or has no neighbours, otherwise one plus any
/// same-coloured facets swallowed by the absorbing facet.
pub fn delete_facet(
    result: &mut FacetResult,
    color_map: &mut ColorMap,
    distances: &[Vec<f64>],
    policy: MergeTarget,
    id: usize,
) -> usize {
    let Some(target) = choose_target(result, distances, policy, id) else {
        debug!(facet = id, "facet has no neighbours, kept");
        return 0;
    };
    merge_into(result, color_map, target, id);

    // Neighbours of the removed facet that share the absorbing facet's
    // colour now touch it; fold them in so facets stay maximal.
    let mut removed = 1;
    loop {
        let Some(facet) = result.facet(target) else {
            break;
        };
        let color = facet.color;
        let same = facet
            .neighbours
            .iter()
            .copied()
            .find(|&n| result.facet(n).is_some_and(|f| f.color == color));
        let Some(other) = same else {
            break;
        };
        merge_into(result, color_map, target, other);
        removed += 1;
    }
    removed
}

/// Pick the neighbour that absorbs facet `id`.
#[must_use]
pub fn choose_target(
    result: &FacetResult,
    distances: &[Vec<f64>],
    policy: MergeTarget,
    id: usize,
) -> Option<usize> {
    let facet = result.facet(id)?;
    let borders = shared_border_lengths(result, id);
    let candidates = facet
        .neighbours
        .iter()
        .copied()
        .filter_map(|n| result.facet(n).map(|f| (n, f.color)));

    match policy {
        MergeTarget::SharedBorder => candidates
            .map(|(n, _)| (n, borders.get(&n).copied().unwrap_or(0)))
            // Highest border wins; neighbours iterate ascending, so
            // `max_by` with a reversed id order keeps the lowest id.
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(n, _)| n),
        MergeTarget::ClosestColor => {
            let color_distance = |c: usize| {
                distances
                    .get(facet.color)
                    .and_then(|row| row.get(c))
                    .copied()
                    .unwrap_or(f64::INFINITY)
            };
            candidates
                .min_by(|a, b| {
                    color_distance(a.1)
                        .total_cmp(&color_distance(b.1))
                        .then_with(|| {
                            let ba = borders.get(&a.0).copied().unwrap_or(0);
                            let bb = borders.get(&b.0).copied().unwrap_or(0);
                            bb.cmp(&ba)
                        })
                        .then(a.0.cmp(&b.0))
                })
                .map(|(n, _)| n)
        }
    }
}

/// Number of pixel edges facet `id` shares with each neighbour.
fn shared_border_lengths(result: &FacetResult, id: usize) -> BTreeMap<usize, usize> {
    let mut lengths = BTreeMap::new();
    let Some(facet) = result.facet(id) else {
        return lengths;
    };
    let bbox = facet.bbox;
    for y in bbox.min_y..=bbox.max_y {
        for x in bbox.min_x..=bbox.max_x {
            if result.facet_map.get(x, y) != id {
                continue;
            }
            for n in neighbors_4(PixelPoint::new(x, y), result.width, result.height) {
                let other = result.facet_map.at(n);
                if other != id {
                    *lengths.entry(other).or_insert(0) += 1;
                }
            }
        }
    }
    lengths
}

/// Move every pixel of `victim` into `target` and tombstone `victim`.
fn merge_into(result: &mut FacetResult, color_map: &mut ColorMap, target: usize, victim: usize) {
    let Some(removed) = result.facets.get_mut(victim).and_then(Option::take) else {
        return;
    };
    let Some(target_color) = result.facet(target).map(|f| f.color) else {
        result.facets[victim] = Some(removed);
        return;
    };

    let bbox = removed.bbox;
    for y in bbox.min_y..=bbox.max_y {
        for x in bbox.min_x..=bbox.max_x {
            if result.facet_map.get(x, y) == victim {
                result.facet_map.set(x, y, target);
                color_map.indices.set(x, y, target_color);
            }
        }
    }

    for &n in &removed.neighbours {
        if n == target {
            continue;
        }
        if let Some(f) = result.facet_mut(n) {
            f.neighbours.remove(&victim);
            f.neighbours.insert(target);
        }
    }
    if let Some(t) = result.facet_mut(target) {
        t.point_count += removed.point_count;
        t.bbox = t.bbox.union(removed.bbox);
        t.neighbours.remove(&victim);
        t.neighbours
            .extend(removed.neighbours.iter().copied().filter(|&n| n != target));
    }
    debug!(
        facet = victim,
        into = target,
        pixels = removed.point_count,
        "facet merged"
    );
}
