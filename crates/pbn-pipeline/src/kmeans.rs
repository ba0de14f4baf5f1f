//! Lloyd's k-means over weighted [`Vector`]s.
//!
//! The caller owns the iteration loop: construct with [`KMeans::new`],
//! then call [`KMeans::step`] until [`KMeans::has_converged`] or an
//! iteration budget runs out. Randomness enters only through the PRNG
//! passed to `new`, so a seeded generator reproduces the same centroids
//! and assignments bit for bit.

use rand::Rng;
use tracing::warn;

use crate::types::PipelineError;
use crate::vector::{Vector, average_refs};

/// Clustering state: centroids plus the latest point assignment.
#[derive(Debug, Clone)]
pub struct KMeans<'a, T> {
    points: &'a [Vector<T>],
    centroids: Vec<Vector<()>>,
    assignments: Vec<usize>,
    delta: f64,
    iteration: usize,
}

impl<'a, T> KMeans<'a, T> {
    /// Pick `k` initial centroids from `points` using `rng`.
    ///
    /// Centroids are distinct input points when `k <= points.len()`;
    /// otherwise every point is used once and the remainder are drawn
    /// with replacement.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSettings`] for `k == 0`,
    /// [`PipelineError::EmptyVectorSet`] when `points` is empty and
    /// [`PipelineError::DimensionMismatch`] when the points disagree on
    /// dimensionality.
    pub fn new<R: Rng + ?Sized>(
        points: &'a [Vector<T>],
        k: usize,
        rng: &mut R,
    ) -> Result<Self, PipelineError> {
        if k == 0 {
            return Err(PipelineError::InvalidSettings(
                "k-means needs at least one cluster".to_string(),
            ));
        }
        let first = points.first().ok_or(PipelineError::EmptyVectorSet)?;
        let dims = first.dimensions();
        if let Some(bad) = points.iter().find(|p| p.dimensions() != dims) {
            return Err(PipelineError::DimensionMismatch {
                expected: dims,
                found: bad.dimensions(),
            });
        }

        let n = points.len();
        let mut picks = rand::seq::index::sample(rng, n, k.min(n)).into_vec();
        while picks.len() < k {
            picks.push(rng.gen_range(0..n));
        }

        let centroids = picks
            .into_iter()
            .map(|i| Vector::new(points[i].values.clone(), ()))
            .collect();

        Ok(Self {
            points,
            centroids,
            assignments: vec![0; n],
            delta: f64::INFINITY,
            iteration: 0,
        })
    }

    /// Run one assignment + update round.
    ///
    /// Each point joins the nearest centroid (the lowest index wins a
    /// tie). Each centroid moves to the weighted mean of its points; a
    /// centroid with no points stays where it is. The largest centroid
    /// displacement becomes the new delta.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError::DimensionMismatch`], which cannot
    /// occur for points accepted by [`new`](Self::new).
    pub fn step(&mut self) -> Result<(), PipelineError> {
        for (point, slot) in self.points.iter().zip(self.assignments.iter_mut()) {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (i, centroid) in self.centroids.iter().enumerate() {
                let d = point.distance_squared_to(centroid)?;
                if d < best_distance {
                    best_distance = d;
                    best = i;
                }
            }
            *slot = best;
        }

        let mut delta: f64 = 0.0;
        let mut empty = 0_usize;
        for (k, centroid) in self.centroids.iter_mut().enumerate() {
            let members = self
                .points
                .iter()
                .zip(&self.assignments)
                .filter(|&(_, &a)| a == k)
                .map(|(p, _)| p);
            match average_refs(members) {
                Ok(updated) => {
                    delta = delta.max(centroid.distance_to(&updated)?);
                    *centroid = updated;
                }
                Err(PipelineError::EmptyVectorSet) => empty += 1,
                Err(e) => return Err(e),
            }
        }
        if empty > 0 {
            warn!(
                iteration = self.iteration,
                empty_clusters = empty,
                "k-means clusters received no points"
            );
        }

        self.delta = delta;
        self.iteration += 1;
        Ok(())
    }

    /// Whether the last step moved every centroid by less than
    /// `threshold`. Always `false` before the first step.
    #[must_use]
    pub fn has_converged(&self, threshold: f64) -> bool {
        self.delta < threshold
    }

    /// Current centroids. The count never changes after construction.
    #[must_use]
    pub fn centroids(&self) -> &[Vector<()>] {
        &self.centroids
    }

    /// Centroid index of each input point after the last step.
    #[must_use]
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// Largest centroid displacement of the last step.
    #[must_use]
    pub const fn delta(&self) -> f64 {
        self.delta
    }

    /// Number of completed steps.
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn two_blobs() -> Vec<Vector<usize>> {
        let mut points = Vec::new();
        for i in 0..10_u8 {
            let jitter = f64::from(i) * 0.1;
            points.push(Vector::new(vec![jitter, jitter], usize::from(i)));
            points.push(Vector::new(
                vec![100.0 + jitter, 100.0 - jitter],
                100 + usize::from(i),
            ));
        }
        points
    }

    fn run(points: &[Vector<usize>], seed: u64) -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut km = KMeans::new(points, 3, &mut rng).unwrap();
        while km.iteration() < 50 {
            km.step().unwrap();
            if km.has_converged(1e-9) {
                break;
            }
        }
        let centroids = km.centroids().iter().map(|c| c.values.clone()).collect();
        (centroids, km.assignments().to_vec())
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let points = two_blobs();
        for seed in [0, 1, 42, 9_999] {
            let (c1, a1) = run(&points, seed);
            let (c2, a2) = run(&points, seed);
            assert_eq!(a1, a2);
            for (x, y) in c1.iter().zip(&c2) {
                for (a, b) in x.iter().zip(y) {
                    assert_eq!(a.to_bits(), b.to_bits());
                }
            }
        }
    }

    #[test]
    fn separates_two_blobs() {
        let points = two_blobs();
        let mut rng = StdRng::seed_from_u64(7);
        let mut km = KMeans::new(&points, 2, &mut rng).unwrap();
        for _ in 0..20 {
            km.step().unwrap();
        }
        let a = km.assignments();
        // Even indices are the low blob, odd the high blob.
        let low = a[0];
        for (i, &cluster) in a.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(cluster, low);
            } else {
                assert_ne!(cluster, low);
            }
        }
        assert!(km.has_converged(1e-9));
    }

    #[test]
    fn not_converged_before_first_step() {
        let points = two_blobs();
        let mut rng = StdRng::seed_from_u64(0);
        let km = KMeans::new(&points, 2, &mut rng).unwrap();
        assert!(!km.has_converged(1.0));
    }

    #[test]
    fn more_clusters_than_points_keeps_count() {
        let points = vec![Vector::new(vec![0.0], ()), Vector::new(vec![5.0], ())];
        let mut rng = StdRng::seed_from_u64(3);
        let mut km = KMeans::new(&points, 4, &mut rng).unwrap();
        km.step().unwrap();
        assert_eq!(km.centroids().len(), 4);
        assert_eq!(km.assignments().len(), 2);
    }

    #[test]
    fn empty_cluster_does_not_move() {
        // Identical points: every centroid starts at 1.0, the first one
        // wins every tie and the rest stay empty.
        let points = vec![Vector::new(vec![1.0], ()); 3];
        let mut rng = StdRng::seed_from_u64(11);
        let mut km = KMeans::new(&points, 2, &mut rng).unwrap();
        km.step().unwrap();
        assert_eq!(km.assignments(), &[0, 0, 0]);
        assert!((km.centroids()[1].values[0] - 1.0).abs() < f64::EPSILON);
        assert!(km.has_converged(f64::EPSILON));
    }

    #[test]
    fn rejects_empty_input() {
        let points: Vec<Vector<()>> = Vec::new();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            KMeans::new(&points, 2, &mut rng),
            Err(PipelineError::EmptyVectorSet)
        ));
    }

    #[test]
    fn rejects_mixed_dimensions() {
        let points = vec![Vector::new(vec![0.0, 1.0], ()), Vector::new(vec![0.0], ())];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            KMeans::new(&points, 2, &mut rng),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }
}
