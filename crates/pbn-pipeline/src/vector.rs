//! Weighted N-dimensional vectors used as clustering input and centroids.

use crate::types::PipelineError;

/// An N-dimensional point with a frequency weight and an opaque tag.
///
/// The tag rides along through clustering (typically the colour the
/// vector was built from) and never takes part in the arithmetic.
/// `Clone` produces an independent deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T> {
    /// Component values.
    pub values: Vec<f64>,
    /// Relative weight used by [`average`].
    pub weight: f64,
    /// Caller data carried alongside the values.
    pub tag: T,
}

impl<T> Vector<T> {
    /// A vector with weight 1.
    #[must_use]
    pub const fn new(values: Vec<f64>, tag: T) -> Self {
        Self {
            values,
            weight: 1.0,
            tag,
        }
    }

    /// A vector with an explicit weight.
    #[must_use]
    pub const fn weighted(values: Vec<f64>, weight: f64, tag: T) -> Self {
        Self {
            values,
            weight,
            tag,
        }
    }

    /// Number of components.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to `other`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] when the two vectors
    /// have a different number of components.
    pub fn distance_to<U>(&self, other: &Vector<U>) -> Result<f64, PipelineError> {
        Ok(self.distance_squared_to(other)?.sqrt())
    }

    /// Squared Euclidean distance to `other`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] on differing lengths.
    pub fn distance_squared_to<U>(&self, other: &Vector<U>) -> Result<f64, PipelineError> {
        check_dimensions(self.values.len(), other.values.len())?;
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum())
    }
}

const fn check_dimensions(expected: usize, found: usize) -> Result<(), PipelineError> {
    if expected == found {
        Ok(())
    } else {
        Err(PipelineError::DimensionMismatch { expected, found })
    }
}

/// Weight-weighted component-wise mean of `vectors`.
///
/// The result's weight is the summed input weight. When every weight
/// is zero the inputs count equally.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyVectorSet`] for an empty slice and
/// [`PipelineError::DimensionMismatch`] when the inputs disagree on
/// dimensionality.
pub fn average<T>(vectors: &[Vector<T>]) -> Result<Vector<()>, PipelineError> {
    average_refs(vectors.iter())
}

/// [`average`] over borrowed vectors, avoiding a copy when the caller
/// has only a selection of a larger set.
///
/// # Errors
///
/// Same as [`average`].
pub fn average_refs<'a, T: 'a>(
    vectors: impl IntoIterator<Item = &'a Vector<T>>,
) -> Result<Vector<()>, PipelineError> {
    let vectors: Vec<&Vector<T>> = vectors.into_iter().collect();
    let first = vectors.first().ok_or(PipelineError::EmptyVectorSet)?;
    let dims = first.values.len();

    let total_weight: f64 = vectors.iter().map(|v| v.weight).sum();
    let uniform = total_weight <= 0.0;

    let mut sums = vec![0.0; dims];
    for v in &vectors {
        check_dimensions(dims, v.values.len())?;
        let w = if uniform { 1.0 } else { v.weight };
        for (sum, value) in sums.iter_mut().zip(&v.values) {
            *sum += value * w;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let divisor = if uniform {
        vectors.len() as f64
    } else {
        total_weight
    };
    for sum in &mut sums {
        *sum /= divisor;
    }

    Ok(Vector::weighted(sums, total_weight, ()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Vector::new(vec![0.0, 0.0, 0.0], ());
        let b = Vector::new(vec![1.0, 2.0, 2.0], "tag");
        assert!((a.distance_to(&b).unwrap() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn distance_dimension_mismatch() {
        let a = Vector::new(vec![0.0, 0.0], ());
        let b = Vector::new(vec![1.0, 2.0, 2.0], ());
        assert!(matches!(
            a.distance_to(&b),
            Err(PipelineError::DimensionMismatch {
                expected: 2,
                found: 3,
            })
        ));
    }

    #[test]
    fn average_is_weighted() {
        let vectors = vec![
            Vector::weighted(vec![0.0, 10.0], 3.0, 'a'),
            Vector::weighted(vec![4.0, 2.0], 1.0, 'b'),
        ];
        let avg = average(&vectors).unwrap();
        assert!((avg.values[0] - 1.0).abs() < f64::EPSILON);
        assert!((avg.values[1] - 8.0).abs() < f64::EPSILON);
        assert!((avg.weight - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn average_of_zero_weights_is_plain_mean() {
        let vectors = vec![
            Vector::weighted(vec![2.0], 0.0, ()),
            Vector::weighted(vec![4.0], 0.0, ()),
        ];
        let avg = average(&vectors).unwrap();
        assert!((avg.values[0] - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn average_empty_fails() {
        let empty: Vec<Vector<()>> = Vec::new();
        assert!(matches!(average(&empty), Err(PipelineError::EmptyVectorSet)));
    }

    #[test]
    fn average_mismatched_fails() {
        let vectors = vec![Vector::new(vec![1.0, 2.0], ()), Vector::new(vec![1.0], ())];
        assert!(matches!(
            average(&vectors),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn clone_is_independent() {
        let original = Vector::new(vec![1.0, 2.0], vec![7_u8]);
        let mut copy = original.clone();
        copy.values[0] = 99.0;
        copy.tag.push(8);
        assert!((original.values[0] - 1.0).abs() < f64::EPSILON);
        assert_eq!(original.tag, vec![7]);
    }
}
