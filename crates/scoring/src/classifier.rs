//! Classifier capability.
//!
//! Scoring is written against two traits so the numeric model can be swapped:
//! a [`Classifier`] fits positive against negative embeddings and yields a
//! [`ProbabilityModel`], which maps feature rows to presence probabilities.

use crate::error::{Result, ScoringError};

/// A borrowed row-major feature matrix.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatrix<'a> {
    data: &'a [f32],
    cols: usize,
}

impl<'a> FeatureMatrix<'a> {
    /// View `data` as rows of `cols` features.
    pub fn new(data: &'a [f32], cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(ScoringError::dimension_mismatch(1, 0));
        }
        if data.len() % cols != 0 {
            return Err(ScoringError::DimensionMismatch {
                expected: (data.len() / cols + 1) * cols,
                actual: data.len(),
            });
        }
        Ok(Self { data, cols })
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.cols
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> &'a [f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &'a [f32]> {
        self.data.chunks_exact(self.cols)
    }

    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }
}

/// A fitted model producing presence probabilities.
pub trait ProbabilityModel: Send + Sync {
    /// Number of features each row must have.
    fn n_features(&self) -> usize;

    /// Probability of the positive class for each row, in `[0, 1]`.
    fn predict_proba(&self, features: FeatureMatrix<'_>) -> Result<Vec<f32>>;
}

/// Fits a [`ProbabilityModel`] from labelled embeddings.
pub trait Classifier {
    type Model: ProbabilityModel;

    /// Fit positive (occurrence) against negative (background) rows.
    fn fit(&self, positive: FeatureMatrix<'_>, negative: FeatureMatrix<'_>) -> Result<Self::Model>;
}

impl<M: ProbabilityModel + ?Sized> ProbabilityModel for Box<M> {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn predict_proba(&self, features: FeatureMatrix<'_>) -> Result<Vec<f32>> {
        (**self).predict_proba(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_matrix_rows() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = FeatureMatrix::new(&data, 3).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.iter_rows().count(), 2);
    }

    #[test]
    fn test_feature_matrix_rejects_ragged_data() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!(matches!(
            FeatureMatrix::new(&data, 3),
            Err(ScoringError::DimensionMismatch { .. })
        ));
        assert!(FeatureMatrix::new(&data, 0).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let m = FeatureMatrix::new(&[], 4).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.rows(), 0);
    }
}
