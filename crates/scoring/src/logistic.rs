//! Default classifier: L2-regularised logistic regression on standardised
//! features, fitted by full-batch gradient descent.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::{Classifier, FeatureMatrix, ProbabilityModel};
use crate::error::{Result, ScoringError};

/// Columns with a smaller standard deviation are left unscaled.
const MIN_STD: f64 = 1e-12;

/// Logistic regression hyper-parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularisation strength; smaller values regularise more.
    pub c: f64,

    /// Gradient descent iteration cap.
    pub max_iter: usize,

    /// Stop once the gradient norm falls below this.
    pub tolerance: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tolerance: 1e-6,
        }
    }
}

/// Per-column mean and standard deviation.
struct StandardScaler {
    mean: DVector<f64>,
    std: DVector<f64>,
}

impl StandardScaler {
    fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows() as f64;
        let mean = DVector::from_fn(x.ncols(), |j, _| x.column(j).sum() / n);
        let std = DVector::from_fn(x.ncols(), |j, _| {
            let m = mean[j];
            let var = x.column(j).iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let s = var.sqrt();
            if s < MIN_STD {
                1.0
            } else {
                s
            }
        });
        Self { mean, std }
    }

    fn transform(&self, x: &mut DMatrix<f64>) {
        for (j, mut col) in x.column_iter_mut().enumerate() {
            let (m, s) = (self.mean[j], self.std[j]);
            col.apply(|v| *v = (*v - m) / s);
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Largest eigenvalue of `xᵀx / n`, the curvature bound for the step size.
fn max_curvature(x: &DMatrix<f64>) -> f64 {
    let gram = (x.transpose() * x) / x.nrows() as f64;
    SymmetricEigen::new(gram)
        .eigenvalues
        .iter()
        .copied()
        .fold(0.0, f64::max)
}

impl Classifier for LogisticRegression {
    type Model = LogisticModel;

    fn fit(&self, positive: FeatureMatrix<'_>, negative: FeatureMatrix<'_>) -> Result<LogisticModel> {
        if positive.cols() != negative.cols() {
            return Err(ScoringError::dimension_mismatch(positive.cols(), negative.cols()));
        }
        let (n_pos, n_neg) = (positive.rows(), negative.rows());
        if n_pos < 2 || n_neg < 2 {
            return Err(ScoringError::InsufficientTrainingData {
                positive: n_pos,
                negative: n_neg,
            });
        }
        if !(self.c > 0.0) {
            return Err(ScoringError::model(format!("c must be > 0, got {}", self.c)));
        }

        let n = n_pos + n_neg;
        let d = positive.cols();
        let mut x = DMatrix::<f64>::from_fn(n, d, |i, j| {
            let row = if i < n_pos {
                positive.row(i)
            } else {
                negative.row(i - n_pos)
            };
            row[j] as f64
        });
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::model("training features contain non-finite values"));
        }
        let y = DVector::<f64>::from_fn(n, |i, _| if i < n_pos { 1.0 } else { 0.0 });

        let scaler = StandardScaler::fit(&x);
        scaler.transform(&mut x);

        let reg = 1.0 / (self.c * n as f64);
        // The intercept column adds at most 1 to the curvature bound.
        let lipschitz = 0.25 * (max_curvature(&x) + 1.0) + reg;
        let step = 1.0 / lipschitz;

        let mut w = DVector::<f64>::zeros(d);
        let mut b = 0.0;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            let z = &x * &w;
            let residual = DVector::from_fn(n, |i, _| sigmoid(z[i] + b) - y[i]);

            let grad_w = x.tr_mul(&residual) / n as f64 + &w * reg;
            let grad_b = residual.sum() / n as f64;

            let norm = (grad_w.norm_squared() + grad_b * grad_b).sqrt();
            if norm < self.tolerance {
                converged = true;
                break;
            }

            w -= grad_w * step;
            b -= grad_b * step;
            iterations += 1;
        }

        if !converged {
            warn!(iterations, "Logistic regression did not converge");
        }
        debug!(
            n_positive = n_pos,
            n_negative = n_neg,
            features = d,
            iterations,
            "Fitted logistic regression"
        );

        // Fold standardisation into the coefficients.
        let weights: Vec<f64> = (0..d).map(|j| w[j] / scaler.std[j]).collect();
        let intercept = b - (0..d).map(|j| weights[j] * scaler.mean[j]).sum::<f64>();

        Ok(LogisticModel {
            weights,
            intercept,
            iterations,
            converged,
        })
    }
}

/// A fitted logistic model on raw (unstandardised) features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    weights: Vec<f64>,
    intercept: f64,
    iterations: usize,
    converged: bool,
}

impl LogisticModel {
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Gradient steps taken during fitting.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    fn decision(&self, row: &[f32]) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.weights)
                .map(|(x, w)| *x as f64 * w)
                .sum::<f64>()
    }
}

impl ProbabilityModel for LogisticModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba(&self, features: FeatureMatrix<'_>) -> Result<Vec<f32>> {
        if features.cols() != self.weights.len() {
            return Err(ScoringError::dimension_mismatch(
                self.weights.len(),
                features.cols(),
            ));
        }
        Ok(features
            .iter_rows()
            .map(|row| sigmoid(self.decision(row)) as f32)
            .collect())
    }
}
