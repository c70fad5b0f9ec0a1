//! Weighted linear least squares without intercept, for one or more targets

use super::{gauss::Gauss, matrix::Matrix};

/// Ridge penalty (relative to the largest diagonal entry of XᵀWX) applied
/// when the normal equations are singular. Small enough that the result
/// approaches the minimum-norm least-squares solution.
const RIDGE: f64 = 1E-9;

#[derive(Clone, Debug)]
pub struct LeastSquares {
    /// Coefficients, shape (features, targets)
    pub beta: Matrix,
}

impl LeastSquares {
    /// Minimize `sum_i w_i * ||x_i.dot(beta) - y_i||^2`
    ///
    /// * `x`: design matrix, shape (samples, features)
    /// * `y`: targets, shape (samples, targets)
    /// * `weights`: optional per-sample weights
    pub fn fit(x: &Matrix, y: &Matrix, weights: Option<&[f64]>) -> Option<Self> {
        assert_eq!(
            x.rows, y.rows,
            "design matrix has {} rows, targets have {} rows",
            x.rows, y.rows
        );
        if x.rows == 0 || x.cols == 0 {
            return None;
        }

        let x_t = match weights {
            Some(w) => x.scale_rows(w).transpose(),
            None => x.transpose(),
        };
        let cov = x_t.dot(x);
        let b = x_t.dot(y);

        if let Some(beta) = Gauss::solve(cov.clone(), b.clone()) {
            return Some(Self { beta });
        }

        log::debug!("normal equations are singular, applying ridge penalty");
        let scale = (0..cov.rows).fold(0.0f64, |acc, i| acc.max(cov[(i, i)]));
        if scale <= 0.0 {
            return None;
        }
        let mut cov = cov;
        for i in 0..cov.rows {
            cov[(i, i)] += scale * RIDGE;
        }
        Gauss::solve(cov, b).map(|beta| Self { beta })
    }

    pub fn predict(&self, x: &Matrix) -> Matrix {
        x.dot(&self.beta)
    }

    /// Coefficient of determination, averaged uniformly over targets.
    ///
    /// A target with zero variance scores 1.0 if predicted perfectly, and
    /// 0.0 otherwise.
    pub fn score(&self, x: &Matrix, y: &Matrix) -> f64 {
        let predicted = self.predict(x);
        let mut total = 0.0;
        for col in 0..y.cols {
            let actual = y.col(col).collect::<Vec<_>>();
            let mean = super::mean(&actual);
            let ss_tot = actual.iter().map(|a| (a - mean).powi(2)).sum::<f64>();
            let ss_res = actual
                .iter()
                .zip(predicted.col(col))
                .map(|(a, p)| (a - p).powi(2))
                .sum::<f64>();
            total += match (ss_tot > 0.0, ss_res > 0.0) {
                (true, _) => 1.0 - ss_res / ss_tot,
                (false, false) => 1.0,
                (false, true) => 0.0,
            };
        }
        total / y.cols as f64
    }
}
