//! Confidence that a candidate coordinate belongs to a reference distribution
//!
//! The reported value is the chi-squared CDF of the squared Mahalanobis
//! distance. It is close to 0 at the reference mean and approaches 1 far
//! away from it, so *lower* values are better matches.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Squared Mahalanobis distance `(x - mu)ᵗ Σ⁻¹ (x - mu)` for a diagonal
/// covariance `Σ = diag(cov)`.
///
/// Returns `None` if `Σ` is singular (a zero or undefined diagonal entry),
/// or if any input is non-finite.
pub fn mahalanobis_diagonal(x: &[f64], mu: &[f64], cov: &[f64]) -> Option<f64> {
    assert!(
        x.len() == mu.len() && mu.len() == cov.len(),
        "dimension mismatch: x={}, mu={}, cov={}",
        x.len(),
        mu.len(),
        cov.len()
    );
    let mut d2 = 0.0;
    for ((x, mu), var) in x.iter().zip(mu).zip(cov) {
        if *var == 0.0 || !var.is_finite() {
            return None;
        }
        d2 += (x - mu).powi(2) / var;
    }
    d2.is_finite().then(|| d2)
}

/// Probability for a candidate at `x` against a reference with mean `mu`
/// and per-dimension spread `sigma`.
///
/// `sigma` is placed on the diagonal of the covariance matrix as-is. The
/// acceptance thresholds used during matching are calibrated against this
/// convention.
pub fn match_probability(x: &[f64], mu: &[f64], sigma: &[f64]) -> Option<f64> {
    if mu.is_empty() {
        return None;
    }
    let d2 = mahalanobis_diagonal(x, mu, sigma)?;
    let chi2 = ChiSquared::new(mu.len() as f64).ok()?;
    Some(chi2.cdf(d2))
}
