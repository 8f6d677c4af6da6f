//! Asymptotic variance of the three-fold characteristic and coefficient
//! effects.
//!
//! Each effect is a product of a mean difference and a coefficient vector,
//! so its variance combines the coefficient covariance of the fitted models
//! with the sampling covariance of the group means:
//!
//! ```text
//! Var(char) = ΔX̄ᵀ V(β₁) ΔX̄ + β₁ᵀ (Σ₁ + Σ₂) β₁
//! Var(coef) = X̄₂ᵀ (V(β₁) + V(β₂)) X̄₂ + Δβᵀ Σ₂ Δβ
//! ```
//!
//! where `Σg` is the covariance of group `g`'s predictor means,
//! `XcᵀXc / (n(n-1))` for the column-centred predictors `Xc`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Variance estimates for the three-fold components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreeFoldVariance {
    pub characteristic_variance: f64,
    pub coefficient_variance: f64,
}

impl ThreeFoldVariance {
    /// Standard errors `(characteristic, coefficient)`.
    pub fn standard_errors(&self) -> (f64, f64) {
        (
            self.characteristic_variance.sqrt(),
            self.coefficient_variance.sqrt(),
        )
    }
}

/// Covariance matrix of the column means of `x`. A constant column
/// contributes a zero row and column.
pub fn predictor_mean_covariance(x: ArrayView2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let p = x.ncols();
    if n < 2 {
        return Array2::zeros((p, p));
    }
    let means = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(p));
    let centered = &x - &means.insert_axis(Axis(0));
    centered.t().dot(&centered) / (n * (n - 1)) as f64
}

/// Inputs for one group: predictor means, coefficients and their covariance,
/// and the covariance of the predictor means.
pub struct GroupMoments<'a> {
    pub means: ArrayView1<'a, f64>,
    pub coefficients: ArrayView1<'a, f64>,
    pub coefficient_covariance: ArrayView2<'a, f64>,
    pub mean_covariance: ArrayView2<'a, f64>,
}

pub fn three_fold_variance(first: &GroupMoments, second: &GroupMoments) -> ThreeFoldVariance {
    let mean_gap = &first.means - &second.means;
    let coefficient_gap = &first.coefficients - &second.coefficients;

    let characteristic_variance = quadratic_form(mean_gap.view(), first.coefficient_covariance)
        + quadratic_form(
            first.coefficients,
            (&first.mean_covariance + &second.mean_covariance).view(),
        );

    let coefficient_variance = quadratic_form(
        second.means,
        (&first.coefficient_covariance + &second.coefficient_covariance).view(),
    ) + quadratic_form(coefficient_gap.view(), second.mean_covariance);

    ThreeFoldVariance {
        characteristic_variance,
        coefficient_variance,
    }
}

fn quadratic_form(v: ArrayView1<f64>, m: ArrayView2<f64>) -> f64 {
    v.dot(&m.dot(&v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn mean_covariance_of_constant_column_is_zero() {
        let x = array![[1.0, 2.0], [1.0, 4.0], [1.0, 6.0]];
        let cov = predictor_mean_covariance(x.view());
        assert_abs_diff_eq!(cov[[0, 0]], 0.0);
        assert_abs_diff_eq!(cov[[0, 1]], 0.0);
        // sample variance 4, divided by n = 3
        assert_abs_diff_eq!(cov[[1, 1]], 4.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn variance_combines_both_terms() {
        let eye = Array2::<f64>::eye(2);
        let zeros = Array2::<f64>::zeros((2, 2));
        let (first_means, first_coefficients) = (array![1.0, 3.0], array![2.0, 1.0]);
        let (second_means, second_coefficients) = (array![1.0, 1.0], array![1.0, 1.0]);
        let first = GroupMoments {
            means: first_means.view(),
            coefficients: first_coefficients.view(),
            coefficient_covariance: eye.view(),
            mean_covariance: eye.view(),
        };
        let second = GroupMoments {
            means: second_means.view(),
            coefficients: second_coefficients.view(),
            coefficient_covariance: eye.view(),
            mean_covariance: zeros.view(),
        };
        let var = three_fold_variance(&first, &second);
        // ΔX̄ = (0, 2): 4; β₁ᵀ I β₁ = 5
        assert_abs_diff_eq!(var.characteristic_variance, 9.0, epsilon = 1e-12);
        // X̄₂ᵀ 2I X̄₂ = 4; Σ₂ = 0
        assert_abs_diff_eq!(var.coefficient_variance, 4.0, epsilon = 1e-12);
        let (se_char, se_coef) = var.standard_errors();
        assert_abs_diff_eq!(se_char, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(se_coef, 2.0, epsilon = 1e-12);
    }
}
