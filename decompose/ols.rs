//! # Ordinary Least Squares
//!
//! The regression collaborator of the decomposition engine. A fit solves
//! `min ||y - Xβ||²` through a thin QR factorization of the design matrix
//! (`X = QR`, so `β = R⁻¹Qᵀy`), which avoids squaring the condition number
//! the way the normal equations do. The same factor gives the coefficient
//! covariance `σ²(XᵀX)⁻¹ = σ²R⁻¹R⁻ᵀ`.
//!
//! Rank deficiency is detected on the diagonal of `R` and reported as an
//! error. A collinear design never yields NaN or arbitrary coefficients. An
//! exactly determined design (`n == p`) is solved, but its covariance is NaN.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::QR;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OlsError {
    #[error(
        "The design matrix is rank deficient (rank {rank} of {columns} columns). The predictors are perfectly collinear."
    )]
    SingularDesignMatrix { rank: usize, columns: usize },

    #[error("Response has {response} observations but the design matrix has {design} rows.")]
    DimensionMismatch { response: usize, design: usize },

    #[error("QR decomposition failed: {0}")]
    LinalgError(#[from] ndarray_linalg::error::LinalgError),
}

/// The result of one OLS fit. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// One coefficient per design column, in column order.
    pub coefficients: Array1<f64>,
    /// Coefficient covariance `σ²(XᵀX)⁻¹`. Shape: [n_coefficients, n_coefficients].
    pub covariance: Array2<f64>,
    /// Residual variance `σ² = SSR / (n - p)`, NaN when `n == p`.
    pub residual_variance: f64,
    pub n_obs: usize,
}

impl FittedModel {
    /// Standard errors of the coefficients.
    pub fn standard_errors(&self) -> Array1<f64> {
        self.covariance.diag().mapv(f64::sqrt)
    }

    /// Whether `σ²` and the covariance are defined, i.e. `n > p`.
    pub fn has_residual_degrees_of_freedom(&self) -> bool {
        self.n_obs > self.coefficients.len()
    }
}

/// Fits `y = Xβ + ε` by least squares. `x` must already contain any
/// intercept column the caller wants.
pub fn fit(y: ArrayView1<f64>, x: ArrayView2<f64>) -> Result<FittedModel, OlsError> {
    let (n, p) = x.dim();
    if y.len() != n {
        return Err(OlsError::DimensionMismatch {
            response: y.len(),
            design: n,
        });
    }
    if n < p {
        return Err(OlsError::SingularDesignMatrix {
            rank: n,
            columns: p,
        });
    }

    let (q, r) = x.to_owned().qr()?;

    let rank = numerical_rank(&r, n.max(p));
    log::debug!("OLS fit on {n}x{p} design: numerical rank {rank}");
    if rank < p {
        return Err(OlsError::SingularDesignMatrix { rank, columns: p });
    }
    let qty = q.t().dot(&y);
    let coefficients = internal::back_substitute(&r, &qty);

    // An exactly determined fit has no residual degrees of freedom: the
    // coefficients are exact but σ² and the covariance are undefined.
    let (residual_variance, covariance) = if n > p {
        let residuals = &y - &x.dot(&coefficients);
        let ssr = residuals.dot(&residuals);
        let residual_variance = ssr / (n - p) as f64;
        let r_inv = internal::upper_triangular_inverse(&r);
        (residual_variance, r_inv.dot(&r_inv.t()) * residual_variance)
    } else {
        log::debug!("OLS fit on {n}x{p} design is exactly determined; covariance is undefined");
        (f64::NAN, Array2::from_elem((p, p), f64::NAN))
    };

    Ok(FittedModel {
        coefficients,
        covariance,
        residual_variance,
        n_obs: n,
    })
}

/// Counts diagonal entries of `R` above `max(n, p) · ε · max|r_ii|`.
fn numerical_rank(r: &Array2<f64>, scale: usize) -> usize {
    let diag = r.diag();
    let largest = diag.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if largest == 0.0 {
        return 0;
    }
    let tolerance = scale as f64 * f64::EPSILON * largest;
    diag.iter().filter(|v| v.abs() > tolerance).count()
}

mod internal {
    use super::*;

    /// Solves `Rβ = b` for upper-triangular `R` with a non-zero diagonal.
    pub(super) fn back_substitute(r: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
        let p = r.ncols();
        let mut beta = Array1::<f64>::zeros(p);
        for i in (0..p).rev() {
            let mut acc = b[i];
            for j in (i + 1)..p {
                acc -= r[[i, j]] * beta[j];
            }
            beta[i] = acc / r[[i, i]];
        }
        beta
    }

    /// Inverts an upper-triangular matrix column by column.
    pub(super) fn upper_triangular_inverse(r: &Array2<f64>) -> Array2<f64> {
        let p = r.ncols();
        let mut inv = Array2::<f64>::zeros((p, p));
        let mut unit = Array1::<f64>::zeros(p);
        for col in 0..p {
            unit.fill(0.0);
            unit[col] = 1.0;
            inv.column_mut(col).assign(&back_substitute(r, &unit));
        }
        inv
    }
}
