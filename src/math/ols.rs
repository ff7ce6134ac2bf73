//! Least squares solver.
//!
//! Projection repeatedly solves small regression problems of the form:
//!
//! ```text
//! minimize Σ_i (μ_is - x_iᵀ θ_s)²     for every posterior draw s
//! ```
//!
//! The design `X` is shared by all draws, so we factor it once (SVD) and solve
//! for every right-hand-side column at the same time.
//!
//! Implementation choices:
//! - SVD handles tall designs and near-collinear columns (binary candy attributes
//!   are strongly correlated with each other).
//! - Nalgebra's `QR::solve` is intended for square systems, so it is not used here.

use nalgebra::DMatrix;

/// Solve `min ||X Θ - Y||` column by column with a single SVD of `X`.
///
/// `y` is `n × m` (one column per right-hand side); the result is `p × m`.
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares_multi(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if x.nrows() != y.nrows() || x.nrows() == 0 {
        return None;
    }
    if x.ncols() == 0 {
        return Some(DMatrix::zeros(0, y.ncols()));
    }
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(theta) = svd.solve(y, tol) {
            if theta.iter().all(|v| v.is_finite()) {
                return Some(theta);
            }
        }
    }

    None
}

/// Prepend a column of ones to `x`.
pub fn with_intercept(x: &DMatrix<f64>) -> DMatrix<f64> {
    x.clone().insert_column(0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DMatrix::from_column_slice(3, 1, &[2.0, 5.0, 8.0]);

        let beta = solve_least_squares_multi(&x, &y).unwrap();
        assert!((beta[(0, 0)] - 2.0).abs() < 1e-10);
        assert!((beta[(1, 0)] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn multi_rhs_matches_column_solves() {
        let x = with_intercept(&DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]));
        // Column 0: y = 1 + x, column 1: y = -2x.
        let y = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 2.0, -2.0, 3.0, -4.0, 4.0, -6.0]);

        let theta = solve_least_squares_multi(&x, &y).unwrap();
        assert_eq!(theta.shape(), (2, 2));
        assert!((theta[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((theta[(1, 0)] - 1.0).abs() < 1e-10);
        assert!(theta[(0, 1)].abs() < 1e-10);
        assert!((theta[(1, 1)] + 2.0).abs() < 1e-10);
    }

    #[test]
    fn intercept_column_is_prepended() {
        let x = DMatrix::from_row_slice(2, 1, &[5.0, 6.0]);
        let xi = with_intercept(&x);
        assert_eq!(xi.shape(), (2, 2));
        assert_eq!(xi[(0, 0)], 1.0);
        assert_eq!(xi[(1, 1)], 6.0);
    }
}
