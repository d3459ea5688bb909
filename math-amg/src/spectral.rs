//! Spectral radius estimates for damping and Chebyshev parameters
//!
//! Uses a fixed number of power-iteration steps from a seeded random start
//! vector, so the estimate is reproducible but approximate. Power iteration
//! approaches ρ from below; callers that need an upper bound (Chebyshev)
//! inflate the estimate, callers that only need a damping scale
//! (ω = 4/3 / ρ) accept the slight overestimate of ω.

use crate::blas_helpers::norm2;
use crate::sparse::CsrMatrix;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default number of power iterations
pub const DEFAULT_POWER_ITERATIONS: usize = 15;

const POWER_ITERATION_SEED: u64 = 0x5eed_a11c;

/// Estimate the spectral radius of an operator given as a closure
pub fn power_iteration<F>(n: usize, iterations: usize, apply: F) -> f64
where
    F: Fn(&Array1<f64>) -> Array1<f64>,
{
    if n == 0 {
        return 0.0;
    }

    let mut rng = StdRng::seed_from_u64(POWER_ITERATION_SEED);
    let mut x: Array1<f64> = Array1::from_iter((0..n).map(|_| rng.random_range(0.5..1.5)));
    let x_norm = norm2(&x);
    x.mapv_inplace(|v| v / x_norm);

    let mut estimate = 0.0;
    for _ in 0..iterations.max(1) {
        let y = apply(&x);
        let y_norm = norm2(&y);
        if !y_norm.is_finite() || y_norm == 0.0 {
            return estimate;
        }
        estimate = y_norm;
        x = y / y_norm;
    }

    estimate
}

/// Estimate ρ(A)
pub fn spectral_radius(a: &CsrMatrix, iterations: usize) -> f64 {
    power_iteration(a.num_rows, iterations, |x| a.matvec(x))
}

/// Estimate ρ(D⁻¹A) given the inverse diagonal
pub fn dinv_a_spectral_radius(a: &CsrMatrix, diag_inv: &Array1<f64>, iterations: usize) -> f64 {
    power_iteration(a.num_rows, iterations, |x| a.matvec(x) * diag_inv)
}

/// Inverse diagonal with zero diagonal entries mapped to zero
///
/// Rows with a vanishing diagonal are skipped by the point smoothers instead
/// of producing infinities.
pub fn inverse_diagonal(a: &CsrMatrix) -> Array1<f64> {
    a.diagonal()
        .mapv(|d| if d.abs() > f64::MIN_POSITIVE { 1.0 / d } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_diagonal_matrix_radius() {
        let a = CsrMatrix::from_diagonal(&array![1.0, 3.0, 7.0, 2.0]);
        let rho = spectral_radius(&a, 60);
        assert_relative_eq!(rho, 7.0, max_relative = 1e-6);
    }

    #[test]
    fn test_dinv_a_is_bounded_by_two_for_laplacian() {
        let n = 40;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
        }
        let a = CsrMatrix::from_triplets(n, n, triplets).unwrap();
        let dinv = inverse_diagonal(&a);

        let rho = dinv_a_spectral_radius(&a, &dinv, DEFAULT_POWER_ITERATIONS);
        assert!(rho > 1.5 && rho <= 2.0 + 1e-12, "rho = {rho}");
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let a = CsrMatrix::from_dense(&array![[4.0, 1.0], [1.0, 3.0]], 0.0);
        assert_eq!(spectral_radius(&a, 10), spectral_radius(&a, 10));
    }

    #[test]
    fn test_inverse_diagonal_skips_zero() {
        let a = CsrMatrix::from_dense(&array![[2.0, 1.0], [1.0, 0.0]], 0.0);
        assert_eq!(inverse_diagonal(&a), array![0.5, 0.0]);
    }
}
