//! LU decomposition solver
//!
//! Dense LU factorization with partial pivoting, used for the exact solve on
//! the coarsest level of a hierarchy. The factorization is computed once at
//! setup and reused by every cycle.

use crate::error::{AmgError, Result};
use ndarray::{Array1, Array2};

/// Pivot magnitude, relative to the largest entry, treated as zero
const SINGULAR_PIVOT_TOL: f64 = 1e-13;

/// LU factorization result
///
/// Stores L and U factors along with pivot information
#[derive(Debug, Clone)]
pub struct LuFactorization {
    /// Combined L and U matrices (L is unit lower triangular, stored below diagonal)
    lu: Array2<f64>,
    /// Row permutation: row `k` of `LU` is row `perm[k]` of the input
    perm: Vec<usize>,
    /// Matrix dimension
    n: usize,
}

impl LuFactorization {
    /// Matrix dimension
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve Ax = b using the pre-computed LU factorization
    pub fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>> {
        if b.len() != self.n {
            return Err(AmgError::DimensionMismatch {
                context: "coarse solve right-hand side",
                expected: self.n,
                got: b.len(),
            });
        }
        let mut x = Array1::zeros(self.n);
        self.solve_into(b, &mut x);
        Ok(x)
    }

    /// Solve into `x` without checking dimensions (`b` and `x` have length `dim()`)
    pub(crate) fn solve_into(&self, b: &Array1<f64>, x: &mut Array1<f64>) {
        debug_assert_eq!(b.len(), self.n);
        debug_assert_eq!(x.len(), self.n);

        // Forward substitution: Ly = Pb
        for (xi, &p) in x.iter_mut().zip(&self.perm) {
            *xi = b[p];
        }
        for i in 0..self.n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum;
        }

        // Backward substitution: Ux = y
        for i in (0..self.n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..self.n {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum / self.lu[[i, i]];
        }
    }
}

/// Compute LU factorization with partial pivoting
///
/// Fails with [`AmgError::SingularCoarseOperator`] when a pivot is negligible
/// relative to the largest entry of `a`; the matrix is never regularized.
pub fn lu_factorize(a: &Array2<f64>) -> Result<LuFactorization> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(AmgError::DimensionMismatch {
            context: "LU factorization (columns)",
            expected: n,
            got: a.ncols(),
        });
    }

    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let tol = SINGULAR_PIVOT_TOL * scale;
    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();

    for k in 0..n {
        // Find pivot
        let mut max_val = lu[[k, k]].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = lu[[i, k]].abs();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        // Check for singularity
        if max_val <= tol || max_val == 0.0 {
            return Err(AmgError::SingularCoarseOperator { size: n });
        }

        // Swap rows if needed
        if max_row != k {
            for j in 0..n {
                lu.swap([k, j], [max_row, j]);
            }
            perm.swap(k, max_row);
        }

        // Compute multipliers and eliminate
        let pivot = lu[[k, k]];
        for i in (k + 1)..n {
            let mult = lu[[i, k]] / pivot;
            lu[[i, k]] = mult;
            if mult == 0.0 {
                continue;
            }
            for j in (k + 1)..n {
                let update = mult * lu[[k, j]];
                lu[[i, j]] -= update;
            }
        }
    }

    Ok(LuFactorization { lu, perm, n })
}

/// Solve Ax = b using LU decomposition
///
/// This is a convenience function that combines factorization and solve.
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    lu_factorize(a)?.solve(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_lu_solve_simple() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];

        let x = lu_solve(&a, &b).expect("LU solve should succeed");

        let ax = a.dot(&x);
        for i in 0..2 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_lu_solve_needs_pivoting() {
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]];
        let b = array![5.0, 3.0, 4.0];

        let x = lu_solve(&a, &b).expect("LU solve should succeed");
        for (xi, expected) in x.iter().zip([1.0, 2.0, 1.0]) {
            assert_relative_eq!(*xi, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_factorization_is_reusable() {
        let a = array![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0]];
        let lu = lu_factorize(&a).unwrap();
        assert_eq!(lu.dim(), 3);

        for b in [array![1.0, 0.0, 0.0], array![1.0, 1.0, 1.0]] {
            let x = lu.solve(&b).unwrap();
            let ax = a.dot(&x);
            for i in 0..3 {
                assert_relative_eq!(ax[i], b[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        // Pure Neumann 1D Laplacian: constant null space
        let a = array![[1.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 1.0]];
        let err = lu_factorize(&a).unwrap_err();
        assert!(matches!(err, AmgError::SingularCoarseOperator { size: 3 }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let lu = lu_factorize(&array![[1.0]]).unwrap();
        assert!(lu.solve(&array![1.0, 2.0]).unwrap_err().is_input_error());
    }
}
