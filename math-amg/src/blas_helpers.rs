//! Vector kernels shared by the relaxation, cycle and Krylov code
//!
//! Plain-Rust BLAS level-1 operations on `Array1<f64>`. They assert on length
//! mismatches: every caller works on vectors sized from the same operator.

use ndarray::Array1;

/// Compute inner product (x, y) = Σ x_i * y_i
#[inline]
pub fn dot(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    assert_eq!(x.len(), y.len(), "Vector lengths must match for inner product");
    x.iter().zip(y.iter()).map(|(a, b)| a * b).sum()
}

/// Compute vector 2-norm: ||x||_2 = sqrt(Σ x_i^2)
#[inline]
pub fn norm2(x: &Array1<f64>) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Compute axpy: y = α * x + y
#[inline]
pub fn axpy(alpha: f64, x: &Array1<f64>, y: &mut Array1<f64>) {
    assert_eq!(x.len(), y.len(), "Vector lengths must match for axpy");
    for (xi, yi) in x.iter().zip(y.iter_mut()) {
        *yi += alpha * *xi;
    }
}

/// Compute the scaled vector update in place: y = x + β * y
#[inline]
pub fn xpby(x: &Array1<f64>, beta: f64, y: &mut Array1<f64>) {
    assert_eq!(x.len(), y.len(), "Vector lengths must match for xpby");
    for (xi, yi) in x.iter().zip(y.iter_mut()) {
        *yi = *xi + beta * *yi;
    }
}

/// Returns the index of the first non-finite entry, if any
pub fn first_non_finite(x: &Array1<f64>) -> Option<usize> {
    x.iter().position(|v| !v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_dot() {
        let x = array![1.0, 2.0, 3.0];
        let y = array![4.0, -5.0, 6.0];
        assert_relative_eq!(dot(&x, &y), 12.0);
    }

    #[test]
    fn test_norm2() {
        let x = array![3.0, 4.0];
        assert_relative_eq!(norm2(&x), 5.0);
    }

    #[test]
    fn test_axpy_and_xpby() {
        let x = array![1.0, 2.0];
        let mut y = array![10.0, 20.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, array![12.0, 24.0]);

        xpby(&x, 0.5, &mut y);
        assert_eq!(y, array![7.0, 14.0]);
    }

    #[test]
    fn test_first_non_finite() {
        let x = array![1.0, f64::NAN, 2.0];
        assert_eq!(first_non_finite(&x), Some(1));
        assert_eq!(first_non_finite(&array![0.0, 1.0]), None);
    }
}
