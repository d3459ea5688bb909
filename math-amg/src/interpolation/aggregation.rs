//! Smoothed aggregation prolongators
//!
//! [`fit_candidates`] builds the tentative prolongator `P₀`: for every
//! aggregate the restriction of the K near-null-space candidates is
//! orthonormalized with modified Gram-Schmidt, the orthonormal factor becomes
//! the aggregate's K columns of `P₀` and the triangular factor becomes the
//! aggregate's rows of the coarse candidates, so `P₀ · B_c = B` holds exactly.
//!
//! [`ProlongationSmoother`] then improves `P₀` with a few damped Jacobi or
//! Richardson steps.

use crate::coarsening::Aggregates;
use crate::error::{AmgError, Result};
use crate::sparse::{CsrBuilder, CsrMatrix};
use crate::spectral::{dinv_a_spectral_radius, inverse_diagonal, spectral_radius};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Relative column norm below which a candidate is dependent within an aggregate
const RANK_TOL: f64 = 1e-10;

/// Tentative prolongator with its coarse near-null space
#[derive(Debug, Clone)]
pub struct TentativeProlongator {
    /// Block-diagonal `P₀`, n × (num_aggregates · K)
    pub prolongator: CsrMatrix,
    /// Coarse candidates `B_c`, (num_aggregates · K) × K
    pub coarse_candidates: Array2<f64>,
}

/// Fit the near-null-space candidates `b` (n × K) to the aggregates
///
/// Columns that are linearly dependent on earlier ones within an aggregate
/// are left zero, with a zero diagonal in the corresponding `R` block.
pub fn fit_candidates(aggregates: &Aggregates, b: ArrayView2<f64>) -> Result<TentativeProlongator> {
    let n = aggregates.len();
    if b.nrows() != n {
        return Err(AmgError::DimensionMismatch {
            context: "near-null-space candidates",
            expected: n,
            got: b.nrows(),
        });
    }
    let k = b.ncols();
    if k == 0 {
        return Err(AmgError::MalformedInput {
            reason: "at least one near-null-space candidate is required".into(),
        });
    }

    let members = aggregates.members();
    let num_aggregates = aggregates.num_aggregates();
    let mut coarse_candidates = Array2::zeros((num_aggregates * k, k));
    // Position of every fine unknown inside its aggregate's Q block
    let mut local_index = vec![0usize; n];
    let mut q_blocks: Vec<Array2<f64>> = Vec::with_capacity(num_aggregates);

    for (agg, rows) in members.iter().enumerate() {
        let mut q = Array2::zeros((rows.len(), k));
        for (local, &i) in rows.iter().enumerate() {
            local_index[i] = local;
            for c in 0..k {
                q[[local, c]] = b[[i, c]];
            }
        }

        for c in 0..k {
            let original_norm = q.column(c).dot(&q.column(c)).sqrt();
            for prev in 0..c {
                let r = q.column(prev).dot(&q.column(c));
                coarse_candidates[[agg * k + prev, c]] = r;
                let q_prev = q.column(prev).to_owned();
                q.column_mut(c).scaled_add(-r, &q_prev);
            }
            let norm = q.column(c).dot(&q.column(c)).sqrt();
            if norm > RANK_TOL * original_norm && norm > 0.0 {
                q.column_mut(c).mapv_inplace(|v| v / norm);
                coarse_candidates[[agg * k + c, c]] = norm;
            } else {
                q.column_mut(c).fill(0.0);
            }
        }
        q_blocks.push(q);
    }

    let mut builder = CsrBuilder::with_capacity(n, num_aggregates * k, n * k);
    for i in 0..n {
        let agg = aggregates.aggregate_of(i);
        let q = &q_blocks[agg];
        let local = local_index[i];
        builder.add_row_entries((0..k).map(|c| (agg * k + c, q[[local, c]])));
    }

    Ok(TentativeProlongator {
        prolongator: builder.finish(),
        coarse_candidates,
    })
}

/// Smoother applied to the tentative prolongator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProlongationSmoother {
    /// Plain (unsmoothed) aggregation: `P = P₀`
    None,
    /// `P = (I - ω D⁻¹A)^degree P₀`, ω defaulting to 4/3 / ρ(D⁻¹A)
    Jacobi {
        /// Number of smoothing steps (polynomial degree)
        degree: usize,
    },
    /// `P = (I - ω A)^degree P₀`, ω defaulting to 4/3 / ρ(A)
    Richardson {
        /// Number of smoothing steps (polynomial degree)
        degree: usize,
    },
}

impl Default for ProlongationSmoother {
    fn default() -> Self {
        ProlongationSmoother::Jacobi { degree: 1 }
    }
}

impl ProlongationSmoother {
    /// Number of smoothing steps
    pub fn degree(&self) -> usize {
        match *self {
            ProlongationSmoother::None => 0,
            ProlongationSmoother::Jacobi { degree } | ProlongationSmoother::Richardson { degree } => {
                degree
            }
        }
    }

    /// Damping factor used for `a`, either `omega` or the 4/3 / ρ default
    pub fn damping(&self, a: &CsrMatrix, omega: Option<f64>, power_iterations: usize) -> f64 {
        if let Some(omega) = omega {
            return omega;
        }
        let rho = match self {
            ProlongationSmoother::None => return 0.0,
            ProlongationSmoother::Jacobi { .. } => {
                dinv_a_spectral_radius(a, &inverse_diagonal(a), power_iterations)
            }
            ProlongationSmoother::Richardson { .. } => spectral_radius(a, power_iterations),
        };
        if rho > 0.0 { 4.0 / 3.0 / rho } else { 0.0 }
    }

    /// Smooth the tentative prolongator `p0` with operator `a`
    pub fn smooth(
        &self,
        a: &CsrMatrix,
        p0: &CsrMatrix,
        omega: Option<f64>,
        power_iterations: usize,
    ) -> CsrMatrix {
        let degree = self.degree();
        if degree == 0 {
            return p0.clone();
        }

        let omega = self.damping(a, omega, power_iterations);
        let scale = match self {
            ProlongationSmoother::Jacobi { .. } => Some(inverse_diagonal(a)),
            _ => None,
        };

        let mut p = p0.clone();
        for _ in 0..degree {
            let mut ap = a.matmul(&p);
            if let Some(d_inv) = &scale {
                ap.scale_rows(d_inv);
            }
            p = p.add_scaled(-omega, &ap);
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets).unwrap()
    }

    #[test]
    fn test_constant_candidate_normalized_per_aggregate() {
        let aggs = Aggregates::from_assignment(vec![0, 0, 0, 0, 1]);
        let b = Array2::ones((5, 1));
        let t = fit_candidates(&aggs, b.view()).unwrap();

        assert_abs_diff_eq!(t.prolongator.get(0, 0), 0.5);
        assert_abs_diff_eq!(t.prolongator.get(4, 1), 1.0);
        assert_abs_diff_eq!(t.coarse_candidates[[0, 0]], 2.0);
        assert_abs_diff_eq!(t.coarse_candidates[[1, 0]], 1.0);
    }

    #[test]
    fn test_tentative_reproduces_candidates() {
        let aggs = Aggregates::from_assignment(vec![0, 0, 0, 1, 1, 1, 2, 2]);
        let mut b = Array2::ones((8, 2));
        for i in 0..8 {
            b[[i, 1]] = i as f64;
        }
        let t = fit_candidates(&aggs, b.view()).unwrap();
        assert_eq!(t.prolongator.num_cols, 6);

        for c in 0..2 {
            let coarse = t.coarse_candidates.column(c).to_owned();
            let fine = t.prolongator.matvec(&coarse);
            for i in 0..8 {
                assert_abs_diff_eq!(fine[i], b[[i, c]], epsilon = 1e-12);
            }
        }

        // Columns of P₀ are orthonormal
        let dense = t.prolongator.to_dense();
        let gram = dense.t().dot(&dense);
        for i in 0..6 {
            for j in 0..6 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rank_deficient_candidate_in_singleton() {
        // Second candidate is a multiple of the first on the singleton aggregate
        let aggs = Aggregates::from_assignment(vec![0, 0, 1]);
        let b = ndarray::array![[1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let t = fit_candidates(&aggs, b.view()).unwrap();

        assert_eq!(t.prolongator.get(2, 3), 0.0);
        assert_eq!(t.coarse_candidates[[3, 1]], 0.0);
        let fine = t.prolongator.matvec(&t.coarse_candidates.column(1).to_owned());
        assert_abs_diff_eq!(fine[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_candidate_dimension_checked() {
        let aggs = Aggregates::from_assignment(vec![0, 0, 1]);
        let b = Array2::ones((4, 1));
        let err = fit_candidates(&aggs, b.view()).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_jacobi_smoothing_preserves_constant_in_interior() {
        let n = 12;
        let a = laplacian_1d(n);
        let aggs = Aggregates::from_assignment((0..n).map(|i| i / 3).collect());
        let b = Array2::ones((n, 1));
        let t = fit_candidates(&aggs, b.view()).unwrap();

        let smoother = ProlongationSmoother::Jacobi { degree: 1 };
        let p = smoother.smooth(&a, &t.prolongator, None, 30);
        assert!(p.nnz() > t.prolongator.nnz());

        let fine = p.matvec(&t.coarse_candidates.column(0).to_owned());
        // A·1 vanishes away from the Dirichlet ends
        for i in 1..n - 1 {
            assert_abs_diff_eq!(fine[i], 1.0, epsilon = 1e-12);
        }
        assert!((fine[0] - 1.0).abs() < 0.7);
    }

    #[test]
    fn test_explicit_omega_and_degree() {
        let a = laplacian_1d(6);
        let p0 = CsrMatrix::identity(6);
        let smoother = ProlongationSmoother::Richardson { degree: 2 };
        let p = smoother.smooth(&a, &p0, Some(0.25), 10);

        // (I - A/4)^2 applied to e_0
        let dense = a.to_dense();
        let step = Array2::<f64>::eye(6) - &dense * 0.25;
        let expected = step.dot(&step);
        let got = p.to_dense();
        for (x, y) in got.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
        assert_eq!(ProlongationSmoother::None.smooth(&a, &p0, None, 10), p0);
    }
}
