//! MINRES (Minimum Residual) solver
//!
//! Preconditioned MINRES (Paige & Saunders, 1975) for symmetric, possibly
//! indefinite systems. The preconditioner must be symmetric positive
//! definite. The recurrence minimizes the residual in the `M⁻¹` norm; the
//! history reports that estimate scaled to the initial 2-norm residual, and
//! convergence is confirmed against the true residual.

use super::{KrylovConfig, Monitor, check_config, check_system, initial_iterate, is_breakdown};
use crate::blas_helpers::{dot, norm2};
use crate::error::Result;
use crate::solve::{SolveResult, SolveStatus};
use crate::traits::{LinearOperator, Preconditioner};
use ndarray::Array1;

/// Solve the symmetric system Ax = b using preconditioned MINRES
pub fn minres<A, P>(
    operator: &A,
    precond: &P,
    b: &Array1<f64>,
    x0: Option<&Array1<f64>>,
    config: &KrylovConfig,
) -> Result<SolveResult>
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    check_config(config)?;
    check_system(operator, b, x0)?;

    let n = b.len();
    let mut monitor = Monitor::new("MINRES", config, b);
    let mut x = initial_iterate(n, x0);
    let r0 = b - &operator.apply(&x);
    let r0_norm = norm2(&r0);
    let rel = monitor.record(0, r0_norm);
    if monitor.converged(rel) {
        return Ok(monitor.finish(operator, b, x, 0, SolveStatus::Converged));
    }

    let mut y = precond.apply(&r0);
    let beta1_sq = dot(&r0, &y);
    if !(beta1_sq > 0.0) || !beta1_sq.is_finite() {
        // M is not positive definite on r0
        let status = monitor.breakdown(0);
        return Ok(monitor.finish(operator, b, x, 0, status));
    }
    let beta1 = beta1_sq.sqrt();

    // Lanczos vectors (unnormalized r1, r2) and the M⁻¹-norm residual estimate
    let mut r1 = r0.clone();
    let mut r2 = r0;
    let mut beta = beta1;
    let mut old_beta = 0.0;
    let mut phibar = beta1;

    // Givens rotation state
    let mut cs = -1.0;
    let mut sn = 0.0;
    let mut dbar = 0.0;
    let mut epsilon = 0.0;

    // Search directions
    let mut w = Array1::<f64>::zeros(n);
    let mut w2 = Array1::<f64>::zeros(n);

    for iter in 1..=config.max_iterations {
        if monitor.out_of_time() {
            return Ok(monitor.finish(operator, b, x, iter - 1, SolveStatus::TimeLimit));
        }

        // Lanczos step
        let v = y.mapv(|yi| yi / beta);
        y = operator.apply(&v);
        if iter >= 2 {
            let scale = beta / old_beta;
            y.zip_mut_with(&r1, |yi, &ri| *yi -= scale * ri);
        }
        let alpha = dot(&v, &y);
        let scale = alpha / beta;
        y.zip_mut_with(&r2, |yi, &ri| *yi -= scale * ri);
        r1 = std::mem::replace(&mut r2, y);
        y = precond.apply(&r2);
        old_beta = beta;
        let beta_sq = dot(&r2, &y);
        if beta_sq < 0.0 || !beta_sq.is_finite() {
            let status = monitor.breakdown(iter);
            return Ok(monitor.finish(operator, b, x, iter - 1, status));
        }
        beta = beta_sq.sqrt();

        // Apply previous rotation, then compute the next one
        let old_epsilon = epsilon;
        let delta = cs * dbar + sn * alpha;
        let gbar = sn * dbar - cs * alpha;
        epsilon = sn * beta;
        dbar = -cs * beta;

        let gamma = gbar.hypot(beta);
        if is_breakdown(gamma, beta1) {
            let status = monitor.breakdown(iter);
            return Ok(monitor.finish(operator, b, x, iter - 1, status));
        }
        cs = gbar / gamma;
        sn = beta / gamma;
        let phi = cs * phibar;
        phibar *= sn;

        // w_new = (v - old_epsilon * w1 - delta * w2) / gamma
        let w1 = std::mem::replace(&mut w2, w);
        w = Array1::from_iter(
            v.iter()
                .zip(w1.iter())
                .zip(w2.iter())
                .map(|((&vi, &w1i), &w2i)| (vi - old_epsilon * w1i - delta * w2i) / gamma),
        );
        x.zip_mut_with(&w, |xi, &wi| *xi += phi * wi);

        let rel = monitor.record(iter, phibar / beta1 * r0_norm);
        // beta == 0: the Krylov space is invariant and x is exact
        if monitor.converged(rel) || beta == 0.0 {
            let (confirmed, _) = monitor.confirm(operator, b, &x);
            if confirmed {
                return Ok(monitor.finish(operator, b, x, iter, SolveStatus::Converged));
            }
            if beta == 0.0 {
                let status = monitor.breakdown(iter);
                return Ok(monitor.finish(operator, b, x, iter, status));
            }
        }
    }

    Ok(monitor.finish(
        operator,
        b,
        x,
        config.max_iterations,
        SolveStatus::NonConvergence,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::krylov::test_problems::poisson_2d;
    use crate::sparse::CsrMatrix;
    use crate::traits::IdentityPreconditioner;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_minres_symmetric_indefinite() {
        let dense = array![[2.0, 1.0, 0.0], [1.0, -3.0, 1.0], [0.0, 1.0, 1.0]];
        let a = CsrMatrix::from_dense(&dense, 0.0);
        let b = array![1.0, 2.0, 3.0];

        let solution = minres(&a, &IdentityPreconditioner, &b, None, &KrylovConfig::default()).unwrap();
        assert!(solution.converged(), "{:?}", solution.status);
        let ax = a.matvec(&solution.x);
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_minres_matches_cg_iteration_count_on_spd() {
        let a = poisson_2d(10);
        let b = Array1::from_iter((0..100).map(|i| ((i * 17) % 11) as f64 - 5.0));
        let config = KrylovConfig {
            max_iterations: 200,
            ..Default::default()
        };
        let solution = minres(&a, &IdentityPreconditioner, &b, None, &config).unwrap();
        assert!(solution.converged());
        assert!(solution.residual <= 1e-8);
        // Residual estimates are monotone for MINRES
        for pair in solution.residual_history.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-12));
        }
    }

    #[test]
    fn test_minres_zero_rhs_returns_zero() {
        let a = poisson_2d(6);
        let b = Array1::zeros(36);
        let solution = minres(&a, &IdentityPreconditioner, &b, None, &KrylovConfig::default()).unwrap();
        assert!(solution.converged());
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.residual_history, vec![0.0]);
        assert!(solution.x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_minres_diagonal_preconditioner() {
        struct Jacobi(Array1<f64>);
        impl Preconditioner for Jacobi {
            fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
                r * &self.0
            }
        }

        let n = 50;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 1.0 + i as f64));
            if i + 1 < n {
                triplets.push((i, i + 1, 0.5));
                triplets.push((i + 1, i, 0.5));
            }
        }
        let a = CsrMatrix::from_triplets(n, n, triplets).unwrap();
        let precond = Jacobi(a.diagonal().mapv(|d| 1.0 / d));
        let b = Array1::from_elem(n, 1.0);

        let plain = minres(&a, &IdentityPreconditioner, &b, None, &KrylovConfig::default()).unwrap();
        let scaled = minres(&a, &precond, &b, None, &KrylovConfig::default()).unwrap();
        assert!(plain.converged() && scaled.converged());
        assert!(scaled.iterations < plain.iterations);
    }
}
