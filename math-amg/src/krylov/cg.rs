//! CG (Conjugate Gradient) solver
//!
//! Preconditioned Conjugate Gradient for symmetric positive definite systems.
//! The preconditioner must be symmetric positive definite as well; a
//! multigrid cycle qualifies when its post-smoother is the adjoint of the
//! pre-smoother and `R = Pᵀ`.

use super::{KrylovConfig, Monitor, check_config, check_system, initial_iterate, is_breakdown};
use crate::blas_helpers::{axpy, dot, norm2, xpby};
use crate::error::Result;
use crate::solve::{SolveResult, SolveStatus};
use crate::traits::{LinearOperator, Preconditioner};
use ndarray::Array1;

/// Solve Ax = b using the preconditioned Conjugate Gradient method
///
/// Note: This method is only correct for symmetric positive definite matrices.
/// For non-symmetric systems, use GMRES or BiCGSTAB instead.
pub fn cg<A, P>(
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

    let mut monitor = Monitor::new("CG", config, b);
    let mut x = initial_iterate(b.len(), x0);
    let mut r = b - &operator.apply(&x);
    let rel = monitor.record(0, norm2(&r));
    if monitor.converged(rel) {
        return Ok(monitor.finish(operator, b, x, 0, SolveStatus::Converged));
    }

    let mut z = precond.apply(&r);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);

    for iter in 1..=config.max_iterations {
        if monitor.out_of_time() {
            return Ok(monitor.finish(operator, b, x, iter - 1, SolveStatus::TimeLimit));
        }

        // q = A * p
        let q = operator.apply(&p);

        // alpha = (r, z) / (p, q)
        let pq = dot(&p, &q);
        if is_breakdown(pq, norm2(&p) * norm2(&q)) || is_breakdown(rz, 0.0) {
            let status = monitor.breakdown(iter);
            return Ok(monitor.finish(operator, b, x, iter - 1, status));
        }
        let alpha = rz / pq;

        axpy(alpha, &p, &mut x);
        axpy(-alpha, &q, &mut r);

        let rel = monitor.record(iter, norm2(&r));
        if monitor.converged(rel) {
            let (confirmed, true_residual) = monitor.confirm(operator, b, &x);
            if confirmed {
                return Ok(monitor.finish(operator, b, x, iter, SolveStatus::Converged));
            }
            // Recurrence drifted: continue from the true residual
            r = true_residual;
        }

        z = precond.apply(&r);
        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;
        rz = rz_new;

        // p = z + beta * p
        xpby(&z, beta, &mut p);
    }

    Ok(monitor.finish(
        operator,
        b,
        x,
        config.max_iterations,
        SolveStatus::NonConvergence,
    ))
}
