//! BiCGSTAB (Bi-Conjugate Gradient Stabilized) solver
//!
//! Right-preconditioned BiCGSTAB (van der Vorst, 1992) for non-symmetric
//! systems. Two preconditioner applications per iteration, short
//! recurrences, no restart parameter.

use super::{KrylovConfig, Monitor, check_config, check_system, initial_iterate, is_breakdown};
use crate::blas_helpers::{axpy, dot, norm2};
use crate::error::Result;
use crate::solve::{SolveResult, SolveStatus};
use crate::traits::{LinearOperator, Preconditioner};
use ndarray::Array1;

/// Cosine between `t` and `s` below which the stabilizing step stalls
const OMEGA_TOL: f64 = 1e-14;

/// Solve Ax = b using the right-preconditioned BiCGSTAB method
pub fn bicgstab<A, P>(
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
    let mut monitor = Monitor::new("BiCGSTAB", config, b);
    let mut x = initial_iterate(n, x0);
    let mut r = b - &operator.apply(&x);
    let rel = monitor.record(0, norm2(&r));
    if monitor.converged(rel) {
        return Ok(monitor.finish(operator, b, x, 0, SolveStatus::Converged));
    }

    // Shadow residual
    let r_hat = r.clone();
    let r_hat_norm = norm2(&r_hat);

    let mut rho = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;
    let mut p = Array1::<f64>::zeros(n);
    let mut v = Array1::<f64>::zeros(n);

    for iter in 1..=config.max_iterations {
        if monitor.out_of_time() {
            return Ok(monitor.finish(operator, b, x, iter - 1, SolveStatus::TimeLimit));
        }

        let rho_new = dot(&r_hat, &r);
        if is_breakdown(rho_new, r_hat_norm * norm2(&r)) {
            let status = monitor.breakdown(iter);
            return Ok(monitor.finish(operator, b, x, iter - 1, status));
        }

        // p = r + beta * (p - omega * v)
        let beta = (rho_new / rho) * (alpha / omega);
        rho = rho_new;
        axpy(-omega, &v, &mut p);
        p.mapv_inplace(|pi| pi * beta);
        p += &r;

        let p_hat = precond.apply(&p);
        v = operator.apply(&p_hat);

        let r_hat_v = dot(&r_hat, &v);
        if is_breakdown(r_hat_v, r_hat_norm * norm2(&v)) {
            let status = monitor.breakdown(iter);
            return Ok(monitor.finish(operator, b, x, iter - 1, status));
        }
        alpha = rho / r_hat_v;

        // s = r - alpha * v
        let mut s = r.clone();
        axpy(-alpha, &v, &mut s);

        // Check for early convergence
        let s_rel = monitor.relative(norm2(&s));
        if monitor.converged(s_rel) {
            axpy(alpha, &p_hat, &mut x);
            monitor.record(iter, norm2(&s));
            let (confirmed, true_residual) = monitor.confirm(operator, b, &x);
            if confirmed {
                return Ok(monitor.finish(operator, b, x, iter, SolveStatus::Converged));
            }
            r = true_residual;
            omega = 1.0;
            v.fill(0.0);
            p.fill(0.0);
            rho = 1.0;
            alpha = 1.0;
            continue;
        }

        let s_hat = precond.apply(&s);
        let t = operator.apply(&s_hat);
        let tt = dot(&t, &t);
        let ts = dot(&t, &s);
        // omega ≈ 0 leaves r = s and the next rho vanishes
        if is_breakdown(tt, 0.0) || ts.abs() <= OMEGA_TOL * tt.sqrt() * norm2(&s) {
            axpy(alpha, &p_hat, &mut x);
            let status = monitor.breakdown(iter);
            return Ok(monitor.finish(operator, b, x, iter, status));
        }
        omega = ts / tt;

        // x = x + alpha * p_hat + omega * s_hat
        axpy(alpha, &p_hat, &mut x);
        axpy(omega, &s_hat, &mut x);

        // r = s - omega * t
        r = s;
        axpy(-omega, &t, &mut r);

        let rel = monitor.record(iter, norm2(&r));
        if monitor.converged(rel) {
            let (confirmed, true_residual) = monitor.confirm(operator, b, &x);
            if confirmed {
                return Ok(monitor.finish(operator, b, x, iter, SolveStatus::Converged));
            }
            r = true_residual;
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
