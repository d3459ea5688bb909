//! GMRES (Generalized Minimal Residual) solver
//!
//! Restarted GMRES(m) based on Saad & Schultz (1986), preconditioned from
//! the right: the Krylov space is built for `A M⁻¹`, so the least-squares
//! residual it minimizes is the true residual `b - Ax` and the history needs
//! no extra products. The preconditioned directions are kept, which also
//! allows a preconditioner that varies between applications.

use super::{KrylovConfig, Monitor, check_config, check_system, initial_iterate};
use crate::blas_helpers::{axpy, dot, norm2};
use crate::error::Result;
use crate::solve::{SolveResult, SolveStatus};
use crate::traits::{LinearOperator, Preconditioner};
use ndarray::{Array1, Array2};

/// Subdiagonal magnitude, relative to the initial residual, treated as an
/// invariant Krylov subspace
const LUCKY_BREAKDOWN_TOL: f64 = 1e-14;

/// Solve Ax = b using right-preconditioned restarted GMRES
///
/// `config.restart` bounds the Krylov basis; `config.max_iterations` counts
/// inner iterations across all restarts.
pub fn gmres<A, P>(
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

    let m = config.restart;
    let mut monitor = Monitor::new("GMRES", config, b);
    let mut x = initial_iterate(b.len(), x0);
    let mut r = b - &operator.apply(&x);
    let mut beta = norm2(&r);
    let rel = monitor.record(0, beta);
    if monitor.converged(rel) {
        return Ok(monitor.finish(operator, b, x, 0, SolveStatus::Converged));
    }

    let mut iterations = 0;
    let mut restarts = 0;

    loop {
        let mut v: Vec<Array1<f64>> = Vec::with_capacity(m + 1);
        let mut z: Vec<Array1<f64>> = Vec::with_capacity(m);
        v.push(r.mapv(|ri| ri / beta));

        let mut h = Array2::<f64>::zeros((m + 1, m));
        let mut cs: Vec<f64> = Vec::with_capacity(m);
        let mut sn: Vec<f64> = Vec::with_capacity(m);
        let mut g = Array1::<f64>::zeros(m + 1);
        g[0] = beta;

        let mut basis_size = 0;
        let mut invariant = false;
        let mut out_of_time = false;

        for j in 0..m {
            if iterations >= config.max_iterations {
                break;
            }
            if monitor.out_of_time() {
                out_of_time = true;
                break;
            }
            iterations += 1;

            // w = A * M⁻¹ * v_j
            let zj = precond.apply(&v[j]);
            let mut w = operator.apply(&zj);
            z.push(zj);

            // Modified Gram-Schmidt
            for i in 0..=j {
                let h_ij = dot(&v[i], &w);
                h[[i, j]] = h_ij;
                axpy(-h_ij, &v[i], &mut w);
            }

            let w_norm = norm2(&w);
            h[[j + 1, j]] = w_norm;
            if w_norm <= LUCKY_BREAKDOWN_TOL * beta {
                invariant = true;
            } else {
                v.push(w.mapv(|wi| wi / w_norm));
            }

            // Apply previous Givens rotations
            for i in 0..j {
                let temp = cs[i] * h[[i, j]] + sn[i] * h[[i + 1, j]];
                h[[i + 1, j]] = -sn[i] * h[[i, j]] + cs[i] * h[[i + 1, j]];
                h[[i, j]] = temp;
            }

            let (c, s) = givens_rotation(h[[j, j]], h[[j + 1, j]]);
            cs.push(c);
            sn.push(s);

            h[[j, j]] = c * h[[j, j]] + s * h[[j + 1, j]];
            h[[j + 1, j]] = 0.0;

            g[j + 1] = -s * g[j];
            g[j] *= c;

            basis_size = j + 1;
            let rel = monitor.record(iterations, g[j + 1].abs());
            if monitor.converged(rel) || invariant {
                break;
            }
        }

        // x = x + Σ y_i M⁻¹ v_i
        let y = solve_upper_triangular(&h, &g, basis_size);
        for (zi, &yi) in z.iter().zip(&y) {
            axpy(yi, zi, &mut x);
        }

        r = b - &operator.apply(&x);
        beta = norm2(&r);
        let rel = monitor.relative(beta);

        if monitor.converged(rel) {
            return Ok(monitor.finish(operator, b, x, iterations, SolveStatus::Converged));
        }
        if invariant {
            // The subspace was invariant yet the residual remains: singular system
            let status = monitor.breakdown(iterations);
            return Ok(monitor.finish(operator, b, x, iterations, status));
        }
        if out_of_time {
            return Ok(monitor.finish(operator, b, x, iterations, SolveStatus::TimeLimit));
        }
        if iterations >= config.max_iterations {
            return Ok(monitor.finish(
                operator,
                b,
                x,
                iterations,
                SolveStatus::NonConvergence,
            ));
        }

        restarts += 1;
        log::debug!("GMRES restart {restarts} at iteration {iterations}: relative residual {rel:.3e}");
    }
}

/// Compute Givens rotation coefficients zeroing `b` against `a`
#[inline]
fn givens_rotation(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        return (1.0, 0.0);
    }
    if a == 0.0 {
        return (0.0, 1.0);
    }
    let r = a.hypot(b);
    (a / r, b / r)
}

/// Solve upper triangular system Hy = g
fn solve_upper_triangular(h: &Array2<f64>, g: &Array1<f64>, k: usize) -> Vec<f64> {
    let mut y = vec![0.0; k];

    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[[i, j]] * y[j];
        }
        if h[[i, i]].abs() > f64::MIN_POSITIVE {
            y[i] = sum / h[[i, i]];
        }
    }

    y
}
