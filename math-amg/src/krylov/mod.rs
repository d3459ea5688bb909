//! Krylov subspace accelerators
//!
//! This module provides Krylov methods that take any [`Preconditioner`]
//! (typically a multigrid [`Hierarchy`](crate::Hierarchy)):
//! - [`cg`]: preconditioned Conjugate Gradient - symmetric positive definite systems
//! - [`gmres`]: right-preconditioned restarted GMRES(m) - general systems
//! - [`bicgstab`]: right-preconditioned BiCGSTAB - general systems, short recurrences
//! - [`minres`]: preconditioned MINRES - symmetric (possibly indefinite) systems
//!
//! Every method returns a [`SolveResult`]: the best iterate together with the
//! relative residual history and a [`SolveStatus`]. Breakdown and
//! non-convergence are reported, never raised; only malformed input is an
//! error.
//!
//! [`Preconditioner`]: crate::traits::Preconditioner

mod bicgstab;
mod cg;
mod gmres;
mod minres;

pub use bicgstab::bicgstab;
pub use cg::cg;
pub use gmres::gmres;
pub use minres::minres;

use crate::blas_helpers::{first_non_finite, norm2};
use crate::error::{AmgError, Result};
use crate::solve::{SolveResult, SolveStatus};
use crate::traits::LinearOperator;
use ndarray::Array1;
use std::time::{Duration, Instant};

/// Relative size below which a recurrence coefficient counts as zero
const BREAKDOWN_TOL: f64 = 1e-30;

/// Krylov solver configuration
#[derive(Debug, Clone)]
pub struct KrylovConfig {
    /// Maximum number of iterations (preconditioner applications)
    pub max_iterations: usize,
    /// Relative tolerance: stop once ‖b - Ax‖ ≤ tolerance · ‖b‖
    pub tolerance: f64,
    /// GMRES restart length
    pub restart: usize,
    /// Wall-clock budget, checked between iterations
    pub max_time: Option<Duration>,
    /// Print progress every N iterations (0 = no output)
    pub print_interval: usize,
}

impl Default for KrylovConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
            restart: 30,
            max_time: None,
            print_interval: 0,
        }
    }
}

/// Validate dimensions and finiteness of a Krylov solve
pub(crate) fn check_system<A: LinearOperator + ?Sized>(
    operator: &A,
    b: &Array1<f64>,
    x0: Option<&Array1<f64>>,
) -> Result<()> {
    if !operator.is_square() {
        return Err(AmgError::malformed(format!(
            "operator must be square, got {}x{}",
            operator.num_rows(),
            operator.num_cols()
        )));
    }
    let n = operator.num_rows();
    if b.len() != n {
        return Err(AmgError::DimensionMismatch {
            context: "right-hand side",
            expected: n,
            got: b.len(),
        });
    }
    if let Some(index) = first_non_finite(b) {
        return Err(AmgError::NonFiniteVector { index });
    }
    if let Some(x0) = x0 {
        if x0.len() != n {
            return Err(AmgError::DimensionMismatch {
                context: "initial guess",
                expected: n,
                got: x0.len(),
            });
        }
        if let Some(index) = first_non_finite(x0) {
            return Err(AmgError::NonFiniteVector { index });
        }
    }
    Ok(())
}

pub(crate) fn check_config(config: &KrylovConfig) -> Result<()> {
    if !(config.tolerance > 0.0 && config.tolerance.is_finite()) {
        return Err(AmgError::invalid_config(
            "tolerance",
            format!("must be positive, got {}", config.tolerance),
        ));
    }
    if config.restart == 0 {
        return Err(AmgError::invalid_config("restart", "must be at least 1"));
    }
    Ok(())
}

/// Whether `value` vanishes relative to `scale` (or is not finite)
#[inline]
pub(crate) fn is_breakdown(value: f64, scale: f64) -> bool {
    !value.is_finite() || value.abs() <= BREAKDOWN_TOL * scale
}

/// Convergence bookkeeping shared by the Krylov methods
pub(crate) struct Monitor<'a> {
    method: &'static str,
    config: &'a KrylovConfig,
    start: Instant,
    /// ‖b‖, or 1 for a zero right-hand side
    b_norm: f64,
    history: Vec<f64>,
}

impl<'a> Monitor<'a> {
    pub(crate) fn new(method: &'static str, config: &'a KrylovConfig, b: &Array1<f64>) -> Self {
        let b_norm = norm2(b);
        Self {
            method,
            config,
            start: Instant::now(),
            b_norm: if b_norm > 0.0 { b_norm } else { 1.0 },
            history: Vec::with_capacity(config.max_iterations + 1),
        }
    }

    /// Relative value of an absolute residual norm
    pub(crate) fn relative(&self, residual_norm: f64) -> f64 {
        residual_norm / self.b_norm
    }

    /// Record the residual norm of `iteration`; returns the relative residual
    pub(crate) fn record(&mut self, iteration: usize, residual_norm: f64) -> f64 {
        let rel = self.relative(residual_norm);
        self.history.push(rel);
        if self.config.print_interval > 0 && iteration % self.config.print_interval == 0 {
            log::info!(
                "{} iteration {}: relative residual = {:.6e}",
                self.method,
                iteration,
                rel
            );
        }
        rel
    }

    pub(crate) fn converged(&self, rel: f64) -> bool {
        rel <= self.config.tolerance
    }

    /// Whether the true residual of `x` meets the tolerance
    pub(crate) fn confirm<A: LinearOperator + ?Sized>(
        &self,
        operator: &A,
        b: &Array1<f64>,
        x: &Array1<f64>,
    ) -> (bool, Array1<f64>) {
        let r = b - &operator.apply(x);
        (self.converged(self.relative(norm2(&r))), r)
    }

    pub(crate) fn out_of_time(&self) -> bool {
        self.config
            .max_time
            .is_some_and(|limit| self.start.elapsed() > limit)
    }

    pub(crate) fn breakdown(&self, iteration: usize) -> SolveStatus {
        log::warn!("{} breakdown at iteration {}", self.method, iteration);
        SolveStatus::Breakdown {
            method: self.method,
            iteration,
        }
    }

    /// Assemble the result, computing the final true residual
    pub(crate) fn finish<A: LinearOperator + ?Sized>(
        self,
        operator: &A,
        b: &Array1<f64>,
        x: Array1<f64>,
        iterations: usize,
        status: SolveStatus,
    ) -> SolveResult {
        let residual = self.relative(norm2(&(b - &operator.apply(&x))));
        if self.config.print_interval > 0 {
            log::info!(
                "{} finished after {} iterations: relative residual = {:.6e} ({:?})",
                self.method,
                iterations,
                residual,
                status
            );
        }
        SolveResult {
            x,
            iterations,
            residual,
            residual_history: self.history,
            status,
        }
    }
}

/// Initial iterate: the guess or zero
pub(crate) fn initial_iterate(n: usize, x0: Option<&Array1<f64>>) -> Array1<f64> {
    match x0 {
        Some(x0) => x0.clone(),
        None => Array1::zeros(n),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::CsrMatrix;
    use ndarray::array;

    #[test]
    fn test_check_system_rejects_bad_input() {
        let a = CsrMatrix::identity(3);
        assert!(check_system(&a, &array![1.0, 2.0], None).unwrap_err().is_input_error());
        assert!(matches!(
            check_system(&a, &array![1.0, f64::NAN, 0.0], None).unwrap_err(),
            AmgError::NonFiniteVector { index: 1 }
        ));
        let x0 = array![0.0, 0.0];
        assert!(check_system(&a, &array![1.0, 2.0, 3.0], Some(&x0)).is_err());

        let rect = CsrMatrix::new(3, 2);
        assert!(check_system(&rect, &array![1.0, 2.0, 3.0], None).is_err());
    }

    #[test]
    fn test_check_config() {
        assert!(check_config(&KrylovConfig::default()).is_ok());
        let bad = KrylovConfig {
            tolerance: 0.0,
            ..Default::default()
        };
        assert!(matches!(check_config(&bad), Err(AmgError::InvalidConfig { .. })));
    }

    #[test]
    fn test_breakdown_detection() {
        assert!(is_breakdown(0.0, 1.0));
        assert!(is_breakdown(f64::NAN, 1.0));
        assert!(!is_breakdown(1e-20, 1.0));
    }
}
