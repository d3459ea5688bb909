//! Solve driver
//!
//! [`Hierarchy::solve`] runs either stand-alone multigrid cycles or a Krylov
//! method preconditioned by one cycle per iteration. Non-convergence and
//! breakdown are reported through [`SolveStatus`] together with the best
//! iterate; [`SolveResult::into_result`] converts them into errors for
//! callers that prefer `?`.

use crate::blas_helpers::{first_non_finite, norm2};
use crate::error::{AmgError, Result};
use crate::hierarchy::Hierarchy;
use crate::krylov::{self, KrylovConfig, Monitor, check_config, initial_iterate};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outer iteration wrapped around the multigrid cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// Stand-alone multigrid cycles
    #[default]
    None,
    /// Conjugate Gradient (symmetric positive definite systems)
    Cg,
    /// Restarted GMRES
    Gmres,
    /// BiCGSTAB
    BiCgStab,
    /// MINRES (symmetric systems)
    Minres,
}

/// Solve configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveConfig {
    /// Relative residual tolerance: ‖b - Ax‖ ≤ tolerance · ‖b‖
    pub tolerance: f64,
    /// Maximum number of cycles or Krylov iterations
    pub max_iterations: usize,
    /// Outer accelerator
    pub accelerator: Accelerator,
    /// GMRES restart length
    pub restart: usize,
    /// Wall-clock budget, checked between cycles / iterations
    pub max_time: Option<Duration>,
    /// Log progress every N iterations (0 = silent)
    pub print_interval: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100,
            accelerator: Accelerator::None,
            restart: 30,
            max_time: None,
            print_interval: 0,
        }
    }
}

impl SolveConfig {
    /// Default configuration with the given accelerator
    pub fn with_accelerator(accelerator: Accelerator) -> Self {
        Self {
            accelerator,
            ..Default::default()
        }
    }

    /// Settings for the Krylov layer
    pub fn krylov_config(&self) -> KrylovConfig {
        KrylovConfig {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            restart: self.restart,
            max_time: self.max_time,
            print_interval: self.print_interval,
        }
    }
}

/// How an iterative solve ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The relative residual reached the tolerance
    Converged,
    /// The iteration budget ran out first
    NonConvergence,
    /// The time budget ran out first
    TimeLimit,
    /// A Krylov recurrence hit a (near) zero pivot or direction
    Breakdown {
        /// Method name
        method: &'static str,
        /// Iteration at which the breakdown was detected
        iteration: usize,
    },
}

/// Outcome of an iterative solve
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Best available iterate
    pub x: Array1<f64>,
    /// Cycles or Krylov iterations performed
    pub iterations: usize,
    /// Final relative residual ‖b - Ax‖ / ‖b‖, computed explicitly
    pub residual: f64,
    /// Relative residual per iteration, starting with the initial one
    pub residual_history: Vec<f64>,
    /// How the iteration ended
    pub status: SolveStatus,
}

impl SolveResult {
    /// Whether the tolerance was reached
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Geometric mean residual reduction per iteration
    ///
    /// Returns `None` before the first iteration or for a zero initial residual.
    pub fn convergence_factor(&self) -> Option<f64> {
        let first = *self.residual_history.first()?;
        let last = *self.residual_history.last()?;
        let steps = self.residual_history.len() - 1;
        if steps == 0 || first <= 0.0 {
            return None;
        }
        Some((last / first).powf(1.0 / steps as f64))
    }

    /// The solution if converged, otherwise the matching error
    pub fn into_result(self) -> Result<Array1<f64>> {
        match self.status {
            SolveStatus::Converged => Ok(self.x),
            SolveStatus::NonConvergence | SolveStatus::TimeLimit => Err(AmgError::NonConvergence {
                iterations: self.iterations,
                residual: self.residual,
            }),
            SolveStatus::Breakdown { method, iteration } => {
                Err(AmgError::KrylovBreakdown { method, iteration })
            }
        }
    }
}

impl Hierarchy {
    /// Solve `A x = b` for the finest-level operator
    ///
    /// `x0` defaults to zero. Returns an error only for malformed input or an
    /// invalid configuration.
    pub fn solve(
        &self,
        b: &Array1<f64>,
        x0: Option<&Array1<f64>>,
        config: &SolveConfig,
    ) -> Result<SolveResult> {
        let krylov_config = config.krylov_config();
        let a = self.matrix();
        match config.accelerator {
            Accelerator::None => self.solve_stationary(b, x0, &krylov_config),
            Accelerator::Cg => krylov::cg(a, self, b, x0, &krylov_config),
            Accelerator::Gmres => krylov::gmres(a, self, b, x0, &krylov_config),
            Accelerator::BiCgStab => krylov::bicgstab(a, self, b, x0, &krylov_config),
            Accelerator::Minres => krylov::minres(a, self, b, x0, &krylov_config),
        }
    }

    /// Repeated cycles `x ← cycle(x, b)`
    fn solve_stationary(
        &self,
        b: &Array1<f64>,
        x0: Option<&Array1<f64>>,
        config: &KrylovConfig,
    ) -> Result<SolveResult> {
        check_config(config)?;
        krylov::check_system(self.matrix(), b, x0)?;

        let a = self.matrix();
        let mut monitor = Monitor::new("AMG", config, b);
        let mut x = initial_iterate(b.len(), x0);
        let mut work = self.workspace();

        let rel = monitor.record(0, norm2(&a.residual(&x, b)));
        if monitor.converged(rel) {
            return Ok(monitor.finish(a, b, x, 0, SolveStatus::Converged));
        }

        for iter in 1..=config.max_iterations {
            if monitor.out_of_time() {
                return Ok(monitor.finish(a, b, x, iter - 1, SolveStatus::TimeLimit));
            }
            self.cycle(&mut x, b, &mut work)?;

            let rel = monitor.record(iter, norm2(&a.residual(&x, b)));
            if first_non_finite(&x).is_some() || !rel.is_finite() {
                let status = monitor.breakdown(iter);
                return Ok(monitor.finish(a, b, x, iter, status));
            }
            if monitor.converged(rel) {
                return Ok(monitor.finish(a, b, x, iter, SolveStatus::Converged));
            }
        }

        Ok(monitor.finish(a, b, x, config.max_iterations, SolveStatus::NonConvergence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmgConfig;
    use crate::krylov::test_problems::{convection_diffusion_1d, poisson_2d};

    fn hierarchy(nx: usize) -> Hierarchy {
        let config = AmgConfig {
            max_coarse_size: 20,
            ..Default::default()
        };
        Hierarchy::new(&poisson_2d(nx), &config).unwrap()
    }

    #[test]
    fn test_stationary_cycles_converge() {
        let h = hierarchy(20);
        let b = Array1::from_elem(400, 1.0);
        let result = h.solve(&b, None, &SolveConfig::default()).unwrap();

        assert!(result.converged());
        assert!(result.residual <= 1e-8);
        assert!(result.iterations < 30);
        assert_eq!(result.residual_history.len(), result.iterations + 1);
        let factor = result.convergence_factor().unwrap();
        assert!(factor > 0.0 && factor < 0.5, "factor {factor}");
    }

    #[test]
    fn test_every_accelerator_converges_on_poisson() {
        let h = hierarchy(20);
        let b = Array1::from_iter((0..400).map(|i| ((i * 13) % 7) as f64 - 3.0));
        for accelerator in [
            Accelerator::None,
            Accelerator::Cg,
            Accelerator::Gmres,
            Accelerator::BiCgStab,
            Accelerator::Minres,
        ] {
            let result = h
                .solve(&b, None, &SolveConfig::with_accelerator(accelerator))
                .unwrap();
            assert!(result.converged(), "{accelerator:?}: {:?}", result.status);
            assert!(result.residual <= 1e-8, "{accelerator:?}");
        }
    }

    #[test]
    fn test_gmres_on_nonsymmetric_problem() {
        let a = convection_diffusion_1d(200, 1.0);
        let h = Hierarchy::new(
            &a,
            &AmgConfig {
                max_coarse_size: 10,
                ..AmgConfig::for_nonsymmetric()
            },
        )
        .unwrap();
        let b = Array1::from_elem(200, 1.0);
        for accelerator in [Accelerator::Gmres, Accelerator::BiCgStab] {
            let result = h
                .solve(&b, None, &SolveConfig::with_accelerator(accelerator))
                .unwrap();
            assert!(result.converged(), "{accelerator:?}: {:?}", result.status);
        }
    }

    #[test]
    fn test_non_convergence_is_a_status() {
        let h = hierarchy(20);
        let b = Array1::from_elem(400, 1.0);
        let config = SolveConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let result = h.solve(&b, None, &config).unwrap();
        assert_eq!(result.status, SolveStatus::NonConvergence);
        assert_eq!(result.iterations, 1);
        assert!(result.residual < 1.0);

        let err = result.into_result().unwrap_err();
        assert!(matches!(err, AmgError::NonConvergence { iterations: 1, .. }));
    }

    #[test]
    fn test_initial_guess_and_zero_rhs() {
        let h = hierarchy(10);
        let b = Array1::zeros(100);
        let result = h.solve(&b, None, &SolveConfig::default()).unwrap();
        assert!(result.converged());
        assert_eq!(result.iterations, 0);
        assert!(result.x.iter().all(|&v| v == 0.0));

        let x_true = Array1::from_iter((0..100).map(|i| i as f64 / 100.0));
        let b = h.matrix().matvec(&x_true);
        let result = h.solve(&b, Some(&x_true), &SolveConfig::default()).unwrap();
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_invalid_input_is_an_error() {
        let h = hierarchy(10);
        let err = h
            .solve(&Array1::zeros(99), None, &SolveConfig::default())
            .unwrap_err();
        assert!(err.is_input_error());

        let config = SolveConfig {
            tolerance: -1.0,
            ..Default::default()
        };
        let err = h.solve(&Array1::zeros(100), None, &config).unwrap_err();
        assert!(matches!(err, AmgError::InvalidConfig { parameter: "tolerance", .. }));
    }

    #[test]
    fn test_solve_config_json() {
        let config: SolveConfig =
            serde_json::from_str(r#"{ "accelerator": "gmres", "restart": 20 }"#).unwrap();
        assert_eq!(config.accelerator, Accelerator::Gmres);
        assert_eq!(config.restart, 20);
        assert_eq!(config.tolerance, 1e-8);
        let config: SolveConfig = serde_json::from_str(r#"{ "accelerator": "bicgstab" }"#).unwrap();
        assert_eq!(config.accelerator, Accelerator::BiCgStab);
    }

    #[test]
    fn test_convergence_factor() {
        let result = SolveResult {
            x: Array1::zeros(1),
            iterations: 2,
            residual: 0.01,
            residual_history: vec![1.0, 0.1, 0.01],
            status: SolveStatus::Converged,
        };
        assert!((result.convergence_factor().unwrap() - 0.1).abs() < 1e-12);
        assert!(result.into_result().is_ok());
    }
}
