//! Hierarchy construction configuration
//!
//! [`AmgConfig`] gathers every option of the setup phase and of the cycle.
//! It derives `serde` traits with `#[serde(default)]`, so a partial JSON
//! document only needs the fields that differ from the defaults:
//!
//! ```ignore
//! let config = AmgConfig::from_json_str(r#"{ "theta": 0.5, "cycle_type": "w" }"#)?;
//! ```

use crate::coarsening::{AggregationMethod, CfSplitting};
use crate::cycle::CycleType;
use crate::error::{AmgError, Result};
use crate::interpolation::{ClassicalInterpolation, ProlongationSmoother};
use crate::relaxation::{GaussSeidelSweep, SmootherConfig, SmootherKind};
use crate::spectral::DEFAULT_POWER_ITERATIONS;
use crate::strength::StrengthMeasure;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Coarsening family and its variant-specific options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Coarsening {
    /// Classical AMG: C/F splitting and classical interpolation
    Classical {
        /// C/F splitting algorithm
        #[serde(default)]
        splitting: CfSplitting,
        /// Interpolation formula
        #[serde(default)]
        interpolation: ClassicalInterpolation,
    },
    /// (Smoothed) aggregation AMG
    Aggregation {
        /// Aggregation algorithm
        #[serde(default)]
        method: AggregationMethod,
        /// Smoother applied to the tentative prolongator
        #[serde(default)]
        smoother: ProlongationSmoother,
    },
}

impl Default for Coarsening {
    fn default() -> Self {
        Coarsening::Classical {
            splitting: CfSplitting::default(),
            interpolation: ClassicalInterpolation::default(),
        }
    }
}

impl Coarsening {
    /// Whether this is an aggregation-based method
    pub fn is_aggregation(&self) -> bool {
        matches!(self, Coarsening::Aggregation { .. })
    }
}

/// How the restriction operator is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symmetry {
    /// `R = Pᵀ`
    #[default]
    Symmetric,
    /// `R = P̃ᵀ` with `P̃` built from `Aᵀ` on the same coarse grid
    Nonsymmetric,
}

/// Solver used on the coarsest level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoarseSolver {
    /// Dense LU factorization with partial pivoting (exact)
    Lu,
    /// Fixed number of relaxation sweeps (approximate, never fails)
    Relaxation {
        /// Smoother variant
        kind: SmootherKind,
        /// Number of sweeps
        sweeps: usize,
    },
}

impl Default for CoarseSolver {
    fn default() -> Self {
        CoarseSolver::Lu
    }
}

/// Configuration for AMG hierarchy construction and cycling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmgConfig {
    /// Coarsening family (classical C/F splitting or aggregation)
    pub coarsening: Coarsening,

    /// Strength-of-connection measure
    pub strength_measure: StrengthMeasure,

    /// Strength threshold θ ∈ [0, 1] (0 marks every coupling strong)
    pub theta: f64,

    /// Symmetric (`R = Pᵀ`) or nonsymmetric restriction
    pub symmetry: Symmetry,

    /// Maximum number of levels in the hierarchy
    pub max_levels: usize,

    /// Stop coarsening once a level has at most this many unknowns
    pub max_coarse_size: usize,

    /// Stop coarsening a level whose average nonzeros per row exceed this
    pub max_row_density: f64,

    /// Coarse/fine size ratio above which a coarsening step counts as stalled
    pub stall_ratio: f64,

    /// Number of consecutive stalled steps that stop construction
    pub stall_levels: usize,

    /// Pre-smoother and its sweep count (ν₁)
    pub presmoother: SmootherConfig,

    /// Post-smoother and its sweep count (ν₂)
    pub postsmoother: SmootherConfig,

    /// Cycle type (V, W, or F)
    pub cycle_type: CycleType,

    /// Prolongator damping ω for aggregation (`None`: 4/3 / ρ(D⁻¹A))
    pub interpolation_smoothing_omega: Option<f64>,

    /// Solver on the coarsest level
    pub coarse_solver: CoarseSolver,

    /// Largest coarsest level factorized densely; [`CoarseSolver::Lu`] falls
    /// back to Gauss-Seidel sweeps above it
    pub max_dense_size: usize,

    /// Power iterations for spectral radius estimates
    pub spectral_radius_iterations: usize,
}

impl Default for AmgConfig {
    fn default() -> Self {
        Self {
            coarsening: Coarsening::default(),
            strength_measure: StrengthMeasure::Classical,
            theta: 0.25,
            symmetry: Symmetry::Symmetric,
            max_levels: 10,
            max_coarse_size: 500,
            max_row_density: 100.0,
            stall_ratio: 0.9,
            stall_levels: 2,
            presmoother: SmootherConfig::default(),
            postsmoother: SmootherConfig::default(),
            cycle_type: CycleType::V,
            interpolation_smoothing_omega: None,
            coarse_solver: CoarseSolver::Lu,
            max_dense_size: 4000,
            spectral_radius_iterations: DEFAULT_POWER_ITERATIONS,
        }
    }
}

impl AmgConfig {
    /// Classical Ruge-Stuben AMG (the default)
    ///
    /// RS splitting, standard interpolation, θ = 0.25, symmetric Gauss-Seidel.
    pub fn ruge_stuben() -> Self {
        Self::default()
    }

    /// Smoothed aggregation AMG
    ///
    /// Symmetric strength with θ = 0, standard aggregation, one Jacobi step on
    /// the tentative prolongator.
    pub fn smoothed_aggregation() -> Self {
        Self {
            coarsening: Coarsening::Aggregation {
                method: AggregationMethod::Standard,
                smoother: ProlongationSmoother::Jacobi { degree: 1 },
            },
            strength_measure: StrengthMeasure::Symmetric,
            theta: 0.0,
            ..Default::default()
        }
    }

    /// Classical AMG for nonsymmetric operators (pair with GMRES or BiCGStab)
    ///
    /// Restriction is built from `Aᵀ`; forward Gauss-Seidel before and
    /// backward Gauss-Seidel after the coarse correction.
    pub fn for_nonsymmetric() -> Self {
        Self {
            symmetry: Symmetry::Nonsymmetric,
            presmoother: SmootherConfig::new(
                SmootherKind::GaussSeidel {
                    sweep: GaussSeidelSweep::Forward,
                },
                1,
            ),
            postsmoother: SmootherConfig::new(
                SmootherKind::GaussSeidel {
                    sweep: GaussSeidelSweep::Backward,
                },
                1,
            ),
            ..Default::default()
        }
    }

    /// Configuration whose setup and smoothing parallelize well
    ///
    /// PMIS splitting and Chebyshev smoothing.
    pub fn for_parallel() -> Self {
        Self {
            coarsening: Coarsening::Classical {
                splitting: CfSplitting::Pmis,
                interpolation: ClassicalInterpolation::Standard,
            },
            presmoother: SmootherConfig::new(SmootherKind::Chebyshev { degree: 2 }, 1),
            postsmoother: SmootherConfig::new(SmootherKind::Chebyshev { degree: 2 }, 1),
            ..Default::default()
        }
    }

    /// Check every parameter range
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.theta) {
            return Err(AmgError::invalid_config(
                "theta",
                format!("must lie in [0, 1], got {}", self.theta),
            ));
        }
        if let Coarsening::Classical {
            splitting: CfSplitting::CompatibleRelaxation(cr),
            ..
        } = &self.coarsening
        {
            cr.validate()?;
        }
        if self.max_levels == 0 {
            return Err(AmgError::invalid_config("max_levels", "must be at least 1"));
        }
        if self.max_coarse_size == 0 {
            return Err(AmgError::invalid_config("max_coarse_size", "must be at least 1"));
        }
        if !(self.max_row_density > 0.0) {
            return Err(AmgError::invalid_config(
                "max_row_density",
                format!("must be positive, got {}", self.max_row_density),
            ));
        }
        if !(self.stall_ratio > 0.0 && self.stall_ratio <= 1.0) {
            return Err(AmgError::invalid_config(
                "stall_ratio",
                format!("must lie in (0, 1], got {}", self.stall_ratio),
            ));
        }
        if self.stall_levels == 0 {
            return Err(AmgError::invalid_config("stall_levels", "must be at least 1"));
        }
        validate_smoother("presmoother", &self.presmoother.kind)?;
        validate_smoother("postsmoother", &self.postsmoother.kind)?;
        if self.presmoother.sweeps + self.postsmoother.sweeps == 0 {
            return Err(AmgError::invalid_config(
                "presmoother",
                "pre- and post-smoothing sweeps cannot both be zero",
            ));
        }
        if let Some(omega) = self.interpolation_smoothing_omega {
            if !(omega.is_finite() && omega > 0.0) {
                return Err(AmgError::invalid_config(
                    "interpolation_smoothing_omega",
                    format!("must be positive, got {omega}"),
                ));
            }
        }
        if let CoarseSolver::Relaxation { kind, sweeps } = &self.coarse_solver {
            validate_smoother("coarse_solver", kind)?;
            if *sweeps == 0 {
                return Err(AmgError::invalid_config("coarse_solver", "needs at least one sweep"));
            }
        }
        if self.max_dense_size == 0 {
            return Err(AmgError::invalid_config("max_dense_size", "must be at least 1"));
        }
        if self.spectral_radius_iterations == 0 {
            return Err(AmgError::invalid_config(
                "spectral_radius_iterations",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON (missing fields take their defaults)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn validate_smoother(parameter: &'static str, kind: &SmootherKind) -> Result<()> {
    match *kind {
        SmootherKind::Jacobi { omega } if !(omega > 0.0 && omega < 2.0) => Err(
            AmgError::invalid_config(parameter, format!("Jacobi weight must lie in (0, 2), got {omega}")),
        ),
        SmootherKind::Chebyshev { degree: 0 } => Err(AmgError::invalid_config(
            parameter,
            "Chebyshev degree must be at least 1",
        )),
        _ => Ok(()),
    }
}
