//! Algebraic multigrid solvers and preconditioners for sparse linear systems
//!
//! This crate builds a multigrid hierarchy from a sparse matrix alone, with no
//! geometric mesh, and applies it as a stand-alone iterative solver or as a
//! preconditioner inside Krylov methods.
//!
//! # Features
//!
//! - **Coarsening**: classical Ruge-Stuben and PMIS C/F splitting, standard
//!   and naive aggregation
//! - **Interpolation**: direct and standard classical interpolation,
//!   tentative and (polynomial-)smoothed aggregation prolongators with
//!   multiple near-null-space candidates
//! - **Smoothers**: weighted Jacobi, l1-Jacobi, Gauss-Seidel (forward,
//!   backward, symmetric), multicolor Gauss-Seidel, Chebyshev
//! - **Cycles**: V, W and F
//! - **Krylov accelerators**: CG, GMRES(m), BiCGSTAB, MINRES
//! - **Adaptive refinement**: bootstrap discovery of near-null-space vectors
//!
//! # Example
//!
//! ```ignore
//! use math_audio_amg::{Accelerator, AmgConfig, CsrMatrix, Hierarchy, SolveConfig};
//!
//! let matrix = CsrMatrix::from_triplets(n, n, triplets)?;
//! let hierarchy = Hierarchy::new(&matrix, &AmgConfig::default())?;
//!
//! let result = hierarchy.solve(&rhs, None, &SolveConfig::with_accelerator(Accelerator::Cg))?;
//! assert!(result.converged());
//! ```

pub mod adaptive;
pub mod blas_helpers;
pub mod coarsening;
pub mod config;
pub mod cycle;
pub mod direct;
pub mod error;
pub mod hierarchy;
pub mod interpolation;
pub mod krylov;
pub mod parallel;
pub mod relaxation;
pub mod solve;
pub mod sparse;
pub mod spectral;
pub mod strength;
pub mod traits;

// Re-export main types
pub use error::{AmgError, Result};
pub use sparse::{CsrBuilder, CsrMatrix};
pub use traits::{IdentityPreconditioner, LinearOperator, Preconditioner};

// Configuration
pub use coarsening::{AggregationMethod, CfSplitting, CompatibleRelaxationConfig};
pub use config::{AmgConfig, CoarseSolver, Coarsening, Symmetry};
pub use interpolation::{ClassicalInterpolation, ProlongationSmoother};
pub use relaxation::{GaussSeidelSweep, SmootherConfig, SmootherKind};
pub use strength::StrengthMeasure;

// Hierarchy, cycles and solves
pub use adaptive::{AdaptiveConfig, AdaptiveResult, adaptive_hierarchy};
pub use cycle::{CycleType, CycleWorkspace};
pub use hierarchy::{Hierarchy, HierarchyDiagnostics, Level, StopReason, build_hierarchy};
pub use krylov::{KrylovConfig, bicgstab, cg, gmres, minres};
pub use solve::{Accelerator, SolveConfig, SolveResult, SolveStatus};
