//! Direct solvers for linear systems
//!
//! This module provides the dense solve used on the coarsest level:
//! - [`lu_factorize`] / [`LuFactorization::solve`]: LU decomposition with partial pivoting

mod lu;

pub use lu::{LuFactorization, lu_factorize, lu_solve};
