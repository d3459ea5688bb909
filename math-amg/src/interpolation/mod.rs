//! Prolongation operators
//!
//! - [`classical`]: direct and standard interpolation from a C/F splitting
//! - [`aggregation`]: tentative and smoothed prolongators from aggregates
//!
//! Every prolongator is n_fine × n_coarse and interpolates the coarse
//! near-null-space candidates back to the fine ones.

pub mod aggregation;
pub mod classical;

pub use aggregation::{ProlongationSmoother, TentativeProlongator, fit_candidates};
pub use classical::{
    ClassicalInterpolation, classical_interpolation, direct_interpolation, inject,
    rescale_to_candidate, standard_interpolation,
};
