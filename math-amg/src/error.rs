//! Error types for multigrid construction and solves.
//!
//! Construction-time structural problems (malformed input, singular coarse
//! operator, invalid configuration) are returned as [`AmgError`] immediately.
//! Numerical outcomes of a solve (non-convergence, Krylov breakdown) are
//! reported as a [`SolveStatus`](crate::solve::SolveStatus) next to the best
//! iterate; the matching error variants here exist for callers that prefer
//! `?` via [`SolveResult::into_result`](crate::solve::SolveResult::into_result).

use thiserror::Error;

/// Errors that can occur while building or applying a multigrid hierarchy.
#[derive(Debug, Error)]
pub enum AmgError {
    /// Structurally invalid input (non-square operator, inconsistent CSR arrays, ...).
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// Description of the defect
        reason: String,
    },

    /// A vector or matrix has the wrong size.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Where the mismatch was detected
        context: &'static str,
        /// Expected length / row count
        expected: usize,
        /// Length / row count actually supplied
        got: usize,
    },

    /// A matrix entry is NaN or infinite.
    #[error("non-finite matrix entry at ({row}, {col})")]
    NonFiniteValue {
        /// Row of the offending entry
        row: usize,
        /// Column of the offending entry
        col: usize,
    },

    /// A vector entry is NaN or infinite.
    #[error("non-finite vector entry at index {index}")]
    NonFiniteVector {
        /// Index of the offending entry
        index: usize,
    },

    /// A configuration parameter is outside its valid range.
    #[error("invalid configuration: {parameter} {reason}")]
    InvalidConfig {
        /// Name of the parameter
        parameter: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The direct solve on the coarsest level met a (numerically) zero pivot.
    #[error("coarsest-level operator of size {size} is numerically singular")]
    SingularCoarseOperator {
        /// Size of the coarsest operator
        size: usize,
    },

    /// Coarsening stopped making progress.
    ///
    /// Hierarchy construction never fails with this variant; it terminates
    /// early and records the stall, see [`Hierarchy::stagnation`](crate::Hierarchy::stagnation).
    #[error("coarsening stagnated at level {level} (size ratio {ratio:.3})")]
    StagnatedCoarsening {
        /// Level whose coarsening stalled
        level: usize,
        /// Coarse size / fine size of the last stalled step
        ratio: f64,
    },

    /// A Krylov recurrence produced a (near) zero pivot or direction.
    #[error("{method} breakdown at iteration {iteration}")]
    KrylovBreakdown {
        /// Krylov method name
        method: &'static str,
        /// Iteration at which the breakdown was detected
        iteration: usize,
    },

    /// The iteration budget was exhausted before reaching the tolerance.
    #[error("no convergence after {iterations} iterations (relative residual {residual:.3e})")]
    NonConvergence {
        /// Iterations performed
        iterations: usize,
        /// Final relative residual
        residual: f64,
    },

    /// Arrays could not be combined because their shapes disagree.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// JSON (de)serialisation of a configuration failed.
    #[error("configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Reading or writing a configuration file failed.
    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for multigrid operations.
pub type Result<T> = std::result::Result<T, AmgError>;

impl AmgError {
    /// Returns `true` if the error describes bad caller input.
    ///
    /// This includes `MalformedInput`, `DimensionMismatch`, `Shape`,
    /// `NonFiniteValue` and `NonFiniteVector`.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AmgError::MalformedInput { .. }
                | AmgError::DimensionMismatch { .. }
                | AmgError::Shape(_)
                | AmgError::NonFiniteValue { .. }
                | AmgError::NonFiniteVector { .. }
        )
    }

    /// Returns `true` if the error is a numerical outcome rather than a defect
    /// of the input.
    pub fn is_numerical_error(&self) -> bool {
        matches!(
            self,
            AmgError::SingularCoarseOperator { .. }
                | AmgError::StagnatedCoarsening { .. }
                | AmgError::KrylovBreakdown { .. }
                | AmgError::NonConvergence { .. }
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AmgError::MalformedInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(parameter: &'static str, reason: impl Into<String>) -> Self {
        AmgError::InvalidConfig {
            parameter,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AmgError::DimensionMismatch {
            context: "right-hand side",
            expected: 10,
            got: 7,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch in right-hand side: expected 10, got 7"
        );
    }

    #[test]
    fn test_is_input_error() {
        let input = AmgError::NonFiniteValue { row: 1, col: 2 };
        let numerical = AmgError::SingularCoarseOperator { size: 4 };

        assert!(input.is_input_error());
        assert!(!numerical.is_input_error());
    }

    #[test]
    fn test_is_numerical_error() {
        let breakdown = AmgError::KrylovBreakdown {
            method: "CG",
            iteration: 3,
        };
        let config = AmgError::invalid_config("theta", "must lie in [0, 1]");

        assert!(breakdown.is_numerical_error());
        assert!(!config.is_numerical_error());
        assert!(config.to_string().contains("theta"));
    }
}
