//! Strength of connection
//!
//! A [`StrengthGraph`] marks which off-diagonal couplings of an operator are
//! "strong", i.e. carry smooth error between unknowns. Two measures:
//!
//! - [`StrengthMeasure::Classical`]: `-a_ij >= θ · max_{k≠i}(-a_ik)`, the
//!   Ruge-Stuben test for M-matrix-like operators.
//! - [`StrengthMeasure::Symmetric`]: `|a_ij| >= θ · sqrt(|a_ii · a_jj|)`, the
//!   scale-invariant test used for aggregation.
//!
//! Rows whose diagonal is (numerically) zero are entirely weak. θ = 0 marks
//! every stored off-diagonal entry strong.

use crate::parallel::parallel_map_indexed;
use crate::sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

/// Relative size below which a diagonal entry disqualifies its row
const ZERO_DIAGONAL_TOL: f64 = 1e-14;

/// Strength-of-connection measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthMeasure {
    /// Classical Ruge-Stuben measure on negative couplings
    #[default]
    Classical,
    /// Symmetric (affinity) measure scaled by the diagonal
    Symmetric,
}

impl StrengthMeasure {
    /// Compute the strength graph of `matrix` for threshold `theta`
    pub fn compute(self, matrix: &CsrMatrix, theta: f64) -> StrengthGraph {
        match self {
            StrengthMeasure::Classical => classical_strength(matrix, theta),
            StrengthMeasure::Symmetric => symmetric_strength(matrix, theta),
        }
    }
}

/// Sparsity pattern of the strong couplings of an operator
///
/// Row `i` lists the unknowns `j` that `i` strongly depends on, with the
/// coupling magnitude as weight. The diagonal is never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthGraph {
    graph: CsrMatrix,
}

impl StrengthGraph {
    fn from_rows(n: usize, rows: Vec<Vec<(usize, f64)>>) -> Self {
        let mut row_ptrs = Vec::with_capacity(n + 1);
        row_ptrs.push(0);
        let nnz = rows.iter().map(Vec::len).sum();
        let mut col_indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        for row in rows {
            for (j, w) in row {
                col_indices.push(j);
                values.push(w);
            }
            row_ptrs.push(col_indices.len());
        }
        Self {
            graph: CsrMatrix {
                num_rows: n,
                num_cols: n,
                values,
                col_indices,
                row_ptrs,
            },
        }
    }

    /// Number of unknowns
    pub fn num_rows(&self) -> usize {
        self.graph.num_rows
    }

    /// Total number of strong couplings
    pub fn nnz(&self) -> usize {
        self.graph.nnz()
    }

    /// Unknowns that `i` strongly depends on (sorted)
    pub fn neighbors(&self, i: usize) -> &[usize] {
        self.graph.row_cols(i)
    }

    /// Strong neighbours of `i` with their coupling magnitudes
    pub fn weighted_neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.graph.row_entries(i)
    }

    /// Whether `i` strongly depends on `j`
    pub fn is_strong(&self, i: usize, j: usize) -> bool {
        self.neighbors(i).binary_search(&j).is_ok()
    }

    /// Transposed graph: row `i` lists the unknowns that strongly depend on `i`
    pub fn transpose(&self) -> StrengthGraph {
        Self {
            graph: self.graph.transpose(),
        }
    }

    /// Influence count |Sᵀ_i| of every unknown
    pub fn influence_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_rows()];
        for &j in &self.graph.col_indices {
            counts[j] += 1;
        }
        counts
    }
}

fn diagonal_is_degenerate(matrix: &CsrMatrix, i: usize, a_ii: f64) -> bool {
    let row_max = matrix
        .row_entries(i)
        .fold(0.0_f64, |m, (_, v)| m.max(v.abs()));
    row_max == 0.0 || a_ii.abs() <= ZERO_DIAGONAL_TOL * row_max
}

/// Classical Ruge-Stuben strength of connection
pub fn classical_strength(matrix: &CsrMatrix, theta: f64) -> StrengthGraph {
    let n = matrix.num_rows;
    let rows = parallel_map_indexed(n, |i| {
        let a_ii = matrix.get(i, i);
        if diagonal_is_degenerate(matrix, i, a_ii) {
            return Vec::new();
        }

        if theta == 0.0 {
            return matrix
                .row_entries(i)
                .filter(|&(j, v)| j != i && v != 0.0)
                .map(|(j, v)| (j, v.abs()))
                .collect();
        }

        let max_neg = matrix
            .row_entries(i)
            .filter(|&(j, _)| j != i)
            .fold(0.0_f64, |m, (_, v)| m.max(-v));
        if max_neg <= 0.0 {
            return Vec::new();
        }

        let threshold = theta * max_neg;
        matrix
            .row_entries(i)
            .filter(|&(j, v)| j != i && -v >= threshold)
            .map(|(j, v)| (j, -v))
            .collect()
    });

    StrengthGraph::from_rows(n, rows)
}

/// Symmetric strength of connection for aggregation
pub fn symmetric_strength(matrix: &CsrMatrix, theta: f64) -> StrengthGraph {
    let n = matrix.num_rows;
    let diag = matrix.diagonal();
    let degenerate: Vec<bool> = (0..n)
        .map(|i| diagonal_is_degenerate(matrix, i, diag[i]))
        .collect();

    let rows = parallel_map_indexed(n, |i| {
        if degenerate[i] {
            return Vec::new();
        }
        matrix
            .row_entries(i)
            .filter(|&(j, v)| {
                j != i
                    && v != 0.0
                    && !degenerate[j]
                    && v.abs() >= theta * (diag[i] * diag[j]).abs().sqrt()
            })
            .map(|(j, v)| (j, v.abs()))
            .collect()
    });

    StrengthGraph::from_rows(n, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets).unwrap()
    }

    #[test]
    fn test_classical_laplacian_all_neighbors_strong() {
        let a = laplacian_1d(5);
        let s = classical_strength(&a, 0.25);

        assert_eq!(s.neighbors(0), &[1]);
        assert_eq!(s.neighbors(2), &[1, 3]);
        assert_eq!(s.nnz(), 8);
        assert!(!s.is_strong(2, 2));
    }

    #[test]
    fn test_classical_filters_weak_and_positive() {
        // Row 0: -4 strong, -0.5 weak for θ = 0.25, +3 never strong
        let a = CsrMatrix::from_dense(
            &array![
                [10.0, -4.0, -0.5, 3.0],
                [-4.0, 10.0, 0.0, 0.0],
                [-0.5, 0.0, 10.0, 0.0],
                [3.0, 0.0, 0.0, 10.0]
            ],
            0.0,
        );
        let s = classical_strength(&a, 0.25);
        assert_eq!(s.neighbors(0), &[1]);
        // Row 3 has no negative off-diagonal
        assert!(s.neighbors(3).is_empty());
    }

    #[test]
    fn test_theta_zero_marks_every_offdiagonal() {
        let a = CsrMatrix::from_dense(&array![[10.0, -4.0, 3.0], [-4.0, 10.0, 0.0], [3.0, 0.0, 1.0]], 0.0);
        let s = classical_strength(&a, 0.0);
        assert_eq!(s.neighbors(0), &[1, 2]);
        assert_eq!(s.neighbors(2), &[0]);
    }

    #[test]
    fn test_zero_diagonal_row_is_weak() {
        let a = CsrMatrix::from_dense(&array![[0.0, -1.0], [-1.0, 2.0]], 0.0);
        let classical = classical_strength(&a, 0.25);
        assert!(classical.neighbors(0).is_empty());
        assert_eq!(classical.neighbors(1), &[0]);

        let symmetric = symmetric_strength(&a, 0.25);
        assert!(symmetric.neighbors(0).is_empty());
        assert!(symmetric.neighbors(1).is_empty());
    }

    #[test]
    fn test_symmetric_is_scale_invariant() {
        // Diagonal scaling D A D leaves the symmetric measure unchanged
        let a = laplacian_1d(6);
        let d = array![1.0, 100.0, 0.01, 5.0, 2.0, 0.5];
        let mut da = a.clone();
        da.scale_rows(&d);
        let mut scaled = da.transpose();
        scaled.scale_rows(&d);

        let s1 = symmetric_strength(&a, 0.3);
        let s2 = symmetric_strength(&scaled, 0.3);
        for i in 0..6 {
            assert_eq!(s1.neighbors(i), s2.neighbors(i));
        }
    }

    #[test]
    fn test_transpose_and_influence() {
        let a = CsrMatrix::from_dense(
            &array![[4.0, -1.0, -1.0], [0.0, 4.0, -1.0], [0.0, 0.0, 4.0]],
            0.0,
        );
        let s = classical_strength(&a, 0.5);
        assert_eq!(s.influence_counts(), vec![0, 1, 2]);

        let st = s.transpose();
        assert_eq!(st.neighbors(2), &[0, 1]);
        assert!(st.neighbors(0).is_empty());
    }

    #[test]
    fn test_measure_dispatch() {
        let a = laplacian_1d(4);
        assert_eq!(
            StrengthMeasure::Classical.compute(&a, 0.25),
            classical_strength(&a, 0.25)
        );
        assert_eq!(
            StrengthMeasure::Symmetric.compute(&a, 0.0),
            symmetric_strength(&a, 0.0)
        );
    }
}
