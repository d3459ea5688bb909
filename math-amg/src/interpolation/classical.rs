//! Classical (Ruge-Stuben) interpolation
//!
//! Coarse points get identity rows. A fine point `i` interpolates from its
//! strong coarse neighbours `C_i`:
//!
//! - **Direct**: `w_ij = -α a_ij / a_ii` for negative couplings and
//!   `-β a_ij / a_ii` for positive ones, with `α = Σ_{k≠i} a_ik⁻ / Σ_{k∈C_i} a_ik⁻`
//!   and `β` likewise for positive entries. Positive couplings with no positive
//!   coarse counterpart are lumped into the diagonal.
//! - **Standard**: weak couplings are lumped into the diagonal and every strong
//!   fine neighbour `k` is distributed over `C_i` in proportion to `a_km`
//!   before the direct formula is applied.
//!
//! Both are then rescaled row by row so that the interpolation of the coarse
//! near-null-space vector reproduces the fine one exactly.

use crate::coarsening::Splitting;
use crate::parallel::parallel_map_indexed;
use crate::sparse::{CsrBuilder, CsrMatrix};
use crate::strength::StrengthGraph;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

const WEIGHT_TOL: f64 = 1e-15;

/// Classical interpolation formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassicalInterpolation {
    /// Direct interpolation - only immediate strong C connections
    Direct,
    /// Standard interpolation - strong F-F couplings routed through common C points
    #[default]
    Standard,
}

/// Build the classical prolongator for `splitting`
///
/// `near_null` is the fine near-null-space vector the rows are rescaled
/// against; its injection onto the coarse points is the coarse candidate.
pub fn classical_interpolation(
    a: &CsrMatrix,
    strength: &StrengthGraph,
    splitting: &Splitting,
    kind: ClassicalInterpolation,
    near_null: ArrayView1<f64>,
) -> CsrMatrix {
    let mut p = match kind {
        ClassicalInterpolation::Direct => direct_interpolation(a, strength, splitting),
        ClassicalInterpolation::Standard => standard_interpolation(a, strength, splitting),
    };
    let coarse = inject(near_null, splitting);
    rescale_to_candidate(&mut p, near_null, &coarse);
    p
}

/// Restrict a fine vector to the coarse points of `splitting`
pub fn inject(fine: ArrayView1<f64>, splitting: &Splitting) -> Array1<f64> {
    Array1::from_iter(splitting.coarse_indices().into_iter().map(|i| fine[i]))
}

/// Scale every row of `p` so that `(p · coarse)_i == fine_i`
///
/// Rows where the candidate or its interpolated value vanishes are left
/// untouched; scaling them would zero the whole row.
pub fn rescale_to_candidate(p: &mut CsrMatrix, fine: ArrayView1<f64>, coarse: &Array1<f64>) {
    for i in 0..p.num_rows {
        let range = p.row_range(i);
        let interpolated: f64 = p.col_indices[range.clone()]
            .iter()
            .zip(&p.values[range.clone()])
            .map(|(&j, &w)| w * coarse[j])
            .sum();
        if fine[i] != 0.0 && interpolated.abs() > WEIGHT_TOL * fine[i].abs().max(1.0) {
            let scale = fine[i] / interpolated;
            for w in &mut p.values[range] {
                *w *= scale;
            }
        }
    }
}

fn assemble_rows(n_fine: usize, n_coarse: usize, rows: Vec<Vec<(usize, f64)>>) -> CsrMatrix {
    let nnz = rows.iter().map(Vec::len).sum();
    let mut builder = CsrBuilder::with_capacity(n_fine, n_coarse, nnz);
    for row in rows {
        builder.add_row_entries(row.into_iter());
    }
    builder.finish()
}

/// Weights from the direct formula given the (possibly modified) row of `i`
///
/// `entries` holds every off-diagonal coupling of `i`, `coarse` the strong
/// coarse neighbours as `(fine index, coarse index)`.
fn direct_weights(
    diagonal: f64,
    entries: &[(usize, f64)],
    coarse: &[(usize, usize)],
) -> Vec<(usize, f64)> {
    let coupling = |j: usize| {
        entries
            .iter()
            .find(|&&(k, _)| k == j)
            .map_or(0.0, |&(_, v)| v)
    };

    let (mut sum_all_neg, mut sum_all_pos) = (0.0, 0.0);
    for &(_, v) in entries {
        if v < 0.0 {
            sum_all_neg += v;
        } else {
            sum_all_pos += v;
        }
    }
    let (mut sum_c_neg, mut sum_c_pos) = (0.0, 0.0);
    for &(j, _) in coarse {
        let v = coupling(j);
        if v < 0.0 {
            sum_c_neg += v;
        } else {
            sum_c_pos += v;
        }
    }

    let mut diagonal = diagonal;
    let beta = if sum_c_pos.abs() > WEIGHT_TOL {
        sum_all_pos / sum_c_pos
    } else {
        diagonal += sum_all_pos;
        0.0
    };
    let alpha = if sum_c_neg.abs() > WEIGHT_TOL {
        sum_all_neg / sum_c_neg
    } else {
        0.0
    };

    if diagonal.abs() <= WEIGHT_TOL {
        // Degenerate row: fall back to equal weights, fixed by the rescaling
        let w = 1.0 / coarse.len() as f64;
        return coarse.iter().map(|&(_, c)| (c, w)).collect();
    }

    coarse
        .iter()
        .map(|&(j, c)| {
            let v = coupling(j);
            let factor = if v < 0.0 { alpha } else { beta };
            (c, -factor * v / diagonal)
        })
        .collect()
}

fn strong_coarse_neighbors(
    strength: &StrengthGraph,
    fine_to_coarse: &[Option<usize>],
    i: usize,
) -> Vec<(usize, usize)> {
    strength
        .neighbors(i)
        .iter()
        .filter_map(|&j| fine_to_coarse[j].map(|c| (j, c)))
        .collect()
}

/// Direct interpolation (unscaled)
pub fn direct_interpolation(
    a: &CsrMatrix,
    strength: &StrengthGraph,
    splitting: &Splitting,
) -> CsrMatrix {
    let n = a.num_rows;
    let fine_to_coarse = splitting.fine_to_coarse();

    let rows = parallel_map_indexed(n, |i| {
        if let Some(c) = fine_to_coarse[i] {
            return vec![(c, 1.0)];
        }
        let coarse = strong_coarse_neighbors(strength, &fine_to_coarse, i);
        if coarse.is_empty() {
            return Vec::new();
        }
        let entries: Vec<(usize, f64)> = a.row_entries(i).filter(|&(j, _)| j != i).collect();
        direct_weights(a.get(i, i), &entries, &coarse)
    });

    assemble_rows(n, splitting.num_coarse(), rows)
}

/// Standard interpolation (unscaled)
pub fn standard_interpolation(
    a: &CsrMatrix,
    strength: &StrengthGraph,
    splitting: &Splitting,
) -> CsrMatrix {
    let n = a.num_rows;
    let fine_to_coarse = splitting.fine_to_coarse();

    let rows = parallel_map_indexed(n, |i| {
        if let Some(c) = fine_to_coarse[i] {
            return vec![(c, 1.0)];
        }
        let coarse = strong_coarse_neighbors(strength, &fine_to_coarse, i);
        if coarse.is_empty() {
            return Vec::new();
        }

        let mut diagonal = a.get(i, i);
        // Modified couplings of i to its strong coarse neighbours
        let mut modified: Vec<(usize, f64)> = coarse.iter().map(|&(j, _)| (j, a.get(i, j))).collect();

        for (k, a_ik) in a.row_entries(i) {
            if k == i || (fine_to_coarse[k].is_some() && strength.is_strong(i, k)) {
                continue;
            }
            if !strength.is_strong(i, k) {
                diagonal += a_ik;
                continue;
            }

            // Strong fine neighbour: spread a_ik over C_i through row k
            let a_kk = a.get(k, k);
            let shares: Vec<f64> = coarse
                .iter()
                .map(|&(m, _)| {
                    let a_km = a.get(k, m);
                    if a_km * a_kk < 0.0 { a_km } else { 0.0 }
                })
                .collect();
            let total: f64 = shares.iter().sum();
            if total.abs() <= WEIGHT_TOL {
                diagonal += a_ik;
                continue;
            }
            for (entry, share) in modified.iter_mut().zip(&shares) {
                entry.1 += a_ik * share / total;
            }
        }

        direct_weights(diagonal, &modified, &coarse)
    });

    assemble_rows(n, splitting.num_coarse(), rows)
}
