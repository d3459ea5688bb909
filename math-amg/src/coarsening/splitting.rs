//! Classical C/F splitting
//!
//! - **Ruge-Stuben**: sequential greedy selection driven by the influence
//!   measure λ_i = |Sᵀ_i|, maintained in a [`PriorityQueue`].
//! - **PMIS**: parallel modified independent set. Every round selects, in
//!   parallel, the undecided points whose weight beats all undecided strong
//!   neighbours; weights carry a deterministic per-index fraction so the result
//!   does not depend on thread scheduling.
//!
//! - **Compatible relaxation**: grows the coarse set until relaxation on the
//!   fine points alone converges fast, see [`compatible_relaxation_splitting`].
//!
//! All finish with the same pass: a Fine point without any strong Coarse
//! neighbour is promoted to Coarse.

use super::PriorityQueue;
use crate::blas_helpers::{dot, norm2};
use crate::error::{AmgError, Result};
use crate::parallel::parallel_map_over;
use crate::sparse::CsrMatrix;
use crate::strength::StrengthGraph;
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Candidate-set threshold of the first compatible relaxation pass (0.3²)
const CR_FIRST_THRESHOLD: f64 = 0.09;
/// Candidate-set threshold of later passes
const CR_THRESHOLD: f64 = 0.5;
const CR_SEED: u64 = 0x5eed_c0a5;

/// Point classification in classical AMG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointType {
    /// Kept on the coarse level
    Coarse,
    /// Interpolated from coarse neighbours
    Fine,
}

/// Settings of compatible relaxation coarsening
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibleRelaxationConfig {
    /// F-point Gauss-Seidel sweeps per rate estimate
    pub sweeps: usize,
    /// Stop adding coarse points once the F-relaxation rate is at most this
    pub target_rate: f64,
    /// Maximum number of candidate-selection passes
    pub max_passes: usize,
}

impl Default for CompatibleRelaxationConfig {
    fn default() -> Self {
        Self {
            sweeps: 3,
            target_rate: 0.7,
            max_passes: 20,
        }
    }
}

impl CompatibleRelaxationConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.sweeps == 0 {
            return Err(AmgError::invalid_config("splitting", "CR needs at least one sweep"));
        }
        if !(self.target_rate > 0.0 && self.target_rate < 1.0) {
            return Err(AmgError::invalid_config(
                "splitting",
                format!("CR target rate must lie in (0, 1), got {}", self.target_rate),
            ));
        }
        if self.max_passes == 0 {
            return Err(AmgError::invalid_config("splitting", "CR needs at least one pass"));
        }
        Ok(())
    }
}

/// C/F splitting algorithm
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfSplitting {
    /// Classical Ruge-Stuben first pass
    /// Good quality, sequential selection
    #[default]
    RugeStuben,

    /// Parallel Modified Independent Set (PMIS)
    /// Parallel selection, usually somewhat coarser grids
    Pmis,

    /// Compatible relaxation
    /// Coarse set chosen from the error F-relaxation cannot reduce
    CompatibleRelaxation(CompatibleRelaxationConfig),
}

impl CfSplitting {
    /// Split the unknowns of `a` into coarse and fine points
    ///
    /// `candidate` is the near-null-space vector; only compatible relaxation
    /// reads it.
    pub fn split(self, a: &CsrMatrix, strength: &StrengthGraph, candidate: ArrayView1<f64>) -> Splitting {
        match self {
            CfSplitting::RugeStuben => ruge_stuben_splitting(strength),
            CfSplitting::Pmis => pmis_splitting(strength),
            CfSplitting::CompatibleRelaxation(config) => {
                compatible_relaxation_splitting(a, strength, candidate, &config)
            }
        }
    }
}

/// Result of a C/F splitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splitting {
    point_types: Vec<PointType>,
}

impl Splitting {
    /// Wrap an explicit classification
    pub fn from_point_types(point_types: Vec<PointType>) -> Self {
        Self { point_types }
    }

    /// Number of fine-level unknowns
    pub fn len(&self) -> usize {
        self.point_types.len()
    }

    /// Whether the splitting is empty
    pub fn is_empty(&self) -> bool {
        self.point_types.is_empty()
    }

    /// Classification of every unknown
    pub fn point_types(&self) -> &[PointType] {
        &self.point_types
    }

    /// Whether unknown `i` is a coarse point
    pub fn is_coarse(&self, i: usize) -> bool {
        self.point_types[i] == PointType::Coarse
    }

    /// Number of coarse points
    pub fn num_coarse(&self) -> usize {
        self.point_types
            .iter()
            .filter(|&&t| t == PointType::Coarse)
            .count()
    }

    /// Fine indices of the coarse points, in increasing order
    pub fn coarse_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_coarse(i)).collect()
    }

    /// Coarse index of every fine unknown (`None` for fine points)
    pub fn fine_to_coarse(&self) -> Vec<Option<usize>> {
        let mut next = 0;
        self.point_types
            .iter()
            .map(|t| match t {
                PointType::Coarse => {
                    next += 1;
                    Some(next - 1)
                }
                PointType::Fine => None,
            })
            .collect()
    }
}

fn finalize(strength: &StrengthGraph, state: Vec<Option<PointType>>) -> Splitting {
    let mut point_types: Vec<PointType> = state
        .into_iter()
        .map(|t| t.unwrap_or(PointType::Fine))
        .collect();

    for i in 0..point_types.len() {
        if point_types[i] == PointType::Fine
            && !strength
                .neighbors(i)
                .iter()
                .any(|&j| point_types[j] == PointType::Coarse)
        {
            point_types[i] = PointType::Coarse;
        }
    }

    Splitting { point_types }
}

/// Ruge-Stuben first-pass C/F splitting
///
/// Unknowns nobody depends on start as Fine. The remaining ones are taken in
/// order of decreasing influence (lowest index first on ties): the selected
/// point becomes Coarse, every undecided point depending on it becomes Fine
/// and the points those new Fine points depend on gain priority.
pub fn ruge_stuben_splitting(strength: &StrengthGraph) -> Splitting {
    let n = strength.num_rows();
    let dependents = strength.transpose();
    let lambda = strength.influence_counts();

    let mut state: Vec<Option<PointType>> = vec![None; n];
    let mut queue = PriorityQueue::new(&lambda);
    for (i, &l) in lambda.iter().enumerate() {
        if l == 0 {
            state[i] = Some(PointType::Fine);
            queue.remove(i);
        }
    }

    while let Some((i, _)) = queue.pop() {
        state[i] = Some(PointType::Coarse);

        for &j in dependents.neighbors(i) {
            if state[j].is_some() {
                continue;
            }
            state[j] = Some(PointType::Fine);
            queue.remove(j);
            for &k in strength.neighbors(j) {
                if state[k].is_none() {
                    queue.increment(k);
                }
            }
        }

        for &j in strength.neighbors(i) {
            if state[j].is_none() {
                queue.decrement(j);
            }
        }
    }

    finalize(strength, state)
}

/// Deterministic fraction in [0, 1) used to break PMIS weight ties
fn tie_breaker(i: usize) -> f64 {
    // splitmix64 finalizer
    let mut z = (i as u64).wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

/// Parallel Modified Independent Set (PMIS) C/F splitting
pub fn pmis_splitting(strength: &StrengthGraph) -> Splitting {
    let n = strength.num_rows();
    let dependents = strength.transpose();
    let lambda = strength.influence_counts();
    let weights: Vec<f64> = (0..n).map(|i| lambda[i] as f64 + tie_breaker(i)).collect();

    // (weight, index) ordering is total, so each round selects at least one point
    let beats = |i: usize, j: usize| (weights[i], i) > (weights[j], j);

    let mut state: Vec<Option<PointType>> = lambda
        .iter()
        .map(|&l| if l == 0 { Some(PointType::Fine) } else { None })
        .collect();

    loop {
        let undecided: Vec<usize> = (0..n).filter(|&i| state[i].is_none()).collect();
        if undecided.is_empty() {
            break;
        }

        // Independent set: local weight maxima among undecided neighbours
        let selected = parallel_map_over(&undecided, |i| {
            strength
                .neighbors(i)
                .iter()
                .chain(dependents.neighbors(i))
                .all(|&j| state[j].is_some() || beats(i, j))
        });

        let new_coarse: Vec<usize> = undecided
            .iter()
            .zip(&selected)
            .filter_map(|(&i, &sel)| sel.then_some(i))
            .collect();

        for &c in &new_coarse {
            state[c] = Some(PointType::Coarse);
        }
        for &c in &new_coarse {
            for &j in dependents.neighbors(c) {
                if state[j].is_none() {
                    state[j] = Some(PointType::Fine);
                }
            }
        }
    }

    finalize(strength, state)
}

/// Compatible relaxation (CR) C/F splitting
///
/// Starting from an all-fine grid, each pass relaxes `A e = 0` on the fine
/// points with the coarse values pinned at zero, from a randomly perturbed
/// copy of `candidate`. The rate is the energy-norm reduction of the last
/// sweep. While it exceeds `target_rate`, fine points whose error relative to
/// `candidate` is still large form the candidate set; a greedy independent
/// set of it, weighted by that error and by the number of strong candidate
/// neighbours, becomes coarse.
pub fn compatible_relaxation_splitting(
    a: &CsrMatrix,
    strength: &StrengthGraph,
    candidate: ArrayView1<f64>,
    config: &CompatibleRelaxationConfig,
) -> Splitting {
    let n = a.num_rows;
    let diagonal = a.diagonal();
    let dependents = strength.transpose();
    let mut rng = StdRng::seed_from_u64(CR_SEED);
    let mut coarse = vec![false; n];
    let mut e = Array1::zeros(n);

    for pass in 0..config.max_passes {
        for i in 0..n {
            let shape = if candidate[i] != 0.0 { candidate[i] } else { 1.0 };
            e[i] = if coarse[i] {
                0.0
            } else {
                shape * (1.0 + 0.1 * rng.random_range(-1.0_f64..1.0))
            };
        }
        let rate = f_relaxation_rate(a, &diagonal, &coarse, &mut e, config.sweeps);
        log::debug!(
            "CR pass {}: {} coarse points, F-relaxation rate {:.3}",
            pass,
            coarse.iter().filter(|&&c| c).count(),
            rate
        );
        if rate <= config.target_rate {
            break;
        }

        let measure: Vec<f64> = (0..n)
            .map(|i| match (coarse[i], candidate[i] != 0.0) {
                (true, _) => 0.0,
                (false, true) => (e[i] / candidate[i]).abs(),
                (false, false) => e[i].abs(),
            })
            .collect();
        let max = measure.iter().copied().fold(0.0_f64, f64::max);
        if !(max > 0.0 && max.is_finite()) {
            break;
        }
        let threshold = if pass == 0 { CR_FIRST_THRESHOLD } else { CR_THRESHOLD };
        let in_set: Vec<bool> = measure.iter().map(|&m| m / max > threshold).collect();

        let selected = weighted_independent_set(strength, &dependents, &measure, max, &in_set);
        if selected.is_empty() {
            break;
        }
        for i in selected {
            coarse[i] = true;
        }
    }

    let state = coarse
        .into_iter()
        .map(|c| Some(if c { PointType::Coarse } else { PointType::Fine }))
        .collect();
    finalize(strength, state)
}

/// Gauss-Seidel on `A e = 0` over the fine points; returns the last
/// per-sweep energy-norm ratio
fn f_relaxation_rate(
    a: &CsrMatrix,
    diagonal: &Array1<f64>,
    coarse: &[bool],
    e: &mut Array1<f64>,
    sweeps: usize,
) -> f64 {
    let mut previous = energy_norm(a, e);
    let mut rate = 0.0;
    for _ in 0..sweeps {
        for i in 0..a.num_rows {
            if coarse[i] || diagonal[i] == 0.0 {
                continue;
            }
            let off: f64 = a
                .row_entries(i)
                .filter(|&(j, _)| j != i)
                .map(|(j, v)| v * e[j])
                .sum();
            e[i] = -off / diagonal[i];
        }
        let current = energy_norm(a, e);
        rate = if previous > 0.0 { current / previous } else { 0.0 };
        previous = current;
    }
    rate
}

/// `sqrt(eᵀ A e)`, or the 2-norm when `A` is not positive on `e`
fn energy_norm(a: &CsrMatrix, e: &Array1<f64>) -> f64 {
    let energy = dot(e, &a.matvec(e));
    if energy > 0.0 { energy.sqrt() } else { norm2(e) }
}

/// Greedy independent set of the marked points, heaviest first
fn weighted_independent_set(
    strength: &StrengthGraph,
    dependents: &StrengthGraph,
    measure: &[f64],
    max: f64,
    in_set: &[bool],
) -> Vec<usize> {
    let neighbors = |i: usize| strength.neighbors(i).iter().chain(dependents.neighbors(i));
    let mut order: Vec<(f64, usize)> = (0..measure.len())
        .filter(|&i| in_set[i])
        .map(|i| {
            let links = neighbors(i).filter(|&&j| in_set[j]).count();
            (measure[i] / max + links as f64, i)
        })
        .collect();
    order.sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)));

    let mut blocked = vec![false; measure.len()];
    let mut selected = Vec::new();
    for (_, i) in order {
        if blocked[i] {
            continue;
        }
        selected.push(i);
        blocked[i] = true;
        for &j in neighbors(i) {
            blocked[j] = true;
        }
    }
    selected
}
