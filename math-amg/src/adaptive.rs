//! Adaptive (bootstrap) refinement of near-null-space candidates
//!
//! When the constant vector is a poor near-null-space guess (scaled
//! operators, non-M-matrices, systems with several rigid modes), the
//! hierarchy converges slowly on exactly the error it cannot represent. This
//! module exposes that error by cycling on `A x = 0` from a random start:
//! whatever survives the cycles is, by construction, the slowest mode. The
//! surviving vector is added to the candidate set and the hierarchy rebuilt.
//!
//! Aggregation hierarchies accumulate candidates up to
//! [`AdaptiveConfig::max_candidates`]; classical hierarchies interpolate a
//! single vector, which is replaced. Refinement stops after
//! [`AdaptiveConfig::max_rounds`] rounds, once the estimated convergence
//! factor drops below [`AdaptiveConfig::target_factor`], or when a round
//! improves it by less than [`AdaptiveConfig::improvement_tol`]. The best
//! hierarchy seen is returned.

use crate::blas_helpers::norm2;
use crate::config::AmgConfig;
use crate::error::{AmgError, Result};
use crate::hierarchy::{Hierarchy, build_hierarchy};
use crate::sparse::CsrMatrix;
use ndarray::{Array1, Array2, Axis, concatenate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Settings of the bootstrap loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Maximum number of rebuild rounds
    pub max_rounds: usize,
    /// Cycles run on the homogeneous system per estimate
    pub cycles_per_round: usize,
    /// Upper bound on the number of candidates (aggregation only)
    pub max_candidates: usize,
    /// Minimum factor improvement for another round
    pub improvement_tol: f64,
    /// Stop once the estimated factor is at or below this value
    pub target_factor: f64,
    /// Seed of the random start vectors
    pub seed: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            cycles_per_round: 10,
            max_candidates: 4,
            improvement_tol: 0.01,
            target_factor: 0.1,
            seed: 42,
        }
    }
}

impl AdaptiveConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.cycles_per_round == 0 {
            return Err(AmgError::invalid_config("cycles_per_round", "must be at least 1"));
        }
        if self.max_candidates == 0 {
            return Err(AmgError::invalid_config("max_candidates", "must be at least 1"));
        }
        if !(self.improvement_tol >= 0.0 && self.improvement_tol.is_finite()) {
            return Err(AmgError::invalid_config(
                "improvement_tol",
                format!("must be non-negative, got {}", self.improvement_tol),
            ));
        }
        if !(self.target_factor > 0.0 && self.target_factor < 1.0) {
            return Err(AmgError::invalid_config(
                "target_factor",
                format!("must lie in (0, 1), got {}", self.target_factor),
            ));
        }
        Ok(())
    }
}

/// Outcome of adaptive refinement
#[derive(Debug, Clone)]
pub struct AdaptiveResult {
    /// Best hierarchy found
    pub hierarchy: Hierarchy,
    /// Candidates the best hierarchy was built from (n × K)
    pub candidates: Array2<f64>,
    /// Estimated convergence factor of every hierarchy built, initial first
    pub factors: Vec<f64>,
    /// Rebuild rounds performed
    pub rounds: usize,
}

impl AdaptiveResult {
    /// Estimated factor of the returned hierarchy
    pub fn best_factor(&self) -> f64 {
        self.factors.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

/// Build a hierarchy and refine its near-null space adaptively
pub fn adaptive_hierarchy(
    matrix: &CsrMatrix,
    config: &AmgConfig,
    adaptive: &AdaptiveConfig,
) -> Result<AdaptiveResult> {
    adaptive.validate()?;
    let n = matrix.num_rows;
    let accumulate = config.coarsening.is_aggregation();
    let mut rng = StdRng::seed_from_u64(adaptive.seed);

    let mut candidates = Array2::ones((n, 1));
    let mut hierarchy = build_hierarchy(matrix, config, Some(candidates.clone()))?;
    let (mut factor, mut slow_mode) = estimate_factor(&hierarchy, adaptive.cycles_per_round, &mut rng)?;
    let mut factors = vec![factor];
    log::debug!("adaptive AMG: initial factor {factor:.4}");

    let mut rounds = 0;
    while rounds < adaptive.max_rounds && factor > adaptive.target_factor {
        let Some(mode) = slow_mode.take() else {
            break;
        };
        rounds += 1;

        let next_candidates = if accumulate {
            append_candidate(&candidates, mode, adaptive.max_candidates)?
        } else {
            mode.insert_axis(Axis(1))
        };
        let next = build_hierarchy(matrix, config, Some(next_candidates.clone()))?;
        let (next_factor, next_mode) = estimate_factor(&next, adaptive.cycles_per_round, &mut rng)?;
        factors.push(next_factor);
        log::debug!(
            "adaptive AMG round {}: {} candidates, factor {:.4} -> {:.4}",
            rounds,
            next_candidates.ncols(),
            factor,
            next_factor
        );

        let improvement = factor - next_factor;
        if next_factor < factor {
            hierarchy = next;
            candidates = next_candidates;
            factor = next_factor;
            slow_mode = next_mode;
        }
        if improvement < adaptive.improvement_tol {
            break;
        }
    }

    log::info!(
        "adaptive AMG: {} rounds, {} candidates, estimated factor {:.4}",
        rounds,
        candidates.ncols(),
        factor
    );
    Ok(AdaptiveResult {
        hierarchy,
        candidates,
        factors,
        rounds,
    })
}

/// Cycle on `A x = 0` from a random vector
///
/// Returns the asymptotic factor estimate `‖x_k‖ / ‖x_{k-1}‖` of the last
/// cycle and the surviving error scaled to unit max-norm, or `None` when the
/// cycles annihilated it.
fn estimate_factor(
    hierarchy: &Hierarchy,
    cycles: usize,
    rng: &mut StdRng,
) -> Result<(f64, Option<Array1<f64>>)> {
    let n = hierarchy.size();
    let b = Array1::zeros(n);
    let mut x = Array1::from_iter((0..n).map(|_| rng.random_range(-1.0_f64..1.0)));
    let mut work = hierarchy.workspace();

    let mut previous = norm2(&x);
    let mut factor = 0.0;
    for _ in 0..cycles {
        hierarchy.cycle(&mut x, &b, &mut work)?;
        let current = norm2(&x);
        if !(current > 0.0) || !current.is_finite() {
            return Ok((if current == 0.0 { 0.0 } else { 1.0 }, None));
        }
        factor = current / previous;
        previous = current;
    }

    let max = x.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    x.mapv_inplace(|v| v / max);
    Ok((factor, Some(x)))
}

/// Add `candidate` as a column, replacing the newest added one when full
fn append_candidate(
    candidates: &Array2<f64>,
    candidate: Array1<f64>,
    max: usize,
) -> Result<Array2<f64>> {
    let column = candidate.insert_axis(Axis(1));
    if candidates.ncols() < max {
        Ok(concatenate(Axis(1), &[candidates.view(), column.view()])?)
    } else if max == 1 {
        Ok(column)
    } else {
        let mut replaced = candidates.clone();
        replaced.column_mut(max - 1).assign(&column.column(0));
        Ok(replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::krylov::test_problems::poisson_2d;

    /// D·A·D with a strongly varying diagonal: near-null space is D⁻¹·1
    fn scaled_poisson(nx: usize) -> CsrMatrix {
        let a = poisson_2d(nx);
        let d = Array1::from_iter((0..nx * nx).map(|i| 1.0 + 9.0 * ((i * 7919) % 101) as f64 / 100.0));
        let mut triplets = Vec::new();
        for i in 0..a.num_rows {
            for (j, v) in a.row_entries(i) {
                triplets.push((i, j, d[i] * v * d[j]));
            }
        }
        CsrMatrix::from_triplets(a.num_rows, a.num_cols, triplets).unwrap()
    }

    fn sa_config() -> AmgConfig {
        AmgConfig {
            max_coarse_size: 30,
            ..AmgConfig::smoothed_aggregation()
        }
    }

    #[test]
    fn test_refinement_never_worsens_the_factor() {
        let a = scaled_poisson(16);
        let adaptive = AdaptiveConfig {
            target_factor: 1e-3,
            ..Default::default()
        };
        let result = adaptive_hierarchy(&a, &sa_config(), &adaptive).unwrap();

        assert!(result.rounds >= 1);
        assert_eq!(result.factors.len(), result.rounds + 1);
        assert!(result.best_factor() <= result.factors[0]);
        assert_eq!(result.candidates.nrows(), 256);
        assert!(result.candidates.ncols() <= adaptive.max_candidates);
        assert_eq!(result.hierarchy.size(), 256);
    }

    #[test]
    fn test_refinement_is_deterministic() {
        let a = scaled_poisson(12);
        let adaptive = AdaptiveConfig {
            max_rounds: 2,
            target_factor: 1e-3,
            ..Default::default()
        };
        let first = adaptive_hierarchy(&a, &sa_config(), &adaptive).unwrap();
        let second = adaptive_hierarchy(&a, &sa_config(), &adaptive).unwrap();
        assert_eq!(first.factors, second.factors);
        assert_eq!(first.candidates, second.candidates);
    }

    #[test]
    fn test_classical_keeps_a_single_candidate() {
        let a = scaled_poisson(12);
        let config = AmgConfig {
            max_coarse_size: 20,
            ..Default::default()
        };
        let adaptive = AdaptiveConfig {
            max_rounds: 2,
            target_factor: 1e-3,
            ..Default::default()
        };
        let result = adaptive_hierarchy(&a, &config, &adaptive).unwrap();
        assert_eq!(result.candidates.ncols(), 1);
    }

    #[test]
    fn test_zero_rounds_returns_the_initial_hierarchy() {
        let a = poisson_2d(10);
        let adaptive = AdaptiveConfig {
            max_rounds: 0,
            ..Default::default()
        };
        let result = adaptive_hierarchy(&a, &sa_config(), &adaptive).unwrap();
        assert_eq!(result.rounds, 0);
        assert_eq!(result.factors.len(), 1);
        assert!(result.candidates.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_append_candidate() {
        let base = Array2::ones((3, 1));
        let grown = append_candidate(&base, Array1::from_vec(vec![1.0, 2.0, 3.0]), 2).unwrap();
        assert_eq!(grown.ncols(), 2);
        let replaced = append_candidate(&grown, Array1::from_vec(vec![0.0, 1.0, 0.0]), 2).unwrap();
        assert_eq!(replaced.ncols(), 2);
        assert_eq!(replaced[[1, 1]], 1.0);
        assert_eq!(replaced[[0, 0]], 1.0);
    }

    #[test]
    fn test_append_candidate_rejects_wrong_length() {
        let base = Array2::ones((3, 1));
        let err = append_candidate(&base, Array1::zeros(4), 2).unwrap_err();
        assert!(matches!(err, AmgError::Shape(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_invalid_adaptive_config() {
        let bad = AdaptiveConfig {
            cycles_per_round: 0,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(AmgError::InvalidConfig { parameter: "cycles_per_round", .. })
        ));
        let bad = AdaptiveConfig {
            target_factor: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
