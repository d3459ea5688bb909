//! Multigrid hierarchy construction
//!
//! [`build_hierarchy`] repeatedly runs strength of connection, coarsening and
//! interpolation on the current operator and forms the next one with the
//! Galerkin product `A_c = R · A · P`. Construction stops when
//!
//! - the current level has at most `max_coarse_size` unknowns,
//! - `max_levels` levels exist,
//! - the average row density exceeds `max_row_density`,
//! - `stall_levels` consecutive steps reduce the size by less than `stall_ratio`,
//! - or the coarsener produces no smaller grid.
//!
//! The last level is equipped with the configured coarse solver. Levels are
//! immutable once built; a [`Hierarchy`] can be shared across threads and
//! cycled concurrently, each cycle owning its own workspace.

use crate::coarsening::{Aggregates, Splitting};
use crate::config::{AmgConfig, CoarseSolver, Coarsening, Symmetry};
use crate::cycle::WorkspacePool;
use crate::direct::{LuFactorization, lu_factorize};
use crate::error::{AmgError, Result};
use crate::interpolation::{ProlongationSmoother, classical_interpolation, fit_candidates, inject};
use crate::relaxation::{GaussSeidelSweep, RelaxationSetup, SmootherKind};
use crate::sparse::{CsrBuilder, CsrMatrix};
use crate::strength::StrengthGraph;
use ndarray::{Array1, Array2};
use std::fmt;
use std::time::Instant;

/// Symmetric Gauss-Seidel sweeps on a coarsest level too large for LU
const FALLBACK_COARSE_SWEEPS: usize = 10;

/// One level of the hierarchy
#[derive(Debug, Clone)]
pub struct Level {
    /// Operator at this level
    pub(crate) matrix: CsrMatrix,
    /// Prolongation to this level from the next coarser one (`None` on the coarsest)
    pub(crate) prolongation: Option<CsrMatrix>,
    /// Restriction from this level to the next coarser one
    pub(crate) restriction: Option<CsrMatrix>,
    /// Smoother data (inverse diagonals, spectral bounds, colors)
    pub(crate) relaxation: RelaxationSetup,
    /// Near-null-space candidates represented on this level
    pub(crate) near_null: Array2<f64>,
}

impl Level {
    /// Number of unknowns
    pub fn size(&self) -> usize {
        self.matrix.num_rows
    }

    /// Stored nonzeros of the operator
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    /// Operator at this level
    pub fn matrix(&self) -> &CsrMatrix {
        &self.matrix
    }

    /// Prolongation `P` (n_level × n_coarser), absent on the coarsest level
    pub fn prolongation(&self) -> Option<&CsrMatrix> {
        self.prolongation.as_ref()
    }

    /// Restriction `R` (n_coarser × n_level), absent on the coarsest level
    pub fn restriction(&self) -> Option<&CsrMatrix> {
        self.restriction.as_ref()
    }

    /// Precomputed smoother data
    pub fn relaxation(&self) -> &RelaxationSetup {
        &self.relaxation
    }

    /// Near-null-space candidates on this level (n_level × K)
    pub fn near_null_space(&self) -> &Array2<f64> {
        &self.near_null
    }
}

/// Solver attached to the coarsest level
#[derive(Debug, Clone)]
pub(crate) enum CoarseSolve {
    Lu(LuFactorization),
    Relaxation { kind: SmootherKind, sweeps: usize },
}

/// Why hierarchy construction stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The coarsest level reached `max_coarse_size`
    CoarseSizeReached,
    /// `max_levels` levels were built
    MaxLevels,
    /// The coarsest operator exceeds `max_row_density`
    DensityCeiling,
    /// The coarsening ratio exceeded `stall_ratio` for `stall_levels` steps
    StagnatedCoarsening,
    /// The coarsener could not produce a smaller grid
    NoCoarsening,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::CoarseSizeReached => "coarse size reached",
            StopReason::MaxLevels => "maximum number of levels",
            StopReason::DensityCeiling => "row density ceiling",
            StopReason::StagnatedCoarsening => "stagnated coarsening",
            StopReason::NoCoarsening => "no further coarsening",
        };
        f.write_str(text)
    }
}

/// Diagnostic information about a built hierarchy
#[derive(Debug, Clone)]
pub struct HierarchyDiagnostics {
    /// Number of levels
    pub num_levels: usize,
    /// Grid complexity
    pub grid_complexity: f64,
    /// Operator complexity
    pub operator_complexity: f64,
    /// Setup time in milliseconds
    pub setup_time_ms: f64,
    /// DOFs per level
    pub level_dofs: Vec<usize>,
    /// NNZ per level
    pub level_nnz: Vec<usize>,
    /// Why construction stopped
    pub stop_reason: StopReason,
}

/// Multigrid hierarchy, finest level first
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub(crate) levels: Vec<Level>,
    pub(crate) coarse_solve: CoarseSolve,
    config: AmgConfig,
    stop_reason: StopReason,
    /// (level, ratio) of the step that triggered the stall rule
    stall: Option<(usize, f64)>,
    setup_time_ms: f64,
    pub(crate) workspaces: WorkspacePool,
}

impl Hierarchy {
    /// Build a hierarchy with the constant vector as near-null space
    pub fn new(matrix: &CsrMatrix, config: &AmgConfig) -> Result<Self> {
        build_hierarchy(matrix, config, None)
    }

    /// Build a hierarchy for user-supplied near-null-space candidates (n × K)
    pub fn with_near_null_space(
        matrix: &CsrMatrix,
        config: &AmgConfig,
        near_null: Array2<f64>,
    ) -> Result<Self> {
        build_hierarchy(matrix, config, Some(near_null))
    }

    /// Get number of levels in hierarchy
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// All levels, finest first
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Level `index` (0 is the finest)
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    /// Number of unknowns on the finest level
    pub fn size(&self) -> usize {
        self.levels[0].size()
    }

    /// Finest-level operator
    pub fn matrix(&self) -> &CsrMatrix {
        &self.levels[0].matrix
    }

    /// Configuration the hierarchy was built with
    pub fn config(&self) -> &AmgConfig {
        &self.config
    }

    /// Why construction stopped
    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    /// The stall that ended construction, as an error value
    ///
    /// Returns `None` unless the stop reason is
    /// [`StopReason::StagnatedCoarsening`]. The hierarchy is usable either way.
    pub fn stagnation(&self) -> Option<AmgError> {
        self.stall
            .map(|(level, ratio)| AmgError::StagnatedCoarsening { level, ratio })
    }

    /// Get setup time in milliseconds
    pub fn setup_time_ms(&self) -> f64 {
        self.setup_time_ms
    }

    /// Get grid complexity (sum of DOFs / fine DOFs)
    pub fn grid_complexity(&self) -> f64 {
        let fine = self.levels[0].size() as f64;
        self.levels.iter().map(|l| l.size() as f64).sum::<f64>() / fine
    }

    /// Get operator complexity (sum of nnz / fine nnz)
    pub fn operator_complexity(&self) -> f64 {
        let fine = self.levels[0].nnz().max(1) as f64;
        self.levels.iter().map(|l| l.nnz() as f64).sum::<f64>() / fine
    }

    /// Get diagnostic information
    pub fn diagnostics(&self) -> HierarchyDiagnostics {
        HierarchyDiagnostics {
            num_levels: self.levels.len(),
            grid_complexity: self.grid_complexity(),
            operator_complexity: self.operator_complexity(),
            setup_time_ms: self.setup_time_ms,
            level_dofs: self.levels.iter().map(Level::size).collect(),
            level_nnz: self.levels.iter().map(Level::nnz).collect(),
            stop_reason: self.stop_reason,
        }
    }

    /// Solver actually attached to the coarsest level
    pub fn coarse_solver(&self) -> CoarseSolver {
        match &self.coarse_solve {
            CoarseSolve::Lu(_) => CoarseSolver::Lu,
            CoarseSolve::Relaxation { kind, sweeps } => CoarseSolver::Relaxation {
                kind: *kind,
                sweeps: *sweeps,
            },
        }
    }

    /// Solve on the coarsest level
    ///
    /// The LU solve overwrites `x`; the relaxation solve starts from it.
    pub(crate) fn coarse_solve_into(&self, b: &Array1<f64>, x: &mut Array1<f64>) {
        let coarsest = &self.levels[self.levels.len() - 1];
        match &self.coarse_solve {
            CoarseSolve::Lu(lu) => lu.solve_into(b, x),
            CoarseSolve::Relaxation { kind, sweeps } => {
                coarsest.relaxation.relax(&coarsest.matrix, kind, x, b, *sweeps);
            }
        }
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_nnz: usize = self.levels.iter().map(Level::nnz).sum();
        writeln!(f, "Multigrid hierarchy")?;
        writeln!(f, "  Number of levels:    {}", self.levels.len())?;
        writeln!(f, "  Operator complexity: {:.3}", self.operator_complexity())?;
        writeln!(f, "  Grid complexity:     {:.3}", self.grid_complexity())?;
        writeln!(f, "  Stop reason:         {}", self.stop_reason)?;
        writeln!(f, "  level   unknowns   nonzeros")?;
        for (i, level) in self.levels.iter().enumerate() {
            let share = 100.0 * level.nnz() as f64 / total_nnz.max(1) as f64;
            writeln!(
                f,
                "  {:>5} {:>10} {:>10} [{:5.2}%]",
                i,
                level.size(),
                level.nnz(),
                share
            )?;
        }
        Ok(())
    }
}

/// Result of coarsening one level
struct CoarseningStep {
    prolongation: CsrMatrix,
    restriction: CsrMatrix,
    coarse_candidates: Array2<f64>,
}

/// Build a multigrid hierarchy for `matrix`
///
/// `near_null` holds the near-null-space candidates column-wise (n × K) and
/// defaults to the constant vector. Classical coarsening interpolates the
/// first candidate exactly; aggregation fits all K of them.
///
/// Fails on malformed input, an invalid configuration, or a singular
/// coarsest operator when the coarse solver is [`CoarseSolver::Lu`].
pub fn build_hierarchy(
    matrix: &CsrMatrix,
    config: &AmgConfig,
    near_null: Option<Array2<f64>>,
) -> Result<Hierarchy> {
    let start = Instant::now();
    config.validate()?;
    matrix.ensure_square()?;
    matrix.ensure_finite()?;
    let n = matrix.num_rows;
    if n == 0 {
        return Err(AmgError::malformed("operator has no rows"));
    }

    let near_null = match near_null {
        Some(b) => {
            check_candidates(&b, n)?;
            b
        }
        None => Array2::ones((n, 1)),
    };

    let smoother_kinds = [config.presmoother.kind, config.postsmoother.kind];
    let mut levels = Vec::new();
    let mut current = matrix.clone();
    let mut candidates = near_null;
    let mut stalled_steps = 0;
    let mut stall = None;

    let stop_reason = loop {
        let index = levels.len();
        let size = current.num_rows;

        if size <= config.max_coarse_size {
            break StopReason::CoarseSizeReached;
        }
        if index + 1 >= config.max_levels {
            break StopReason::MaxLevels;
        }
        if current.average_row_density() > config.max_row_density {
            break StopReason::DensityCeiling;
        }

        let Some(step) = coarsen(&current, &candidates, config)? else {
            break StopReason::NoCoarsening;
        };
        let coarse_size = step.prolongation.num_cols;
        let coarse = step.restriction.matmul(&current.matmul(&step.prolongation));
        let ratio = coarse_size as f64 / size as f64;
        log::debug!(
            "AMG level {}: {} unknowns, {} nnz -> {} coarse unknowns (ratio {:.3})",
            index,
            size,
            current.nnz(),
            coarse_size,
            ratio
        );

        let relaxation = RelaxationSetup::new(
            &current,
            &smoother_kinds,
            config.spectral_radius_iterations,
        );
        levels.push(Level {
            matrix: std::mem::replace(&mut current, coarse),
            prolongation: Some(step.prolongation),
            restriction: Some(step.restriction),
            relaxation,
            near_null: std::mem::replace(&mut candidates, step.coarse_candidates),
        });

        if ratio > config.stall_ratio {
            stalled_steps += 1;
            if stalled_steps >= config.stall_levels {
                log::warn!(
                    "AMG coarsening stagnated at level {} (ratio {:.3} > {})",
                    index,
                    ratio,
                    config.stall_ratio
                );
                stall = Some((index, ratio));
                break StopReason::StagnatedCoarsening;
            }
        } else {
            stalled_steps = 0;
        }
    };

    let (coarse_solve, coarse_kinds) = match config.coarse_solver {
        CoarseSolver::Lu if current.num_rows > config.max_dense_size => {
            log::warn!(
                "AMG coarsest level has {} unknowns (> max_dense_size {}), using {} Gauss-Seidel sweeps instead of LU",
                current.num_rows,
                config.max_dense_size,
                FALLBACK_COARSE_SWEEPS
            );
            let kind = SmootherKind::GaussSeidel {
                sweep: GaussSeidelSweep::Symmetric,
            };
            (
                CoarseSolve::Relaxation {
                    kind,
                    sweeps: FALLBACK_COARSE_SWEEPS,
                },
                vec![kind],
            )
        }
        CoarseSolver::Lu => (CoarseSolve::Lu(lu_factorize(&current.to_dense())?), vec![]),
        CoarseSolver::Relaxation { kind, sweeps } => {
            (CoarseSolve::Relaxation { kind, sweeps }, vec![kind])
        }
    };
    let relaxation = RelaxationSetup::new(
        &current,
        &[&smoother_kinds[..], &coarse_kinds[..]].concat(),
        config.spectral_radius_iterations,
    );
    levels.push(Level {
        matrix: current,
        prolongation: None,
        restriction: None,
        relaxation,
        near_null: candidates,
    });

    for (i, level) in levels.iter().enumerate() {
        let skipped = level.relaxation.zero_diagonal_rows();
        if skipped > 0 {
            log::warn!("AMG level {i}: {skipped} rows with zero diagonal are skipped by point smoothers");
        }
    }

    let hierarchy = Hierarchy {
        levels,
        coarse_solve,
        config: config.clone(),
        stop_reason,
        stall,
        setup_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        workspaces: WorkspacePool::default(),
    };
    log::info!(
        "AMG hierarchy: {} levels, grid complexity {:.3}, operator complexity {:.3}, setup {:.1} ms ({})",
        hierarchy.num_levels(),
        hierarchy.grid_complexity(),
        hierarchy.operator_complexity(),
        hierarchy.setup_time_ms,
        hierarchy.stop_reason
    );
    Ok(hierarchy)
}

fn check_candidates(b: &Array2<f64>, n: usize) -> Result<()> {
    if b.nrows() != n {
        return Err(AmgError::DimensionMismatch {
            context: "near-null-space candidates",
            expected: n,
            got: b.nrows(),
        });
    }
    if b.ncols() == 0 {
        return Err(AmgError::malformed(
            "at least one near-null-space candidate is required",
        ));
    }
    if let Some(((row, _), _)) = b.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(AmgError::NonFiniteVector { index: row });
    }
    Ok(())
}

/// Coarsen `a` once; `None` when no smaller grid results
fn coarsen(
    a: &CsrMatrix,
    candidates: &Array2<f64>,
    config: &AmgConfig,
) -> Result<Option<CoarseningStep>> {
    let strength = config.strength_measure.compute(a, config.theta);
    match config.coarsening {
        Coarsening::Classical {
            splitting,
            interpolation,
        } => {
            let splitting = splitting.split(a, &strength, candidates.column(0));
            let num_coarse = splitting.num_coarse();
            if num_coarse == 0 || num_coarse >= a.num_rows {
                return Ok(None);
            }
            let prolongation =
                classical_interpolation(a, &strength, &splitting, interpolation, candidates.column(0));
            let restriction = match config.symmetry {
                Symmetry::Symmetric => prolongation.transpose(),
                Symmetry::Nonsymmetric => {
                    let at = a.transpose();
                    let strength_t = config.strength_measure.compute(&at, config.theta);
                    classical_interpolation(
                        &at,
                        &strength_t,
                        &splitting,
                        interpolation,
                        candidates.column(0),
                    )
                    .transpose()
                }
            };
            Ok(Some(CoarseningStep {
                prolongation,
                restriction,
                coarse_candidates: inject_candidates(candidates, &splitting),
            }))
        }
        Coarsening::Aggregation { method, smoother } => {
            let aggregates = method.aggregate(&strength);
            aggregation_step(a, &aggregates, &strength, candidates, smoother, config)
        }
    }
}

fn aggregation_step(
    a: &CsrMatrix,
    aggregates: &Aggregates,
    strength: &StrengthGraph,
    candidates: &Array2<f64>,
    smoother: ProlongationSmoother,
    config: &AmgConfig,
) -> Result<Option<CoarseningStep>> {
    if aggregates.num_aggregates() == 0 || strength.nnz() == 0 {
        return Ok(None);
    }
    let tentative = fit_candidates(aggregates, candidates.view())?;
    let (p0, coarse_candidates) =
        drop_empty_columns(tentative.prolongator, tentative.coarse_candidates);
    if p0.num_cols == 0 || p0.num_cols >= a.num_rows {
        return Ok(None);
    }

    let omega = config.interpolation_smoothing_omega;
    let iterations = config.spectral_radius_iterations;
    let prolongation = smoother.smooth(a, &p0, omega, iterations);
    let restriction = match config.symmetry {
        Symmetry::Symmetric => prolongation.transpose(),
        Symmetry::Nonsymmetric => smoother
            .smooth(&a.transpose(), &p0, omega, iterations)
            .transpose(),
    };
    Ok(Some(CoarseningStep {
        prolongation,
        restriction,
        coarse_candidates,
    }))
}

/// Inject every candidate column onto the coarse points
fn inject_candidates(candidates: &Array2<f64>, splitting: &Splitting) -> Array2<f64> {
    let mut coarse = Array2::zeros((splitting.num_coarse(), candidates.ncols()));
    for (c, column) in candidates.columns().into_iter().enumerate() {
        coarse.column_mut(c).assign(&inject(column, splitting));
    }
    coarse
}

/// Remove tentative-prolongator columns left empty by rank-deficient
/// aggregates, together with the matching coarse candidate rows
///
/// An empty column would give the coarse operator a zero row and column.
fn drop_empty_columns(p: CsrMatrix, coarse: Array2<f64>) -> (CsrMatrix, Array2<f64>) {
    let mut used = vec![false; p.num_cols];
    for &j in &p.col_indices {
        used[j] = true;
    }
    if used.iter().all(|&u| u) {
        return (p, coarse);
    }

    let kept: Vec<usize> = (0..p.num_cols).filter(|&j| used[j]).collect();
    let mut remap = vec![0usize; p.num_cols];
    for (new, &old) in kept.iter().enumerate() {
        remap[old] = new;
    }
    let mut builder = CsrBuilder::with_capacity(p.num_rows, kept.len(), p.nnz());
    for i in 0..p.num_rows {
        builder.add_row_entries(p.row_entries(i).map(|(j, v)| (remap[j], v)));
    }
    let coarse = coarse.select(ndarray::Axis(0), &kept);
    log::debug!(
        "AMG aggregation: dropped {} rank-deficient coarse columns",
        p.num_cols - kept.len()
    );
    (builder.finish(), coarse)
}
