//! Relaxation (smoothing) methods
//!
//! Each smoother updates `x` in place towards the solution of `A x = b`:
//!
//! | Variant | Update | Sequential dependency |
//! |---|---|---|
//! | Jacobi | `x += ω D⁻¹ (b - A x)` | none, rows updated in parallel |
//! | l1-Jacobi | `x += L⁻¹ (b - A x)`, `L_ii = Σ_j |a_ij|` | none |
//! | Gauss-Seidel | in-place row sweep (forward, backward or both) | row i reads rows updated before it, always sequential |
//! | Multicolor Gauss-Seidel | Gauss-Seidel over a greedy coloring | rows of one color in parallel, colors in sequence |
//! | Chebyshev | degree-k Chebyshev polynomial in `D⁻¹A` | none, built from SpMVs |
//!
//! Rows with a zero diagonal are left unchanged by the point smoothers.

use crate::blas_helpers::axpy;
use crate::parallel::{parallel_map_indexed, parallel_map_over};
use crate::sparse::CsrMatrix;
use crate::spectral::{dinv_a_spectral_radius, inverse_diagonal};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Chebyshev interval relative to the ρ(D⁻¹A) estimate
const CHEBYSHEV_UPPER_FACTOR: f64 = 1.1;
const CHEBYSHEV_LOWER_RATIO: f64 = 1.0 / 30.0;

/// Direction of a Gauss-Seidel sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GaussSeidelSweep {
    /// Rows 0..n
    Forward,
    /// Rows n..0
    Backward,
    /// Forward then backward; keeps the preconditioner symmetric
    #[default]
    Symmetric,
}

/// Smoother variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SmootherKind {
    /// Weighted Jacobi - fully parallel, requires damping (ω ≈ 2/3)
    Jacobi {
        /// Damping factor
        omega: f64,
    },
    /// l1-Jacobi - Jacobi with l1 row-norm scaling, no damping needed
    L1Jacobi,
    /// Gauss-Seidel in natural ordering
    GaussSeidel {
        /// Sweep direction
        sweep: GaussSeidelSweep,
    },
    /// Symmetric Gauss-Seidel over a greedy multicoloring
    MulticolorGaussSeidel,
    /// Chebyshev polynomial smoother on [ρ/30, 1.1ρ] of D⁻¹A
    Chebyshev {
        /// Polynomial degree (SpMVs per sweep)
        degree: usize,
    },
}

impl Default for SmootherKind {
    fn default() -> Self {
        SmootherKind::GaussSeidel {
            sweep: GaussSeidelSweep::Symmetric,
        }
    }
}

impl SmootherKind {
    /// Whether the update of one row never waits for another row's update
    /// within the same sweep
    ///
    /// Multicolor Gauss-Seidel counts as parallel: it is parallel inside each
    /// color, at the price of a reordered sweep.
    pub fn is_parallel(&self) -> bool {
        !matches!(self, SmootherKind::GaussSeidel { .. })
    }

    /// Whether applying the smoother is a symmetric operation on SPD matrices
    ///
    /// Symmetric pre/post smoothing is required for a symmetric cycle (CG, MINRES).
    pub fn is_symmetric(&self) -> bool {
        !matches!(
            self,
            SmootherKind::GaussSeidel {
                sweep: GaussSeidelSweep::Forward | GaussSeidelSweep::Backward
            }
        )
    }

    fn needs_spectrum(&self) -> bool {
        matches!(self, SmootherKind::Chebyshev { .. })
    }

    fn needs_colors(&self) -> bool {
        matches!(self, SmootherKind::MulticolorGaussSeidel)
    }
}

/// Smoother with its number of sweeps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Smoother variant
    pub kind: SmootherKind,
    /// Number of applications
    pub sweeps: usize,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            kind: SmootherKind::default(),
            sweeps: 1,
        }
    }
}

impl SmootherConfig {
    /// Create a smoother configuration
    pub fn new(kind: SmootherKind, sweeps: usize) -> Self {
        Self { kind, sweeps }
    }
}

/// Level data the smoothers depend on, computed once per level
#[derive(Debug, Clone)]
pub struct RelaxationSetup {
    diag_inv: Array1<f64>,
    l1_inv: Array1<f64>,
    chebyshev_bounds: Option<(f64, f64)>,
    colors: Option<Vec<Vec<usize>>>,
    power_iterations: usize,
}

impl RelaxationSetup {
    /// Precompute what `kinds` need for operator `a`
    pub fn new(a: &CsrMatrix, kinds: &[SmootherKind], power_iterations: usize) -> Self {
        let diag_inv = inverse_diagonal(a);
        let l1_inv = l1_inverse(a);
        let chebyshev_bounds = kinds
            .iter()
            .any(SmootherKind::needs_spectrum)
            .then(|| chebyshev_bounds(a, &diag_inv, power_iterations));
        let colors = kinds
            .iter()
            .any(SmootherKind::needs_colors)
            .then(|| greedy_coloring(a));

        Self {
            diag_inv,
            l1_inv,
            chebyshev_bounds,
            colors,
            power_iterations,
        }
    }

    /// Inverse diagonal (zero for zero-diagonal rows)
    pub fn diag_inv(&self) -> &Array1<f64> {
        &self.diag_inv
    }

    /// Number of rows the point smoothers skip because of a zero diagonal
    pub fn zero_diagonal_rows(&self) -> usize {
        self.diag_inv.iter().filter(|&&d| d == 0.0).count()
    }

    /// Number of colors of the multicolor ordering, if computed
    pub fn num_colors(&self) -> Option<usize> {
        self.colors.as_ref().map(Vec::len)
    }

    /// Apply `config` to `x` for operator `a`
    pub fn smooth(&self, a: &CsrMatrix, config: &SmootherConfig, x: &mut Array1<f64>, b: &Array1<f64>) {
        self.relax(a, &config.kind, x, b, config.sweeps);
    }

    /// Apply `sweeps` sweeps of `kind`
    pub fn relax(
        &self,
        a: &CsrMatrix,
        kind: &SmootherKind,
        x: &mut Array1<f64>,
        b: &Array1<f64>,
        sweeps: usize,
    ) {
        match *kind {
            SmootherKind::Jacobi { omega } => jacobi(a, &self.diag_inv, x, b, omega, sweeps),
            SmootherKind::L1Jacobi => jacobi(a, &self.l1_inv, x, b, 1.0, sweeps),
            SmootherKind::GaussSeidel { sweep } => gauss_seidel(a, x, b, sweep, sweeps),
            SmootherKind::MulticolorGaussSeidel => match &self.colors {
                Some(colors) => multicolor_gauss_seidel(a, &self.diag_inv, colors, x, b, sweeps),
                None => {
                    let colors = greedy_coloring(a);
                    multicolor_gauss_seidel(a, &self.diag_inv, &colors, x, b, sweeps)
                }
            },
            SmootherKind::Chebyshev { degree } => {
                let (lower, upper) = self
                    .chebyshev_bounds
                    .unwrap_or_else(|| chebyshev_bounds(a, &self.diag_inv, self.power_iterations));
                chebyshev(a, &self.diag_inv, x, b, lower, upper, degree, sweeps);
            }
        }
    }
}

fn l1_inverse(a: &CsrMatrix) -> Array1<f64> {
    Array1::from_iter((0..a.num_rows).map(|i| {
        let sum: f64 = a.row_entries(i).map(|(_, v)| v.abs()).sum();
        if sum > 0.0 { 1.0 / sum } else { 0.0 }
    }))
}

fn chebyshev_bounds(a: &CsrMatrix, diag_inv: &Array1<f64>, power_iterations: usize) -> (f64, f64) {
    let rho = dinv_a_spectral_radius(a, diag_inv, power_iterations);
    let upper = CHEBYSHEV_UPPER_FACTOR * rho;
    (CHEBYSHEV_LOWER_RATIO * upper, upper)
}

/// Weighted Jacobi: `x ← x + ω · scale ⊙ (b - A x)`
///
/// With `scale = D⁻¹` this is damped Jacobi, with the inverse l1 row norms it
/// is l1-Jacobi.
pub fn jacobi(
    a: &CsrMatrix,
    scale: &Array1<f64>,
    x: &mut Array1<f64>,
    b: &Array1<f64>,
    omega: f64,
    sweeps: usize,
) {
    let n = x.len();
    let mut r = Array1::zeros(n);
    for _ in 0..sweeps {
        a.residual_into(x, b, &mut r);
        let updates = parallel_map_indexed(n, |i| omega * scale[i] * r[i]);
        for (xi, delta) in x.iter_mut().zip(updates) {
            *xi += delta;
        }
    }
}

#[inline]
fn gauss_seidel_row(a: &CsrMatrix, x: &mut Array1<f64>, b: &Array1<f64>, i: usize) {
    let mut sum = b[i];
    let mut diag = 0.0;
    for (j, v) in a.row_entries(i) {
        if j == i {
            diag = v;
        } else {
            sum -= v * x[j];
        }
    }
    if diag != 0.0 {
        x[i] = sum / diag;
    }
}

/// Gauss-Seidel in natural ordering (sequential)
pub fn gauss_seidel(
    a: &CsrMatrix,
    x: &mut Array1<f64>,
    b: &Array1<f64>,
    sweep: GaussSeidelSweep,
    sweeps: usize,
) {
    let n = x.len();
    for _ in 0..sweeps {
        if matches!(sweep, GaussSeidelSweep::Forward | GaussSeidelSweep::Symmetric) {
            for i in 0..n {
                gauss_seidel_row(a, x, b, i);
            }
        }
        if matches!(sweep, GaussSeidelSweep::Backward | GaussSeidelSweep::Symmetric) {
            for i in (0..n).rev() {
                gauss_seidel_row(a, x, b, i);
            }
        }
    }
}

/// Greedy coloring of the symmetrized sparsity pattern of `a`
///
/// Rows are visited in index order and take the smallest color unused by
/// their neighbours, so rows of one color are never coupled.
pub fn greedy_coloring(a: &CsrMatrix) -> Vec<Vec<usize>> {
    let n = a.num_rows;
    let at = a.transpose();
    let mut color = vec![usize::MAX; n];
    let mut mark: Vec<usize> = Vec::new();
    let mut num_colors = 0;

    for i in 0..n {
        for &j in a.row_cols(i).iter().chain(at.row_cols(i)) {
            if j != i && color[j] != usize::MAX {
                if mark.len() <= color[j] {
                    mark.resize(color[j] + 1, usize::MAX);
                }
                mark[color[j]] = i;
            }
        }
        let c = (0..).find(|&c| c >= mark.len() || mark[c] != i).unwrap_or(0);
        color[i] = c;
        num_colors = num_colors.max(c + 1);
    }

    let mut classes = vec![Vec::new(); num_colors];
    for (i, &c) in color.iter().enumerate() {
        classes[c].push(i);
    }
    classes
}

/// Symmetric multicolor Gauss-Seidel: colors forward then backward
pub fn multicolor_gauss_seidel(
    a: &CsrMatrix,
    diag_inv: &Array1<f64>,
    colors: &[Vec<usize>],
    x: &mut Array1<f64>,
    b: &Array1<f64>,
    sweeps: usize,
) {
    let relax_color = |x: &mut Array1<f64>, rows: &[usize]| {
        let updated = {
            let xr: &Array1<f64> = x;
            parallel_map_over(rows, |i| {
                if diag_inv[i] == 0.0 {
                    return xr[i];
                }
                let off: f64 = a
                    .row_entries(i)
                    .filter(|&(j, _)| j != i)
                    .map(|(j, v)| v * xr[j])
                    .sum();
                (b[i] - off) * diag_inv[i]
            })
        };
        for (&i, v) in rows.iter().zip(updated) {
            x[i] = v;
        }
    };

    for _ in 0..sweeps {
        for rows in colors {
            relax_color(x, rows);
        }
        for rows in colors.iter().rev() {
            relax_color(x, rows);
        }
    }
}

/// Chebyshev smoother for `D⁻¹A` on the interval `[lower, upper]`
///
/// Each sweep applies the degree-`degree` Chebyshev semi-iteration, i.e.
/// `degree` residual evaluations.
#[allow(clippy::too_many_arguments)]
pub fn chebyshev(
    a: &CsrMatrix,
    diag_inv: &Array1<f64>,
    x: &mut Array1<f64>,
    b: &Array1<f64>,
    lower: f64,
    upper: f64,
    degree: usize,
    sweeps: usize,
) {
    if degree == 0 || upper <= 0.0 {
        return;
    }
    let theta = 0.5 * (upper + lower);
    let delta = 0.5 * (upper - lower);
    let sigma = theta / delta;

    let n = x.len();
    let mut r = Array1::zeros(n);
    for _ in 0..sweeps {
        a.residual_into(x, b, &mut r);
        r *= diag_inv;
        let mut d = &r / theta;
        let mut rho = 1.0 / sigma;

        for k in 0..degree {
            axpy(1.0, &d, x);
            if k + 1 == degree {
                break;
            }
            a.residual_into(x, b, &mut r);
            r *= diag_inv;
            let rho_next = 1.0 / (2.0 * sigma - rho);
            d *= rho_next * rho;
            axpy(2.0 * rho_next / delta, &r, &mut d);
            rho = rho_next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas_helpers::norm2;

    fn laplacian_2d(nx: usize) -> CsrMatrix {
        let n = nx * nx;
        let mut triplets = Vec::new();
        for y in 0..nx {
            for x in 0..nx {
                let i = y * nx + x;
                triplets.push((i, i, 4.0));
                if x + 1 < nx {
                    triplets.push((i, i + 1, -1.0));
                    triplets.push((i + 1, i, -1.0));
                }
                if y + 1 < nx {
                    triplets.push((i, i + nx, -1.0));
                    triplets.push((i + nx, i, -1.0));
                }
            }
        }
        CsrMatrix::from_triplets(n, n, triplets).unwrap()
    }

    fn all_kinds() -> Vec<SmootherKind> {
        vec![
            SmootherKind::Jacobi { omega: 2.0 / 3.0 },
            SmootherKind::L1Jacobi,
            SmootherKind::GaussSeidel {
                sweep: GaussSeidelSweep::Forward,
            },
            SmootherKind::GaussSeidel {
                sweep: GaussSeidelSweep::Backward,
            },
            SmootherKind::GaussSeidel {
                sweep: GaussSeidelSweep::Symmetric,
            },
            SmootherKind::MulticolorGaussSeidel,
            SmootherKind::Chebyshev { degree: 3 },
        ]
    }

    #[test]
    fn test_every_smoother_reduces_error() {
        let a = laplacian_2d(12);
        let n = a.num_rows;
        let x_exact = Array1::from_iter((0..n).map(|i| ((i * 7) % 11) as f64 - 5.0));
        let b = a.matvec(&x_exact);
        let kinds = all_kinds();
        let setup = RelaxationSetup::new(&a, &kinds, 20);

        for kind in &kinds {
            let mut x = Array1::zeros(n);
            setup.relax(&a, kind, &mut x, &b, 3);
            let err = norm2(&(&x - &x_exact));
            assert!(err < norm2(&x_exact), "{kind:?} did not reduce the error");
        }
    }

    #[test]
    fn test_zero_sweeps_is_identity() {
        let a = laplacian_2d(4);
        let b = Array1::ones(16);
        let setup = RelaxationSetup::new(&a, &all_kinds(), 10);
        for kind in &all_kinds() {
            let mut x = Array1::from_elem(16, 0.5);
            setup.relax(&a, kind, &mut x, &b, 0);
            assert_eq!(x, Array1::from_elem(16, 0.5));
        }
    }

    #[test]
    fn test_fixed_point_is_preserved() {
        let a = laplacian_2d(5);
        let x_exact = Array1::from_iter((0..25).map(|i| i as f64));
        let b = a.matvec(&x_exact);
        let setup = RelaxationSetup::new(&a, &all_kinds(), 10);
        for kind in &all_kinds() {
            let mut x = x_exact.clone();
            setup.relax(&a, kind, &mut x, &b, 2);
            assert!(norm2(&(&x - &x_exact)) < 1e-10, "{kind:?}");
        }
    }

    #[test]
    fn test_coloring_is_proper() {
        let a = laplacian_2d(6);
        let colors = greedy_coloring(&a);
        // The 5-point stencil is bipartite
        assert_eq!(colors.len(), 2);
        for rows in &colors {
            for &i in rows {
                for &j in a.row_cols(i) {
                    assert!(j == i || !rows.contains(&j));
                }
            }
        }
        assert_eq!(colors.iter().map(Vec::len).sum::<usize>(), 36);
    }

    #[test]
    fn test_multicolor_matches_reordered_gauss_seidel() {
        let a = laplacian_2d(3);
        let b = Array1::from_iter((0..9).map(|i| i as f64));
        let colors = greedy_coloring(&a);
        let dinv = inverse_diagonal(&a);

        let mut x_mc = Array1::zeros(9);
        multicolor_gauss_seidel(&a, &dinv, &colors, &mut x_mc, &b, 1);

        // Same sweep done row by row in color order
        let mut x_ref = Array1::zeros(9);
        let order: Vec<usize> = colors
            .iter()
            .flatten()
            .copied()
            .chain(colors.iter().rev().flatten().copied())
            .collect();
        for &i in &order {
            gauss_seidel_row(&a, &mut x_ref, &b, i);
        }
        for (p, q) in x_mc.iter().zip(x_ref.iter()) {
            assert!((p - q).abs() < 1e-14);
        }
    }

    #[test]
    fn test_zero_diagonal_row_untouched() {
        let a = CsrMatrix::from_dense(&ndarray::array![[2.0, 1.0], [1.0, 0.0]], 0.0);
        let b = ndarray::array![1.0, 1.0];
        let setup = RelaxationSetup::new(&a, &[SmootherKind::default()], 5);
        assert_eq!(setup.zero_diagonal_rows(), 1);

        let mut x = ndarray::array![0.0, 7.0];
        setup.relax(&a, &SmootherKind::Jacobi { omega: 1.0 }, &mut x, &b, 1);
        assert_eq!(x[1], 7.0);
        gauss_seidel(&a, &mut x, &b, GaussSeidelSweep::Symmetric, 1);
        assert_eq!(x[1], 7.0);
    }

    #[test]
    fn test_parallel_classification() {
        assert!(SmootherKind::Jacobi { omega: 0.7 }.is_parallel());
        assert!(SmootherKind::Chebyshev { degree: 2 }.is_parallel());
        assert!(SmootherKind::MulticolorGaussSeidel.is_parallel());
        assert!(!SmootherKind::default().is_parallel());
        assert!(SmootherKind::default().is_symmetric());
        assert!(
            !SmootherKind::GaussSeidel {
                sweep: GaussSeidelSweep::Forward
            }
            .is_symmetric()
        );
    }

    #[test]
    fn test_config_json() {
        let config = SmootherConfig::new(SmootherKind::Chebyshev { degree: 2 }, 3);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"chebyshev\""));
        let back: SmootherConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let partial: SmootherConfig = serde_json::from_str("{\"sweeps\": 4}").unwrap();
        assert_eq!(partial.kind, SmootherKind::default());
        assert_eq!(partial.sweeps, 4);
    }
}
