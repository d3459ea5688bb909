//! Multigrid cycles
//!
//! One cycle at level `l`: presmooth, restrict the residual, solve the coarse
//! correction equation from a zero guess (recursively, or exactly on the
//! coarsest level), prolongate and add the correction, postsmooth.
//!
//! - **V**: one recursive visit per level
//! - **W**: two recursive visits per level
//! - **F**: an F-cycle followed by a V-cycle on the next level
//!
//! All temporaries live in a [`CycleWorkspace`] owned by the caller, so a
//! shared [`Hierarchy`] can be cycled from several threads at once.

use crate::error::{AmgError, Result};
use crate::hierarchy::Hierarchy;
use crate::traits::Preconditioner;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Recursion pattern of a multigrid cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    /// V-cycle
    #[default]
    V,
    /// W-cycle
    W,
    /// F-cycle
    F,
}

/// Per-level buffers for one cycle invocation
#[derive(Debug, Clone)]
pub struct CycleWorkspace {
    /// Residual at each level
    residual: Vec<Array1<f64>>,
    /// Prolongated correction at each level
    correction: Vec<Array1<f64>>,
    /// Coarse-level iterate (unused on level 0)
    solution: Vec<Array1<f64>>,
    /// Coarse-level right-hand side (unused on level 0)
    rhs: Vec<Array1<f64>>,
}

impl CycleWorkspace {
    /// Allocate buffers sized for `hierarchy`
    pub fn new(hierarchy: &Hierarchy) -> Self {
        let sizes: Vec<usize> = hierarchy.levels.iter().map(|l| l.size()).collect();
        let alloc = |skip_finest: bool| {
            sizes
                .iter()
                .enumerate()
                .map(|(i, &n)| Array1::zeros(if skip_finest && i == 0 { 0 } else { n }))
                .collect::<Vec<_>>()
        };
        Self {
            residual: alloc(false),
            correction: alloc(false),
            solution: alloc(true),
            rhs: alloc(true),
        }
    }

    fn fits(&self, hierarchy: &Hierarchy) -> bool {
        self.residual.len() == hierarchy.levels.len()
            && self
                .residual
                .iter()
                .zip(&hierarchy.levels)
                .all(|(r, l)| r.len() == l.size())
    }
}

/// Workspaces kept by a hierarchy for its [`Preconditioner`] applications
///
/// A Krylov loop takes and returns the same workspace on every iteration;
/// concurrent applications each take their own.
#[derive(Debug, Default)]
pub(crate) struct WorkspacePool(Mutex<Vec<CycleWorkspace>>);

impl Clone for WorkspacePool {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl WorkspacePool {
    fn take(&self, hierarchy: &Hierarchy) -> CycleWorkspace {
        self.0
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_else(|| CycleWorkspace::new(hierarchy))
    }

    fn put(&self, work: CycleWorkspace) {
        if let Ok(mut pool) = self.0.lock() {
            pool.push(work);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().map_or(0, |pool| pool.len())
    }
}

impl Hierarchy {
    /// Allocate a workspace for [`Hierarchy::cycle`]
    pub fn workspace(&self) -> CycleWorkspace {
        CycleWorkspace::new(self)
    }

    /// Apply one cycle of the configured type to `x` for right-hand side `b`
    pub fn cycle(&self, x: &mut Array1<f64>, b: &Array1<f64>, work: &mut CycleWorkspace) -> Result<()> {
        self.cycle_with(self.config().cycle_type, x, b, work)
    }

    /// Apply one cycle of type `cycle_type`
    pub fn cycle_with(
        &self,
        cycle_type: CycleType,
        x: &mut Array1<f64>,
        b: &Array1<f64>,
        work: &mut CycleWorkspace,
    ) -> Result<()> {
        let n = self.size();
        for (context, len) in [("cycle iterate", x.len()), ("cycle right-hand side", b.len())] {
            if len != n {
                return Err(AmgError::DimensionMismatch {
                    context,
                    expected: n,
                    got: len,
                });
            }
        }
        if !work.fits(self) {
            *work = CycleWorkspace::new(self);
        }
        self.visit(0, cycle_type, x, b, work);
        Ok(())
    }

    fn visit(
        &self,
        level: usize,
        cycle_type: CycleType,
        x: &mut Array1<f64>,
        b: &Array1<f64>,
        work: &mut CycleWorkspace,
    ) {
        let coarsest = self.levels.len() - 1;
        if level == coarsest {
            self.coarse_solve_into(b, x);
            return;
        }

        let current = &self.levels[level];
        let config = self.config();
        let (Some(p), Some(r)) = (&current.prolongation, &current.restriction) else {
            return;
        };

        current.relaxation.smooth(&current.matrix, &config.presmoother, x, b);

        current.matrix.residual_into(x, b, &mut work.residual[level]);

        let mut coarse_x = std::mem::take(&mut work.solution[level + 1]);
        let mut coarse_b = std::mem::take(&mut work.rhs[level + 1]);
        r.matvec_into(&work.residual[level], &mut coarse_b);
        coarse_x.fill(0.0);

        let next = level + 1;
        match cycle_type {
            CycleType::V => self.visit(next, CycleType::V, &mut coarse_x, &coarse_b, work),
            CycleType::W => {
                // The coarsest solve is exact, one visit suffices there
                let visits = if next == coarsest { 1 } else { 2 };
                for _ in 0..visits {
                    self.visit(next, CycleType::W, &mut coarse_x, &coarse_b, work);
                }
            }
            CycleType::F => {
                self.visit(next, CycleType::F, &mut coarse_x, &coarse_b, work);
                if next != coarsest {
                    self.visit(next, CycleType::V, &mut coarse_x, &coarse_b, work);
                }
            }
        }

        p.matvec_into(&coarse_x, &mut work.correction[level]);
        *x += &work.correction[level];
        work.solution[next] = coarse_x;
        work.rhs[next] = coarse_b;

        current.relaxation.smooth(&current.matrix, &config.postsmoother, x, b);
    }
}

impl Preconditioner for Hierarchy {
    /// One cycle from a zero initial guess, reusing a pooled workspace
    fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        let n = self.size();
        if r.len() != n {
            return r.clone();
        }

        let mut z = Array1::zeros(n);
        let mut work = self.workspaces.take(self);
        self.visit(0, self.config().cycle_type, &mut z, r, &mut work);
        self.workspaces.put(work);
        z
    }
}
