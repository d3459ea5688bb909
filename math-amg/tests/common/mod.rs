//! Test-problem gallery shared by the integration tests

#![allow(dead_code)]

use math_audio_amg::CsrMatrix;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 1D Poisson, Dirichlet boundary: tridiag(-1, 2, -1)
pub fn poisson_1d(n: usize) -> CsrMatrix {
    let mut triplets = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push((i, i, 2.0));
        if i > 0 {
            triplets.push((i, i - 1, -1.0));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, -1.0));
        }
    }
    CsrMatrix::from_triplets(n, n, triplets).expect("valid 1D Poisson triplets")
}

/// 5-point anisotropic Laplacian on an nx × ny grid: -eps·u_xx - u_yy
pub fn anisotropic_2d(nx: usize, ny: usize, eps: f64) -> CsrMatrix {
    let n = nx * ny;
    let mut triplets = Vec::with_capacity(5 * n);
    for j in 0..ny {
        for i in 0..nx {
            let row = j * nx + i;
            triplets.push((row, row, 2.0 * eps + 2.0));
            if i > 0 {
                triplets.push((row, row - 1, -eps));
            }
            if i + 1 < nx {
                triplets.push((row, row + 1, -eps));
            }
            if j > 0 {
                triplets.push((row, row - nx, -1.0));
            }
            if j + 1 < ny {
                triplets.push((row, row + nx, -1.0));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, triplets).expect("valid 2D stencil triplets")
}

/// 5-point Poisson on an nx × ny grid, Dirichlet boundary
pub fn poisson_2d(nx: usize, ny: usize) -> CsrMatrix {
    anisotropic_2d(nx, ny, 1.0)
}

/// D·A·D for the 2D Poisson matrix with a deterministic, strongly varying D
pub fn scaled_poisson_2d(nx: usize) -> CsrMatrix {
    let a = poisson_2d(nx, nx);
    let d: Vec<f64> = (0..nx * nx)
        .map(|i| 1.0 + 9.0 * ((i * 7919) % 101) as f64 / 100.0)
        .collect();
    let mut triplets = Vec::with_capacity(a.nnz());
    for i in 0..a.num_rows {
        for (j, v) in a.row_entries(i) {
            triplets.push((i, j, d[i] * v * d[j]));
        }
    }
    CsrMatrix::from_triplets(a.num_rows, a.num_cols, triplets).expect("valid scaled triplets")
}

/// Reproducible vector with entries in [-1, 1)
pub fn random_vector(n: usize, seed: u64) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array1::from_iter((0..n).map(|_| rng.random_range(-1.0_f64..1.0)))
}
