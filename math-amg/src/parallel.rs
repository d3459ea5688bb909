//! Parallel utilities with feature-gated implementations
//!
//! Row-wise kernels (SpMV, strength evaluation, Jacobi-type relaxation) are
//! independent per row. With the `rayon` feature they are distributed over the
//! global thread pool; without it the same closures run sequentially and
//! produce bit-identical results.

/// Minimum number of rows before a kernel is worth splitting across threads.
pub const PARALLEL_ROW_THRESHOLD: usize = 256;

/// Check if parallel processing is available
#[cfg(feature = "rayon")]
pub fn is_parallel_available() -> bool {
    true
}

/// Check if parallel processing is available
#[cfg(not(feature = "rayon"))]
pub fn is_parallel_available() -> bool {
    false
}

/// Parallel map with index
#[cfg(feature = "rayon")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    if count < PARALLEL_ROW_THRESHOLD {
        return (0..count).map(f).collect();
    }
    (0..count).into_par_iter().map(f).collect()
}

/// Sequential map with index (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}

/// Parallel map over a slice of indices (used for one color of a colored sweep)
#[cfg(feature = "rayon")]
pub fn parallel_map_over<U, F>(indices: &[usize], f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    if indices.len() < PARALLEL_ROW_THRESHOLD {
        return indices.iter().map(|&i| f(i)).collect();
    }
    indices.par_iter().map(|&i| f(i)).collect()
}

/// Sequential map over a slice of indices (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_map_over<U, F>(indices: &[usize], f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    indices.iter().map(|&i| f(i)).collect()
}

/// Element-wise update `out[i] = f(i)` over a mutable slice
#[cfg(feature = "rayon")]
pub fn parallel_fill<F>(out: &mut [f64], f: F)
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    use rayon::prelude::*;
    if out.len() < PARALLEL_ROW_THRESHOLD {
        out.iter_mut().enumerate().for_each(|(i, v)| *v = f(i));
        return;
    }
    out.par_iter_mut().enumerate().for_each(|(i, v)| *v = f(i));
}

/// Element-wise update (fallback)
#[cfg(not(feature = "rayon"))]
pub fn parallel_fill<F>(out: &mut [f64], f: F)
where
    F: Fn(usize) -> f64,
{
    out.iter_mut().enumerate().for_each(|(i, v)| *v = f(i));
}
