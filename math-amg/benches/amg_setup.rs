//! Benchmark: hierarchy construction and AMG-preconditioned CG
//!
//! Problem: 2D Poisson, 5-point stencil with Dirichlet boundary, on n × n grids.
//!
//! Run with:
//!   cargo bench -p math-audio-amg --bench amg_setup
//!
//! Thread scaling of the rayon kernels:
//!   RAYON_NUM_THREADS=1 cargo bench -p math-audio-amg --bench amg_setup

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use math_audio_amg::{Accelerator, AmgConfig, CsrMatrix, Hierarchy, SolveConfig};
use ndarray::Array1;
use std::time::Duration;

fn poisson_2d(nx: usize) -> CsrMatrix {
    let n = nx * nx;
    let mut triplets = Vec::with_capacity(5 * n);
    for j in 0..nx {
        for i in 0..nx {
            let row = j * nx + i;
            triplets.push((row, row, 4.0));
            if i > 0 {
                triplets.push((row, row - 1, -1.0));
            }
            if i + 1 < nx {
                triplets.push((row, row + 1, -1.0));
            }
            if j > 0 {
                triplets.push((row, row - nx, -1.0));
            }
            if j + 1 < nx {
                triplets.push((row, row + nx, -1.0));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, triplets).expect("valid Poisson triplets")
}

fn configs() -> [(&'static str, AmgConfig); 3] {
    [
        ("ruge_stuben", AmgConfig::ruge_stuben()),
        ("smoothed_aggregation", AmgConfig::smoothed_aggregation()),
        ("pmis_chebyshev", AmgConfig::for_parallel()),
    ]
}

/// Benchmark hierarchy setup
fn bench_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("amg_setup");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for &nx in &[32, 64, 128] {
        let a = poisson_2d(nx);
        group.throughput(Throughput::Elements(a.num_rows as u64));

        for (name, config) in configs() {
            group.bench_with_input(BenchmarkId::new(name, nx), &a, |b, a| {
                b.iter(|| {
                    let hierarchy = Hierarchy::new(a, &config).expect("hierarchy builds");
                    black_box(hierarchy)
                });
            });
        }
    }

    group.finish();
}

/// Benchmark a preconditioned CG solve on a prebuilt hierarchy
fn bench_pcg(c: &mut Criterion) {
    let mut group = c.benchmark_group("amg_pcg");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));

    let solve_config = SolveConfig::with_accelerator(Accelerator::Cg);
    for &nx in &[32, 64, 128] {
        let a = poisson_2d(nx);
        let rhs = Array1::from_elem(a.num_rows, 1.0);
        group.throughput(Throughput::Elements(a.num_rows as u64));

        for (name, config) in configs() {
            let hierarchy = Hierarchy::new(&a, &config).expect("hierarchy builds");
            group.bench_with_input(BenchmarkId::new(name, nx), &hierarchy, |b, hierarchy| {
                b.iter(|| {
                    let result = hierarchy
                        .solve(&rhs, None, &solve_config)
                        .expect("valid system");
                    black_box(result)
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_setup, bench_pcg);
criterion_main!(benches);
