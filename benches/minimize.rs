//! Benchmarks for the BFGS driver and its line search.

use bfgs_minimize::{Bfgs, LineSearchOptions, line_search};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array1, array};

fn quartic(x: &Array1<f64>) -> f64 {
    x.iter().map(|v| v.powi(4)).sum()
}

fn quartic_gradient(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| 4.0 * v.powi(3))
}

fn rosenbrock(x: &Array1<f64>) -> f64 {
    (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2)
}

fn rosenbrock_gradient(x: &Array1<f64>) -> Array1<f64> {
    array![
        -2.0 * (1.0 - x[0]) - 400.0 * (x[1] - x[0].powi(2)) * x[0],
        200.0 * (x[1] - x[0].powi(2))
    ]
}

fn bench_quartic(c: &mut Criterion) {
    let mut group = c.benchmark_group("bfgs_quartic");

    for &dim in &[10, 50, 100] {
        let x0 = Array1::from_elem(dim, 2.0);

        group.bench_with_input(BenchmarkId::new("analytic", dim), &x0, |b, x0| {
            b.iter(|| {
                Bfgs::new(black_box(x0.clone()), quartic)
                    .with_gradient(quartic_gradient)
                    .with_gtol(1e-6)
                    .with_max_iterations(200)
                    .run()
            });
        });

        group.bench_with_input(BenchmarkId::new("central_difference", dim), &x0, |b, x0| {
            b.iter(|| {
                Bfgs::new(black_box(x0.clone()), quartic)
                    .with_gtol(1e-6)
                    .with_max_iterations(200)
                    .run()
            });
        });
    }

    group.finish();
}

fn bench_rosenbrock(c: &mut Criterion) {
    c.bench_function("bfgs_rosenbrock", |b| {
        b.iter(|| {
            Bfgs::new(black_box(array![-1.2, 1.0]), rosenbrock)
                .with_gradient(rosenbrock_gradient)
                .with_gtol(1e-8)
                .with_max_iterations(500)
                .run()
        });
    });
}

fn bench_line_search(c: &mut Criterion) {
    let options = LineSearchOptions {
        alpha_max: Some(1.0),
        ..LineSearchOptions::default()
    };
    c.bench_function("line_search_quartic_sine", |b| {
        b.iter(|| {
            line_search(
                |a: f64| (10.0 * a - 1.0).powi(4) + a.sin(),
                |a: f64| 40.0 * (10.0 * a - 1.0).powi(3) + a.cos(),
                black_box(&options),
            )
        });
    });
}

criterion_group!(benches, bench_quartic, bench_rosenbrock, bench_line_search);
criterion_main!(benches);
