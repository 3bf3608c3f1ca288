use criterion::{black_box, criterion_group, criterion_main, Criterion};
use faer_core::Parallelism;
use picard_rs::{Assembler, MatrixValuesMut, PicardOptions, PicardSolver, SparsityPattern};
use std::time::Duration;

/// `-(k(u) u')' = f` on (0, 1), zero boundary values, `k(u) = 1 + u^2`.
struct NonlinearDiffusion {
    n: usize,
    source: f64,
}

impl Assembler<f64> for NonlinearDiffusion {
    fn assemble_jacobian(&mut self, x: &[f64], jacobian: &mut MatrixValuesMut<'_, f64>) {
        let h = 1.0 / (self.n as f64 + 1.0);
        let scale = 1.0 / (h * h);
        let at = |i: Option<usize>| i.map_or(0.0, |i| x[i]);
        let k = |a: f64, b: f64| {
            let u = 0.5 * (a + b);
            1.0 + u * u
        };
        jacobian.fill_zero();
        for i in 0..self.n {
            let left = i.checked_sub(1);
            let right = (i + 1 < self.n).then_some(i + 1);
            let kl = k(at(left), x[i]);
            let kr = k(x[i], at(right));
            jacobian.set(i, i, (kl + kr) * scale);
            if let Some(l) = left {
                jacobian.set(i, l, -kl * scale);
            }
            if let Some(r) = right {
                jacobian.set(i, r, -kr * scale);
            }
        }
    }

    fn assemble_residual(&mut self, _x: &[f64], residual: &mut [f64]) {
        residual.fill(self.source);
    }
}

fn options(anderson: bool) -> PicardOptions {
    PicardOptions {
        tol: 1e-8,
        max_iters: 200,
        anderson,
        ..PicardOptions::default()
    }
}

fn bench_diffusion(c: &mut Criterion, name: &str, n: usize, anderson: bool) {
    let mut solver =
        PicardSolver::with_sparse_qr(SparsityPattern::tridiagonal(n), Parallelism::None)
            .unwrap()
            .with_options(options(anderson));
    let mut problem = NonlinearDiffusion { n, source: 20.0 };
    c.bench_function(name, |b| {
        b.iter(|| {
            let result = solver.solve(&mut problem, None, None);
            black_box(result.map(|solution| solution.vector))
        })
    });
}

fn bench_diffusion_small(c: &mut Criterion) {
    bench_diffusion(c, "diffusion_8_plain", 8, false);
    bench_diffusion(c, "diffusion_8_anderson", 8, true);
}

fn bench_diffusion_large(c: &mut Criterion) {
    bench_diffusion(c, "diffusion_500_plain", 500, false);
    bench_diffusion(c, "diffusion_500_anderson", 500, true);
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2));
    targets = bench_diffusion_small, bench_diffusion_large
}
criterion_main!(benches);
