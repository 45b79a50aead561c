use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stockham_ntt::{build_context, Goldilocks, NttContext};

const MAX_LOG: u32 = 16;

fn sample_coeffs(size: usize) -> Vec<Goldilocks> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..size)
        .map(|_| Goldilocks::from_u64(rng.random::<u64>()))
        .collect()
}

fn context() -> NttContext {
    build_context(1 << MAX_LOG).expect("context")
}

fn bench_evaluate(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("evaluate_poly");
    for log_n in [10u32, 13, 16] {
        let n = 1usize << log_n;
        let coeffs = sample_coeffs(n);
        let mut out = ctx.allocate_vector(n).expect("pinned output");
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &coeffs, |b, coeffs| {
            b.iter(|| {
                ctx.evaluate_poly_into(black_box(coeffs), n, &mut out)
                    .expect("evaluate");
            })
        });
    }
    group.finish();
}

fn bench_interpolate(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("interpolate_poly");
    for log_n in [10u32, 13, 16] {
        let n = 1usize << log_n;
        let values = sample_coeffs(n);
        let mut out = ctx.allocate_vector(n).expect("pinned output");
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                ctx.interpolate_poly_into(black_box(values), n, &mut out)
                    .expect("interpolate");
            })
        });
    }
    group.finish();
}

fn bench_lde(c: &mut Criterion) {
    let ctx = context();
    let shift = Goldilocks::from_u64(7);
    let mut group = c.benchmark_group("evaluate_poly_with_offset");
    for blowup in [2usize, 4, 8] {
        let n = (1usize << MAX_LOG) / blowup;
        let coeffs = sample_coeffs(n);
        let mut out = ctx.allocate_vector(n * blowup).expect("pinned output");
        group.throughput(Throughput::Elements((n * blowup) as u64));
        group.bench_with_input(BenchmarkId::new("blowup", blowup), &coeffs, |b, coeffs| {
            b.iter(|| {
                ctx.evaluate_poly_with_offset_into(black_box(coeffs), n, shift, blowup, &mut out)
                    .expect("lde");
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_interpolate, bench_lde);
criterion_main!(benches);
