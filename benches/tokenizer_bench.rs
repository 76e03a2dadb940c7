use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use xyz2las::processing::tokenizer::scan_lines;

fn synthetic_listing(lines: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut text = String::with_capacity(lines * 32);
    for i in 0..lines {
        if i % 1000 == 0 {
            text.push_str("# block\n");
        }
        let x: f64 = rng.gen_range(500_000.0..600_000.0);
        let y: f64 = rng.gen_range(6_000_000.0..6_100_000.0);
        let z: f64 = rng.gen_range(-20.0..400.0);
        text.push_str(&format!("{x:.3} {y:.3}\t{z:.3}\n"));
    }
    text.into_bytes()
}

fn bench_scan_100k_lines(c: &mut Criterion) {
    let buffer = synthetic_listing(100_000);

    c.bench_function("scan_lines_100k", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            let stats = scan_lines(black_box(&buffer), |p| {
                sum += p.z;
                Ok(())
            });
            black_box((stats.unwrap(), sum));
        })
    });
}

fn bench_scan_1m_lines(c: &mut Criterion) {
    let buffer = synthetic_listing(1_000_000);

    let mut group = c.benchmark_group("scan_lines_large");
    group.sample_size(10);
    group.bench_function("scan_lines_1m", |b| {
        b.iter(|| black_box(scan_lines(black_box(&buffer), |_| Ok(())).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_scan_100k_lines, bench_scan_1m_lines);
criterion_main!(benches);
