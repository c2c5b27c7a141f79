//! Translation throughput benchmark on a synthetic FODO lattice.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use madx2bmad::{translate_string, Options};

/// Build a synthetic MADX lattice with `cells` FODO cells in a sequence.
fn synthetic_lattice(cells: usize) -> String {
    let mut src = String::new();
    src.push_str("qf: quadrupole, l = 0.5, k1 = 0.3;\n");
    src.push_str("qd: quadrupole, l = 0.5, k1 = -0.3;\n");
    src.push_str("b1: sbend, l = 2, angle = 0.01;\n");
    src.push_str(&format!("ring: sequence, l = {}, refer = centre;\n", cells * 10));
    for i in 0..cells {
        let base = i * 10;
        src.push_str(&format!("qf, at = {};\n", base + 1));
        src.push_str(&format!("b1, at = {};\n", base + 4));
        src.push_str(&format!("qd, at = {};\n", base + 7));
    }
    src.push_str("endsequence;\nuse, ring;\n");
    src
}

fn bench_translate(c: &mut Criterion) {
    let small = synthetic_lattice(10);
    let large = synthetic_lattice(200);

    let mut group = c.benchmark_group("translate");
    group.bench_function("10_cells", |b| {
        b.iter(|| translate_string(black_box(&small), Options::default()))
    });
    group.bench_function("200_cells", |b| {
        b.iter(|| translate_string(black_box(&large), Options::default()))
    });
    group.finish();
}

criterion_group!(benches, bench_translate);
criterion_main!(benches);
