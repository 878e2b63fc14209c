use beamcut::prelude::*;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;

/// Selection over one synthetic round at several beam widths.
fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    for width in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| {
                let mut engine = SyntheticEngine::new(SyntheticCfg {
                    seed: 42,
                    candidates_per_poly: 256,
                    ..SyntheticCfg::default()
                });
                engine.reset(Path::new("bench.off")).unwrap();
                let beam = Beam::seeded(engine.root_poly());
                let rows = engine.render(engine.root_poly()).unwrap();
                let cfg = SelectCfg::default();
                let table = CandidateTable::build(vec![(rows, 0.0, 0.0)], &cfg);
                select(&table, &beam, width, 0.0, false, &cfg, &mut engine)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
