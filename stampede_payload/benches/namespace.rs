//! Benchmarks for name universe generation.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use rand::{SeedableRng, rngs::SmallRng};
use stampede_payload::{Catalog, NameSpace, namespace::Generator};
use std::time::Duration;

fn namespace_generate(c: &mut Criterion) {
    let space = NameSpace::new(Catalog::default()).expect("default catalog is valid");
    let dir = tempfile::tempdir().expect("directory could not be created");
    let output = dir.path().join("metrics.json");

    let mut group = c.benchmark_group("namespace_generate");
    for count in &[10_000_u64, 100_000, 1_000_000] {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let mut rng = SmallRng::seed_from_u64(19690716);
                let generator =
                    Generator::new(&space, Duration::from_secs(3_600), output.clone())
                        .expect("valid interval");
                generator
                    .generate(count, &mut rng, |_| {})
                    .expect("failed to generate");
            });
        });
    }
    group.finish();
}

fn graphite_render(c: &mut Criterion) {
    let space = NameSpace::new(Catalog::default()).expect("default catalog is valid");
    let names = (0..100_000)
        .filter_map(|ordinal| space.name(ordinal * 7))
        .map(|name| name.to_string())
        .collect();
    let universe = stampede_payload::Universe::new(names).expect("non-empty universe");
    let graphite = stampede_payload::Graphite::new(universe, stampede_payload::TimeWindow::default())
        .expect("valid window");

    c.bench_function("graphite_render", |b| {
        let mut rng = SmallRng::seed_from_u64(19690716);
        let mut buffer = String::with_capacity(128);
        b.iter(|| graphite.render_next(&mut rng, &mut buffer));
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(30));
    targets = namespace_generate, graphite_render
);
criterion_main!(benches);
