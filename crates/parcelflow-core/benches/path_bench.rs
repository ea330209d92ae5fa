//! # Path Benchmarks
//!
//! Performance benchmarks for entity parsing, path building and merging.
//!
//! Run with: `cargo bench -p parcelflow-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use parcelflow_core::{EntityMapping, EntityRegistry, PathBuilder, Reference, RowKey, Table};
use std::hint::black_box;
use std::path::Path;

const SOURCE: &str = "sub-01_ses-02_acq-mprage_ce-corrected_run-1_desc-preproc_T1w.nii.gz";

/// A table with `rows` regions and one column.
fn create_table(rows: usize, column: &str) -> Table {
    let mut table = Table::new();
    for region in 0..rows {
        let key = RowKey {
            subject: "01".to_string(),
            session: "01".to_string(),
            source: "sub-01_ses-01_T1w".to_string(),
            region_group: "lh".to_string(),
            region: region.to_string(),
        };
        table.set(key, column, Some(region.to_string()));
    }
    table
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_parse(c: &mut Criterion) {
    let registry = EntityRegistry::standard().expect("registry");
    c.bench_function("entity_parse", |b| {
        b.iter(|| black_box(registry.parse(black_box(SOURCE))));
    });
}

fn bench_render(c: &mut Criterion) {
    let registry = EntityRegistry::standard().expect("registry");
    let parsed = registry.parse(SOURCE);
    let overrides = EntityMapping::new().with("desc", "brain");
    c.bench_function("entity_render", |b| {
        b.iter(|| black_box(registry.render(&parsed, &overrides)));
    });
}

fn bench_build_path(c: &mut Criterion) {
    let builder = PathBuilder::standard().expect("builder");
    let reference = Path::new("/data/sub-01/ses-02/anat").join(SOURCE);
    let overrides = EntityMapping::new()
        .with("region", "lh")
        .with("scheme", "schemeX")
        .with("measure", "thickness");

    c.bench_function("build_path", |b| {
        b.iter(|| {
            black_box(builder.build_path(
                Reference::File(&reference),
                "stats",
                "{region}_{measure}.{scheme}.csv",
                &overrides,
            ))
        });
    });
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_merge");

    for size in [100, 1000, 5000].iter() {
        let existing = create_table(*size, "area");
        let fragment = create_table(*size, "volume");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut table = existing.clone();
                table.merge(&fragment);
                black_box(table)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_render,
    bench_build_path,
    bench_merge
);
criterion_main!(benches);
