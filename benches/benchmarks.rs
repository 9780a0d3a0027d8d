use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use json_docstore::{Filter, FilterOptions, Patch, Store};
use serde_json::json;
use std::hint::black_box;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Store {
    Store::builder()
        .path(dir.path())
        .backups(false)
        .build()
        .unwrap()
}

fn seeded(dir: &TempDir, size: usize) -> (Store, Vec<String>) {
    let store = open(dir);
    let ids = store
        .add_many((0..size).map(|i| json!({ "n": i, "name": format!("user{i}") })))
        .unwrap();
    (store, ids)
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");
    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("into_table", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let (store, _) = seeded(&dir, size);
            b.iter(|| {
                let id = store.add(json!({ "bench": true })).unwrap();
                store.delete(id.as_str()).unwrap();
            });
        });
    }
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("by_id", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let (store, ids) = seeded(&dir, size);
            let id = &ids[size / 2];
            b.iter(|| black_box(store.get(id).unwrap()));
        });
    }
}

fn bench_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("only");
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("case_insensitive", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let (store, _) = seeded(&dir, size);
            b.iter(|| {
                black_box(
                    store
                        .only(json!({ "name": "USER7" }), FilterOptions::default())
                        .unwrap(),
                )
            });
        });
    }
}

fn bench_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit");
    for size in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("by_fields", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let (store, _) = seeded(&dir, size);
            let filter = Filter::fields(json!({ "name": "user1" })).unwrap();
            b.iter(|| {
                store
                    .edit(filter.clone(), Patch::new().set("touched", true))
                    .unwrap()
            });
        });
    }
}

fn bench_backup(c: &mut Criterion) {
    let mut group = c.benchmark_group("backup");
    group.sample_size(50);
    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("snapshot", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let (store, _) = seeded(&dir, size);
            b.iter(|| store.backup().unwrap());
        });
    }
}

criterion_group!(benches, bench_add, bench_get, bench_only, bench_edit, bench_backup);
criterion_main!(benches);
