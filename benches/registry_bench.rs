#![allow(dead_code)]
//! Benchmarks for core registry operations
//!
//! Run with: cargo bench
//!
//! Measures entity insertion, lookup, view iteration and churn.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_ecs::{Registry, TagId};

#[derive(Debug, Copy, Clone, Default)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone, Default)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone, Default)]
struct Health(u32);

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.bench_function("insert_1k_single_component", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            for i in 0..1_000 {
                black_box(registry.insert((Position {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                },)));
            }
        })
    });

    group.bench_function("insert_1k_three_components", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            for i in 0..1_000 {
                black_box(registry.insert((
                    Position {
                        x: i as f32,
                        y: 0.0,
                        z: 0.0,
                    },
                    Velocity {
                        x: 1.0,
                        y: 1.0,
                        z: 0.0,
                    },
                    Health(100),
                )));
            }
        })
    });

    group.bench_function("insert_batch_1k", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            let bundles: Vec<_> = (0..1_000)
                .map(|i| {
                    (Position {
                        x: i as f32,
                        y: 0.0,
                        z: 0.0,
                    },)
                })
                .collect();
            black_box(registry.insert_batch(bundles).unwrap());
        })
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut registry = Registry::new();
    let handles: Vec<_> = (0..1_000)
        .map(|i| {
            registry.insert((
                Position {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                },
                Health(i as u32),
            ))
        })
        .collect();

    c.bench_function("get_1k", |b| {
        b.iter(|| {
            for &handle in &handles {
                black_box(registry.get::<Health>(handle).unwrap());
            }
        })
    });
}

fn bench_view_iteration(c: &mut Criterion) {
    let mut registry = Registry::new();
    for i in 0..10_000 {
        let position = Position {
            x: i as f32,
            y: 0.0,
            z: 0.0,
        };
        let velocity = Velocity {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        let handle = if i % 2 == 0 {
            registry.insert((position, velocity))
        } else {
            registry.insert((position, velocity, Health(100)))
        };
        if i % 3 == 0 {
            registry.add_tags(handle, &[TagId(1)]).unwrap();
        }
    }

    let mut group = c.benchmark_group("view");
    group.bench_function("iterate_10k_two_components", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for (_, (position, velocity)) in registry.view::<(Position, Velocity)>().iter() {
                sum += position.x + velocity.x;
            }
            black_box(sum)
        })
    });

    group.bench_function("iterate_10k_tag_filtered", |b| {
        b.iter(|| {
            black_box(
                registry
                    .view::<(Position,)>()
                    .with_tags(&[TagId(1)])
                    .iter()
                    .count(),
            )
        })
    });

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    c.bench_function("churn_insert_erase_1k", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            let handles: Vec<_> = (0..1_000)
                .map(|i| registry.insert((i as u64,)))
                .collect();
            for handle in handles {
                registry.erase(handle).unwrap();
            }
            black_box(registry.len())
        })
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_view_iteration,
    bench_churn
);
criterion_main!(benches);
