use std::hint::black_box;

use criterion::*;

mod common;
use common::*;


fn transition_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("transition");

    group.bench_function("table_insert_remove_10k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_SMALL),
            |(mut world, entities)| {
                for &entity in &entities {
                    world.remove::<Productivity>(entity).unwrap();
                }
                for &entity in &entities {
                    world.insert(entity, Productivity { rate: 2.0 }).unwrap();
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("sparse_insert_remove_10k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_SMALL),
            |(mut world, entities)| {
                for &entity in &entities {
                    world.insert(entity, Trading).unwrap();
                }
                for &entity in &entities {
                    world.remove::<Trading>(entity).unwrap();
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("take_bundle_10k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_SMALL),
            |(mut world, entities)| {
                for &entity in &entities {
                    black_box(world.take::<(Wealth, Productivity)>(entity));
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, transition_benchmark);
criterion_main!(benches);
