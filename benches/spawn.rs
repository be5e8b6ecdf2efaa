use std::hint::black_box;

use criterion::*;

mod common;
use common::*;


fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_100k_one_by_one", |b| {
        b.iter(|| {
            let mut world = make_world(AGENTS_MED);
            for i in 0..AGENTS_MED {
                world.spawn((Position { x: i as f32, y: 0.0 }, Wealth { value: 100.0 }));
            }
            black_box(world);
        });
    });

    group.bench_function("spawn_batch_100k", |b| {
        b.iter(|| {
            let (world, entities) = setup_world(AGENTS_MED);
            black_box((world, entities));
        });
    });

    group.bench_function("despawn_100k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_MED),
            |(mut world, entities)| {
                for entity in entities {
                    world.despawn(entity);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("reserve_and_flush_100k", |b| {
        b.iter(|| {
            let mut world = make_world(AGENTS_MED);
            let reserved: Vec<_> = world.reserve_entities(AGENTS_MED as u32).collect();
            world.flush();
            black_box((world, reserved));
        });
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
