use std::hint::black_box;

use criterion::*;

mod common;
use common::*;


fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("table_column_write_wealth_100k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_MED),
            |(mut world, entities)| {
                for &entity in &entities {
                    if let Some(mut wealth) = world.get_mut::<Wealth>(entity) {
                        wealth.value *= 1.0001;
                    }
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("table_column_read_productivity_1M", |b| {
        let (world, _) = setup_world(AGENTS_LARGE);
        let productivity = world.component_id::<Productivity>().unwrap();
        b.iter(|| {
            let total: f32 = world
                .storages()
                .tables
                .iter()
                .filter_map(|table| table.column::<Productivity>(productivity))
                .flat_map(|column| column.iter())
                .map(|p| p.rate)
                .sum();
            black_box(total);
        });
    });

    group.bench_function("entity_lookup_read_position_100k", |b| {
        let (world, entities) = setup_world(AGENTS_MED);
        b.iter(|| {
            let mut total = 0.0f32;
            for &entity in &entities {
                total += world.get::<Position>(entity).map_or(0.0, |p| p.x + p.y);
            }
            black_box(total);
        });
    });

    group.bench_function("sparse_set_iterate_10k", |b| {
        let (mut world, entities) = setup_world(AGENTS_SMALL);
        for &entity in &entities {
            world.insert(entity, Trading).unwrap();
        }
        let trading = world.component_id::<Trading>().unwrap();
        b.iter(|| {
            let count = world.storages().sparse_sets.get(trading).map_or(0, |set| set.iter::<Trading>().count());
            black_box(count);
        });
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
