use bevy::prelude::{Entity, Vec3};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use galaxy_sim::{
    collectors::NearestEnemyCollector, ActorType, SpatialDatabase, SpatialDatabaseElement,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const HALF_EXTENTS: f32 = 500.0;

fn random_elements(count: usize) -> Vec<SpatialDatabaseElement> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..count)
        .map(|index| SpatialDatabaseElement {
            entity: Entity::from_raw(index as u32),
            position: Vec3::new(
                rng.gen_range(-HALF_EXTENTS..HALF_EXTENTS),
                rng.gen_range(-HALF_EXTENTS..HALF_EXTENTS),
                rng.gen_range(-HALF_EXTENTS..HALF_EXTENTS),
            ),
            team: rng.gen_range(0..4),
            actor: ActorType::Fighter,
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_build");
    for count in [1_000usize, 10_000] {
        let elements = random_elements(count);
        group.bench_with_input(BenchmarkId::new("sequential", count), &elements, |b, elements| {
            let mut database = SpatialDatabase::new(HALF_EXTENTS, 4, 32);
            b.iter(|| {
                database.clear_and_resize();
                for element in elements {
                    database.add_to_data_base(*element);
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("parallel", count), &elements, |b, elements| {
            let mut database = SpatialDatabase::new(HALF_EXTENTS, 4, 32);
            b.iter(|| {
                database.clear_and_resize();
                database.build_parallel(elements, 4);
            })
        });
    }
    group.finish();
}

fn bench_nearest_enemy(c: &mut Criterion) {
    let elements = random_elements(10_000);
    let mut database = SpatialDatabase::new(HALF_EXTENTS, 4, 32);
    for _ in 0..2 {
        database.clear_and_resize();
        database.build_parallel(&elements, 4);
    }

    c.bench_function("nearest_enemy_proximity_order", |b| {
        b.iter(|| {
            let source = black_box(Vec3::new(12.0, -40.0, 88.0));
            let mut collector =
                NearestEnemyCollector::new(database.grid(), Entity::PLACEHOLDER, source, 0, 150.0);
            database.query_aabb_cell_proximity_order(source, Vec3::splat(150.0), &mut collector);
            black_box(collector.nearest().map(|element| element.entity))
        })
    });
}

criterion_group!(spatial_benches, bench_build, bench_nearest_enemy);
criterion_main!(spatial_benches);
