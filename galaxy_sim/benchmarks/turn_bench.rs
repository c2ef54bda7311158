use galaxy_sim::{build_headless_app_with, run_turn, SimulationConfig, TeamAiConfig, UnitCatalog};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn bench_turn(c: &mut Criterion) {
    let mut group = c.benchmark_group("turn");

    for neutral_planets in [8u32, 24, 64] {
        group.bench_with_input(
            BenchmarkId::new("neutral_planets", neutral_planets),
            &neutral_planets,
            |b, &neutral_planets| {
                b.iter_batched(
                    || {
                        let config = SimulationConfig {
                            neutral_planets_count: neutral_planets,
                            ..SimulationConfig::builtin()
                        };
                        let mut app = build_headless_app_with(
                            config,
                            TeamAiConfig::builtin(),
                            UnitCatalog::builtin(),
                        );
                        for _ in 0..30 {
                            run_turn(&mut app);
                        }
                        app
                    },
                    |mut app| {
                        run_turn(&mut app);
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(turn_benches, bench_turn);
criterion_main!(turn_benches);
