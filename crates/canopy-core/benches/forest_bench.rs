use canopy_core::{Forest, Scenario, ScenarioRanges, ShadeMethod, SimulationConfig, SpeciesCatalog};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::time::Duration;

fn bench_forest_years(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_year");
    let samples: usize = std::env::var("CANOPY_BENCH_SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(20);
    let years: u32 = std::env::var("CANOPY_BENCH_YEARS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(50);
    group.sample_size(samples);
    group.measurement_time(Duration::from_secs(10));

    let catalog = SpeciesCatalog::default();
    let mut scenario = Scenario::random(
        &catalog,
        &ScenarioRanges::default(),
        &mut SmallRng::seed_from_u64(0xC0FFEE),
    );
    scenario.num_trees = 200;

    for method in [ShadeMethod::Analytic, ShadeMethod::Raster] {
        group.bench_function(format!("{method:?}_years{years}"), |b| {
            b.iter_batched(
                || {
                    let config = SimulationConfig {
                        shade_method: method,
                        rng_seed: Some(0xBEEF),
                        ..SimulationConfig::default()
                    };
                    Forest::new(config, catalog.clone(), scenario.clone()).expect("forest")
                },
                |mut forest| {
                    forest.run_years(years).expect("run");
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_forest_years);
criterion_main!(benches);
