#[macro_use]
extern crate criterion;

use std::collections::BTreeMap;

use criterion::{black_box, Criterion};
use fleetsim_core::anomaly::{maybe_inject, AnomalyPolicy};
use fleetsim_core::evolution::evolve_fleet;
use fleetsim_core::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// One full cycle (evolve, inject, snapshot) over the default fleet mix.
fn benchmark_cycle(c: &mut Criterion) {
    let taxonomy = Taxonomy::standard().expect("built-in taxonomy");
    let plan: BTreeMap<String, usize> = [
        ("MIXER", 5),
        ("CNC_MACHINE", 10),
        ("HYDRAULIC_PRESS", 7),
        ("CONVEYOR_SYSTEM", 8),
        ("PUMP_SYSTEM", 6),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let mut rng = StdRng::seed_from_u64(42);
    let mut fleet = Registry::new(taxonomy)
        .build(&plan, &mut rng)
        .expect("fleet");
    let mut counters = fleet.anomaly_counters();
    let policy = AnomalyPolicy::default();

    c.bench_function("fleet_cycle", |b| {
        b.iter(|| {
            evolve_fleet(&mut fleet, taxonomy, &mut rng).expect("evolve");
            black_box(maybe_inject(
                &policy,
                &mut fleet,
                taxonomy,
                &mut counters,
                &mut rng,
            ));
            for machine in fleet.machines() {
                let snapshot = CycleSnapshot::capture(machine, taxonomy, 0).expect("snapshot");
                black_box(snapshot.envelope());
            }
        })
    });
}

/// Evolution alone on a large fleet.
fn benchmark_evolution(c: &mut Criterion) {
    let taxonomy = Taxonomy::standard().expect("built-in taxonomy");
    let plan: BTreeMap<String, usize> = [("CNC_MACHINE".to_string(), 1_000)].into_iter().collect();
    let mut rng = StdRng::seed_from_u64(7);
    let mut fleet = Registry::new(taxonomy)
        .build(&plan, &mut rng)
        .expect("fleet");

    c.bench_function("evolve_1000_cnc", |b| {
        b.iter(|| evolve_fleet(black_box(&mut fleet), taxonomy, &mut rng))
    });
}

criterion_group!(benches, benchmark_cycle, benchmark_evolution);
criterion_main!(benches);
