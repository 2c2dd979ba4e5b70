//! ## fleetsim-core::anomaly
//! **Fault injection with recurrence bias**
//!
//! Once per cycle, with a small probability, one sensor of one machine is
//! overwritten with a value above its normal maximum. Machines that have
//! already faulted are weighted more heavily when picking the target. This
//! is the only path by which a sensor may leave its operating range.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use tracing::warn;

use crate::error::ConfigurationError;
use crate::registry::{AnomalyCounters, Fleet};
use crate::round2;
use crate::taxonomy::{SensorKind, Taxonomy};

/// Tunables for anomaly injection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyPolicy {
    /// Chance per cycle that an anomaly fires.
    pub probability: f64,
    /// Injected value as a multiple of the sensor's maximum.
    pub overshoot: f64,
    /// Selection weight of a machine with prior anomalies (others weigh 1).
    pub recurrence_weight: u32,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            probability: 0.01,
            overshoot: 1.5,
            recurrence_weight: 3,
        }
    }
}

impl AnomalyPolicy {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ConfigurationError::InvalidPolicy(format!(
                "probability {} outside [0, 1]",
                self.probability
            )));
        }
        if !self.overshoot.is_finite() || self.overshoot < 1.0 {
            return Err(ConfigurationError::InvalidPolicy(format!(
                "overshoot {} must be >= 1",
                self.overshoot
            )));
        }
        if self.recurrence_weight == 0 {
            return Err(ConfigurationError::InvalidPolicy(
                "recurrence weight must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// The value written over a sensor whose maximum is `max`.
    #[inline]
    pub fn injected_value(&self, max: f64) -> f64 {
        round2(max * self.overshoot)
    }
}

/// A fired injection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyEvent {
    pub machine_id: String,
    pub sensor: SensorKind,
    pub value: f64,
    /// How many anomalies this machine has had, this one included.
    pub occurrence: u64,
}

/// Rolls the per-cycle probability and, on fire, injects in place.
pub fn maybe_inject<R: Rng + ?Sized>(
    policy: &AnomalyPolicy,
    fleet: &mut Fleet,
    taxonomy: &Taxonomy,
    counters: &mut AnomalyCounters,
    rng: &mut R,
) -> Option<AnomalyEvent> {
    if !rng.random_bool(policy.probability) {
        return None;
    }
    inject(policy, fleet, taxonomy, counters, rng)
}

/// Picks a machine index, weighting machines with prior anomalies.
pub fn select_machine<R: Rng + ?Sized>(
    policy: &AnomalyPolicy,
    fleet: &Fleet,
    counters: &AnomalyCounters,
    rng: &mut R,
) -> Option<usize> {
    let weights = fleet.machines().iter().map(|m| {
        if counters.get(m.id()) > 0 {
            policy.recurrence_weight
        } else {
            1
        }
    });
    // Fails only for an empty fleet.
    let dist = WeightedIndex::new(weights).ok()?;
    Some(dist.sample(rng))
}

/// Injects unconditionally: picks a machine and one of its sensors and
/// overwrites the sensor with the overshoot value.
pub fn inject<R: Rng + ?Sized>(
    policy: &AnomalyPolicy,
    fleet: &mut Fleet,
    taxonomy: &Taxonomy,
    counters: &mut AnomalyCounters,
    rng: &mut R,
) -> Option<AnomalyEvent> {
    let index = select_machine(policy, fleet, counters, rng)?;
    let machine = &mut fleet.machines_mut()[index];
    let sensor_kind = machine.sensors().choose(rng)?.kind;
    let spec = taxonomy.sensor(sensor_kind)?;
    let value = policy.injected_value(spec.max);

    if let Some(sensor) = machine.sensor_mut(sensor_kind) {
        sensor.value = value;
    }
    let occurrence = counters.record(machine.id());

    warn!(
        machine = machine.id(),
        sensor = %sensor_kind,
        value,
        occurrence,
        "[EVENT] Abnormal value injected"
    );

    Some(AnomalyEvent {
        machine_id: machine.id().to_string(),
        sensor: sensor_kind,
        value,
        occurrence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Machine, Registry, SensorState};
    use crate::taxonomy::{MachineKind, MachineSpec, SensorKind, SensorSpec};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    fn fleet(entries: &[(&str, usize)], seed: u64) -> (Fleet, &'static Taxonomy) {
        let taxonomy = Taxonomy::standard().unwrap();
        let plan: BTreeMap<String, usize> =
            entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let fleet = Registry::new(taxonomy)
            .build(&plan, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        (fleet, taxonomy)
    }

    #[test]
    fn default_policy_matches_documented_constants() {
        let policy = AnomalyPolicy::default();
        assert_eq!(policy.probability, 0.01);
        assert_eq!(policy.overshoot, 1.5);
        assert_eq!(policy.recurrence_weight, 3);
        policy.validate().unwrap();
    }

    #[test]
    fn invalid_policies_are_rejected() {
        let mut policy = AnomalyPolicy::default();
        policy.probability = 1.5;
        assert!(policy.validate().is_err());
        let mut policy = AnomalyPolicy::default();
        policy.overshoot = 0.5;
        assert!(policy.validate().is_err());
        let mut policy = AnomalyPolicy::default();
        policy.recurrence_weight = 0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn injection_overwrites_with_overshoot() {
        let (mut fleet, taxonomy) = fleet(&[("PUMP_SYSTEM", 4)], 1);
        let mut counters = fleet.anomaly_counters();
        let policy = AnomalyPolicy::default();
        let mut rng = StdRng::seed_from_u64(10);

        let event = inject(&policy, &mut fleet, taxonomy, &mut counters, &mut rng).unwrap();
        let spec = taxonomy.sensor(event.sensor).unwrap();
        assert_eq!(event.value, round2(spec.max * 1.5));
        assert_eq!(event.occurrence, 1);
        assert_eq!(counters.get(&event.machine_id), 1);

        // The target is the only sensor outside its range.
        let mut violations = Vec::new();
        for machine in fleet.machines() {
            for sensor in machine.sensors() {
                let spec = taxonomy.sensor(sensor.kind).unwrap();
                if !spec.contains(sensor.value) {
                    violations.push((machine.id().to_string(), sensor.kind, sensor.value));
                }
            }
        }
        assert_eq!(violations, vec![(event.machine_id, event.sensor, event.value)]);
    }

    #[test]
    fn injected_values_last_a_single_cycle() {
        // Conveyors carry toggling binary sensors as well as continuous ones.
        let (mut fleet, taxonomy) = fleet(&[("CONVEYOR_SYSTEM", 2), ("HYDRAULIC_PRESS", 1)], 7);
        let mut counters = fleet.anomaly_counters();
        let policy = AnomalyPolicy::default();
        let mut rng = StdRng::seed_from_u64(70);
        let mut binary_hits = 0;

        for _ in 0..500 {
            crate::evolution::evolve_fleet(&mut fleet, taxonomy, &mut rng).unwrap();
            for machine in fleet.machines() {
                for sensor in machine.sensors() {
                    let spec = taxonomy.sensor(sensor.kind).unwrap();
                    assert!(spec.contains(sensor.value), "{} {}", sensor.kind, sensor.value);
                    if spec.binary {
                        assert!(sensor.value == 0.0 || sensor.value == 1.0);
                    }
                }
            }
            let event = inject(&policy, &mut fleet, taxonomy, &mut counters, &mut rng).unwrap();
            if taxonomy.sensor(event.sensor).unwrap().binary {
                binary_hits += 1;
            }
        }
        assert!(binary_hits > 0);
    }

    #[test]
    fn never_fires_at_zero_probability() {
        let (mut fleet, taxonomy) = fleet(&[("MIXER", 3)], 2);
        let mut counters = fleet.anomaly_counters();
        let policy = AnomalyPolicy {
            probability: 0.0,
            ..AnomalyPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..1_000 {
            assert!(maybe_inject(&policy, &mut fleet, taxonomy, &mut counters, &mut rng).is_none());
        }
        assert_eq!(counters.total(), 0);
    }

    #[test]
    fn fire_rate_is_independent_of_fleet_size() {
        let policy = AnomalyPolicy::default();
        for size in [1usize, 30] {
            let (mut fleet, taxonomy) = fleet(&[("MIXER", size)], 3);
            let mut counters = fleet.anomaly_counters();
            let mut rng = StdRng::seed_from_u64(31);
            let cycles = 100_000;
            let fired = (0..cycles)
                .filter(|_| {
                    maybe_inject(&policy, &mut fleet, taxonomy, &mut counters, &mut rng).is_some()
                })
                .count();
            let ratio = fired as f64 / cycles as f64;
            assert!((ratio - 0.01).abs() < 0.002, "size {size}: ratio {ratio}");
        }
    }

    #[test]
    fn prior_anomalies_triple_selection_odds() {
        let (fleet, _) = fleet(&[("MIXER", 2)], 4);
        let mut counters = fleet.anomaly_counters();
        counters.record("MIXER_001");
        let policy = AnomalyPolicy::default();
        let mut rng = StdRng::seed_from_u64(12);

        let draws = 80_000;
        let mut hits = [0usize; 2];
        for _ in 0..draws {
            let index = select_machine(&policy, &fleet, &counters, &mut rng).unwrap();
            hits[index] += 1;
        }
        let ratio = hits[0] as f64 / hits[1] as f64;
        assert!((ratio - 3.0).abs() < 0.15, "ratio {ratio}");
    }

    #[test]
    fn machine_without_sensors_is_a_no_op() {
        let taxonomy = Taxonomy::new(
            Vec::<SensorSpec>::new(),
            vec![MachineSpec::new(MachineKind::Mixer, Vec::<SensorKind>::new())],
        )
        .unwrap();
        let mut fleet = Fleet::from_machines(vec![Machine::new(
            "MIXER_001",
            MachineKind::Mixer,
            Vec::<SensorState>::new(),
        )]);
        let mut counters = fleet.anomaly_counters();
        let mut rng = StdRng::seed_from_u64(0);
        let event = inject(
            &AnomalyPolicy::default(),
            &mut fleet,
            &taxonomy,
            &mut counters,
            &mut rng,
        );
        assert!(event.is_none());
        assert_eq!(counters.get("MIXER_001"), 0);
    }

    #[test]
    fn empty_fleet_never_injects() {
        let taxonomy = Taxonomy::standard().unwrap();
        let mut fleet = Fleet::default();
        let mut counters = fleet.anomaly_counters();
        let policy = AnomalyPolicy {
            probability: 1.0,
            ..AnomalyPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(maybe_inject(&policy, &mut fleet, taxonomy, &mut counters, &mut rng).is_none());
    }

    #[traced_test]
    #[test]
    fn injection_is_logged() {
        let (mut fleet, taxonomy) = fleet(&[("CONVEYOR_SYSTEM", 1)], 5);
        let mut counters = fleet.anomaly_counters();
        let mut rng = StdRng::seed_from_u64(6);
        inject(
            &AnomalyPolicy::default(),
            &mut fleet,
            taxonomy,
            &mut counters,
            &mut rng,
        )
        .unwrap();
        assert!(logs_contain("Abnormal value injected"));
        assert!(logs_contain("CONVEYOR_SYSTEM_001"));
    }
}
