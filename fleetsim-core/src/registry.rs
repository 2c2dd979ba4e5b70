//! ## fleetsim-core::registry
//! **Fleet construction and per-machine state**
//!
//! `Registry::build` turns a machine-kind → count plan into concrete
//! machines with sequential identifiers (`MIXER_001`, `MIXER_002`, ...)
//! and one seeded `SensorState` per sensor kind of the machine.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ConfigurationError;
use crate::round2;
use crate::taxonomy::{MachineKind, SensorKind, SensorSpec, Taxonomy};

/// Current value of one sensor, owned by its machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorState {
    pub kind: SensorKind,
    pub value: f64,
}

impl SensorState {
    pub fn new(kind: SensorKind, value: f64) -> Self {
        Self { kind, value }
    }

    /// Seeds a value for a freshly built machine.
    pub fn seed<R: Rng + ?Sized>(spec: &SensorSpec, rng: &mut R) -> Self {
        let value = if spec.binary {
            if spec.is_safety() || rng.random_bool(0.5) {
                1.0
            } else {
                0.0
            }
        } else {
            round2(spec.min + rng.random::<f64>() * spec.span())
        };
        Self::new(spec.kind, value)
    }
}

/// One simulated machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    id: String,
    kind: MachineKind,
    sensors: Vec<SensorState>,
}

impl Machine {
    pub fn new(id: impl Into<String>, kind: MachineKind, sensors: Vec<SensorState>) -> Self {
        Self {
            id: id.into(),
            kind,
            sensors,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MachineKind {
        self.kind
    }

    /// Sensors in the order the machine spec lists them.
    pub fn sensors(&self) -> &[SensorState] {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut [SensorState] {
        &mut self.sensors
    }

    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorState> {
        self.sensors.iter().find(|s| s.kind == kind)
    }

    pub fn sensor_mut(&mut self, kind: SensorKind) -> Option<&mut SensorState> {
        self.sensors.iter_mut().find(|s| s.kind == kind)
    }
}

/// Every machine of a simulation run, in build order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fleet {
    machines: Vec<Machine>,
}

impl Fleet {
    pub fn from_machines(machines: Vec<Machine>) -> Self {
        Self { machines }
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn machines_mut(&mut self) -> &mut [Machine] {
        &mut self.machines
    }

    pub fn get(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Machine> {
        self.machines.iter_mut().find(|m| m.id == id)
    }

    pub fn sensor_count(&self) -> usize {
        self.machines.iter().map(|m| m.sensors.len()).sum()
    }

    /// A counter table with every machine at zero.
    pub fn anomaly_counters(&self) -> AnomalyCounters {
        AnomalyCounters {
            counts: self.machines.iter().map(|m| (m.id.clone(), 0)).collect(),
        }
    }
}

/// Per-machine count of anomalies injected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalyCounters {
    counts: HashMap<String, u64>,
}

impl AnomalyCounters {
    pub fn get(&self, machine_id: &str) -> u64 {
        self.counts.get(machine_id).copied().unwrap_or(0)
    }

    /// Increments and returns the new count.
    pub fn record(&mut self, machine_id: &str) -> u64 {
        let count = self.counts.entry(machine_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Builds fleets against a taxonomy.
#[derive(Debug, Clone, Copy)]
pub struct Registry<'t> {
    taxonomy: &'t Taxonomy,
}

impl<'t> Registry<'t> {
    pub fn new(taxonomy: &'t Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &'t Taxonomy {
        self.taxonomy
    }

    /// Creates `count` machines for every kind in the plan.
    ///
    /// Kinds are visited in key order so a seeded generator always produces
    /// the same initial state.
    pub fn build<R: Rng + ?Sized>(
        &self,
        plan: &BTreeMap<String, usize>,
        rng: &mut R,
    ) -> Result<Fleet, ConfigurationError> {
        // Resolve every kind before creating anything. Names parse
        // case-insensitively, so two keys may land on one kind.
        let mut resolved = Vec::with_capacity(plan.len());
        let mut seen = HashSet::with_capacity(plan.len());
        for (name, count) in plan {
            let kind: MachineKind = name.parse()?;
            if !seen.insert(kind) {
                return Err(ConfigurationError::DuplicateMachineKind(kind));
            }
            let spec = self
                .taxonomy
                .machine(kind)
                .ok_or_else(|| ConfigurationError::UnknownMachineKind(name.clone()))?;
            resolved.push((spec, *count));
        }

        let mut machines = Vec::with_capacity(plan.values().sum());
        for (spec, count) in resolved {
            for index in 1..=count {
                let id = format!("{}_{index:03}", spec.kind);
                let mut sensors = Vec::with_capacity(spec.sensors.len());
                for kind in &spec.sensors {
                    let sensor_spec = self.taxonomy.sensor(*kind).ok_or(
                        ConfigurationError::MissingSensorSpec {
                            machine: spec.kind,
                            sensor: *kind,
                        },
                    )?;
                    sensors.push(SensorState::seed(sensor_spec, rng));
                }
                debug!(machine = %id, sensors = sensors.len(), "Registered machine");
                machines.push(Machine::new(id, spec.kind, sensors));
            }
        }

        let fleet = Fleet::from_machines(machines);
        info!(
            "Initialized {} machines with {} sensors",
            fleet.len(),
            fleet.sensor_count()
        );
        Ok(fleet)
    }
}
