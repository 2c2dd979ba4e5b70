//! Fleet composition and cycle cadence.

use std::collections::BTreeMap;
use std::time::Duration;

use fleetsim_core::taxonomy::MachineKind;
use fleetsim_core::ConfigurationError;
use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Simulation parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Machine kind → number of instances.
    #[serde(default = "default_fleet")]
    #[validate(custom(function = validation::validate_fleet))]
    pub fleet: BTreeMap<String, usize>,

    /// Seconds between cycle starts.
    #[serde(default = "default_interval")]
    #[validate(range(min = 1, max = 86_400))]
    pub interval_secs: u64,

    /// Total run time in seconds; 0 runs until cancelled.
    #[serde(default)]
    pub duration_secs: u64,

    /// Seed for the simulation generator. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_fleet() -> BTreeMap<String, usize> {
    [
        (MachineKind::Mixer, 5),
        (MachineKind::CncMachine, 10),
        (MachineKind::HydraulicPress, 7),
        (MachineKind::ConveyorSystem, 8),
        (MachineKind::PumpSystem, 6),
    ]
    .into_iter()
    .map(|(kind, count)| (kind.to_string(), count))
    .collect()
}

fn default_interval() -> u64 {
    5
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fleet: default_fleet(),
            interval_secs: default_interval(),
            duration_secs: 0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Fleet plan keyed by canonical kind names.
    ///
    /// Keys compare case-insensitively. Environment overrides arrive
    /// lower-cased and sort after upper-case file keys, so they win.
    pub fn fleet_plan(&self) -> Result<BTreeMap<String, usize>, ConfigurationError> {
        let mut plan = BTreeMap::new();
        for (name, count) in &self.fleet {
            let kind: MachineKind = name.parse()?;
            plan.insert(kind.to_string(), *count);
        }
        Ok(plan)
    }

    pub fn set_count(&mut self, kind: MachineKind, count: usize) {
        self.fleet
            .retain(|name, _| !name.eq_ignore_ascii_case(kind.as_str()));
        self.fleet.insert(kind.to_string(), count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fleet.values().sum::<usize>(), 36);
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.duration_secs, 0);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = SimulationConfig {
            interval_secs: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn lower_case_keys_override() {
        let mut config = SimulationConfig::default();
        config.fleet.insert("mixer".into(), 1);
        let plan = config.fleet_plan().unwrap();
        assert_eq!(plan["MIXER"], 1);
        assert!(!plan.contains_key("mixer"));
    }

    #[test]
    fn set_count_replaces_any_spelling() {
        let mut config = SimulationConfig::default();
        config.fleet.insert("mixer".into(), 1);
        config.set_count(MachineKind::Mixer, 9);
        assert_eq!(config.fleet_plan().unwrap()["MIXER"], 9);
        assert_eq!(
            config.fleet.keys().filter(|k| k.eq_ignore_ascii_case("mixer")).count(),
            1
        );
    }
}
