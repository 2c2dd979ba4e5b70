//! ## fleetsim-core::taxonomy
//! **Static sensor and machine catalogs**
//!
//! One table maps sensor kinds to their operating range and unit, a second
//! maps machine kinds to the ordered sensor kinds they carry. A `Taxonomy`
//! is validated once when built and never mutated afterwards, so it can be
//! shared freely between threads.

mod machine;
mod sensor;

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::OnceCell;

pub use machine::{MachineKind, MachineSpec};
pub use sensor::{SensorKind, SensorSpec};

use crate::error::ConfigurationError;

static STANDARD: OnceCell<Taxonomy> = OnceCell::new();

/// Validated sensor and machine catalogs.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    sensors: HashMap<SensorKind, SensorSpec>,
    machines: BTreeMap<MachineKind, MachineSpec>,
}

impl Taxonomy {
    /// Builds a taxonomy, rejecting incomplete or inconsistent catalogs.
    pub fn new(
        sensors: impl IntoIterator<Item = SensorSpec>,
        machines: impl IntoIterator<Item = MachineSpec>,
    ) -> Result<Self, ConfigurationError> {
        let mut sensor_map = HashMap::new();
        for spec in sensors {
            if spec.min > spec.max {
                return Err(ConfigurationError::InvalidRange {
                    sensor: spec.kind,
                    min: spec.min,
                    max: spec.max,
                });
            }
            if spec.binary && (spec.min != 0.0 || spec.max != 1.0) {
                return Err(ConfigurationError::BinaryRange(spec.kind));
            }
            if sensor_map.insert(spec.kind, spec).is_some() {
                return Err(ConfigurationError::DuplicateSpec(spec.kind.to_string()));
            }
        }

        let mut machine_map = BTreeMap::new();
        for spec in machines {
            let mut seen = HashSet::with_capacity(spec.sensors.len());
            for sensor in &spec.sensors {
                if !seen.insert(*sensor) {
                    return Err(ConfigurationError::DuplicateSensor {
                        machine: spec.kind,
                        sensor: *sensor,
                    });
                }
                if !sensor_map.contains_key(sensor) {
                    return Err(ConfigurationError::MissingSensorSpec {
                        machine: spec.kind,
                        sensor: *sensor,
                    });
                }
            }
            let kind = spec.kind;
            if machine_map.insert(kind, spec).is_some() {
                return Err(ConfigurationError::DuplicateSpec(kind.to_string()));
            }
        }

        Ok(Self {
            sensors: sensor_map,
            machines: machine_map,
        })
    }

    /// The built-in catalog, validated on first use.
    pub fn standard() -> Result<&'static Taxonomy, ConfigurationError> {
        STANDARD.get_or_try_init(|| {
            Taxonomy::new(
                sensor::SENSOR_TABLE.iter().copied(),
                machine::MACHINE_TABLE
                    .iter()
                    .map(|(kind, sensors)| MachineSpec::new(*kind, *sensors)),
            )
        })
    }

    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorSpec> {
        self.sensors.get(&kind)
    }

    pub fn machine(&self, kind: MachineKind) -> Option<&MachineSpec> {
        self.machines.get(&kind)
    }

    /// Machine specs in kind order.
    pub fn machines(&self) -> impl Iterator<Item = &MachineSpec> {
        self.machines.values()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_taxonomy_is_complete() {
        let taxonomy = Taxonomy::standard().unwrap();
        assert_eq!(taxonomy.sensor_count(), SensorKind::ALL.len());
        assert_eq!(taxonomy.machines().count(), MachineKind::ALL.len());
        for machine in taxonomy.machines() {
            for sensor in &machine.sensors {
                assert!(taxonomy.sensor(*sensor).is_some());
            }
        }
    }

    #[test]
    fn binary_specs_span_zero_to_one() {
        let taxonomy = Taxonomy::standard().unwrap();
        for kind in SensorKind::ALL {
            let spec = taxonomy.sensor(kind).unwrap();
            assert!(spec.min <= spec.max);
            if spec.binary {
                assert_eq!((spec.min, spec.max), (0.0, 1.0));
                assert_eq!(spec.unit, "binary");
            }
        }
    }

    #[test]
    fn missing_sensor_spec_is_rejected() {
        let err = Taxonomy::new(
            [SensorSpec::continuous(SensorKind::RtdPt100, 20.0, 80.0, "°C")],
            [MachineSpec::new(
                MachineKind::Mixer,
                [SensorKind::RtdPt100, SensorKind::PowerMeter],
            )],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingSensorSpec {
                machine: MachineKind::Mixer,
                sensor: SensorKind::PowerMeter,
            }
        );
    }

    #[test]
    fn duplicate_sensor_in_machine_is_rejected() {
        let err = Taxonomy::new(
            [SensorSpec::continuous(SensorKind::RtdPt100, 20.0, 80.0, "°C")],
            [MachineSpec::new(
                MachineKind::Mixer,
                [SensorKind::RtdPt100, SensorKind::RtdPt100],
            )],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateSensor { .. }));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = Taxonomy::new(
            [SensorSpec::continuous(SensorKind::Tachometer, 10.0, 1.0, "RPM")],
            Vec::<MachineSpec>::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidRange { .. }));
    }

    #[test]
    fn binary_with_wide_range_is_rejected() {
        let mut spec = SensorSpec::binary(SensorKind::LimitSwitch);
        spec.max = 100.0;
        let err = Taxonomy::new([spec], Vec::<MachineSpec>::new()).unwrap_err();
        assert_eq!(err, ConfigurationError::BinaryRange(SensorKind::LimitSwitch));
    }
}
