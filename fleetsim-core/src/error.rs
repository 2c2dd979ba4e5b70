use thiserror::Error;

use crate::taxonomy::{MachineKind, SensorKind};

/// Fatal errors detected while assembling the taxonomy or the fleet.
///
/// None of these can occur once a simulation is running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Unknown machine kind: {0}")]
    UnknownMachineKind(String),

    #[error("Unknown sensor kind: {0}")]
    UnknownSensorKind(String),

    #[error("Machine kind {machine} references sensor {sensor} which has no spec")]
    MissingSensorSpec {
        machine: MachineKind,
        sensor: SensorKind,
    },

    #[error("Machine kind {machine} lists sensor {sensor} more than once")]
    DuplicateSensor {
        machine: MachineKind,
        sensor: SensorKind,
    },

    #[error("Machine kind {0} appears more than once in the fleet plan")]
    DuplicateMachineKind(MachineKind),

    #[error("Duplicate spec for {0}")]
    DuplicateSpec(String),

    #[error("Invalid range for {sensor}: min {min} > max {max}")]
    InvalidRange { sensor: SensorKind, min: f64, max: f64 },

    #[error("Binary sensor {0} must have range (0, 1)")]
    BinaryRange(SensorKind),

    #[error("Cycle interval must be positive")]
    NonPositiveInterval,

    #[error("Invalid anomaly policy: {0}")]
    InvalidPolicy(String),
}
