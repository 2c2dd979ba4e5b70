//! Machine kinds and the sensors each one carries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::sensor::SensorKind::{self, *};
use crate::error::ConfigurationError;

/// A category of industrial equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineKind {
    Mixer,
    CncMachine,
    HydraulicPress,
    ConveyorSystem,
    PumpSystem,
}

impl MachineKind {
    pub const ALL: [MachineKind; 5] = [
        MachineKind::Mixer,
        MachineKind::CncMachine,
        MachineKind::HydraulicPress,
        MachineKind::ConveyorSystem,
        MachineKind::PumpSystem,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            MachineKind::Mixer => "MIXER",
            MachineKind::CncMachine => "CNC_MACHINE",
            MachineKind::HydraulicPress => "HYDRAULIC_PRESS",
            MachineKind::ConveyorSystem => "CONVEYOR_SYSTEM",
            MachineKind::PumpSystem => "PUMP_SYSTEM",
        }
    }
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigurationError::UnknownMachineKind(s.to_string()))
    }
}

/// Ordered sensor membership of one machine kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSpec {
    pub kind: MachineKind,
    pub sensors: Vec<SensorKind>,
}

impl MachineSpec {
    pub fn new(kind: MachineKind, sensors: impl Into<Vec<SensorKind>>) -> Self {
        Self {
            kind,
            sensors: sensors.into(),
        }
    }
}

pub(crate) const MACHINE_TABLE: &[(MachineKind, &[SensorKind])] = &[
    (
        MachineKind::Mixer,
        &[
            RtdPt100,
            ThermocoupleKType,
            InfraredTemp,
            PiezoelectricAccelerometer,
            RotaryEncoder,
            Gyroscope,
            IndustrialMicrophone,
            CapacitiveLevel,
            UltrasonicLevel,
            CurrentTransformer,
            PowerMeter,
        ],
    ),
    (
        MachineKind::CncMachine,
        &[
            RtdPt100,
            ThermocoupleJType,
            ThermalImaging,
            MemsAccelerometer,
            ProximityProbe,
            StrainGauge,
            LinearEncoder,
            AbsoluteEncoder,
            Lvdt,
            PressureTransducer,
            ElectromagneticFlow,
            DifferentialPressure,
            FloatLevelSwitch,
            CapacitiveLevel,
            LaserDistance,
            Photoelectric,
            AcousticEmission,
        ],
    ),
    (
        MachineKind::HydraulicPress,
        &[
            StrainGaugePressure,
            PiezoelectricPressure,
            BourdonTubeGauge,
            RtdPt100,
            Thermistor,
            BimetallicTempSwitch,
            Lvdt,
            MagnetostrictivePosition,
            LimitSwitch,
            LoadCell,
            StrainGauge,
            PiezoelectricForce,
            IndustrialAccelerometer,
            VelocitySensor,
        ],
    ),
    (
        MachineKind::ConveyorSystem,
        &[
            Tachometer,
            HallEffect,
            IncrementalEncoder,
            Photoelectric,
            InductiveProximity,
            LaserScanner,
            UltrasonicSensor,
            BeltScaleLoadCell,
            StrainGauge,
            EmergencyStop,
            LightCurtain,
            SafetyMat,
        ],
    ),
    (
        MachineKind::PumpSystem,
        &[
            ElectromagneticFlow,
            TurbineFlow,
            UltrasonicFlow,
            BourdonPressureGauge,
            DiaphragmPressure,
            DifferentialPressure,
            RadarLevel,
            HydrostaticLevel,
            FloatLevelSwitch,
            RtdPt100,
            MemsAccelerometer,
            ProximityProbe,
        ],
    ),
];
