//! Sensor kinds and their operating envelopes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A category of measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorKind {
    // Temperature
    RtdPt100,
    ThermocoupleKType,
    ThermocoupleJType,
    InfraredTemp,
    Thermistor,
    BimetallicTempSwitch,
    ThermalImaging,
    // Vibration / motion
    PiezoelectricAccelerometer,
    RotaryEncoder,
    Gyroscope,
    MemsAccelerometer,
    ProximityProbe,
    StrainGauge,
    IndustrialAccelerometer,
    VelocitySensor,
    // Audio
    IndustrialMicrophone,
    AcousticEmission,
    // Level
    CapacitiveLevel,
    UltrasonicLevel,
    FloatLevelSwitch,
    RadarLevel,
    HydrostaticLevel,
    // Electrical
    CurrentTransformer,
    PowerMeter,
    // Position / distance
    LinearEncoder,
    AbsoluteEncoder,
    Lvdt,
    MagnetostrictivePosition,
    LimitSwitch,
    LaserDistance,
    Photoelectric,
    // Pressure / flow
    PressureTransducer,
    ElectromagneticFlow,
    DifferentialPressure,
    StrainGaugePressure,
    PiezoelectricPressure,
    BourdonTubeGauge,
    BourdonPressureGauge,
    DiaphragmPressure,
    TurbineFlow,
    UltrasonicFlow,
    // Force / load
    LoadCell,
    PiezoelectricForce,
    BeltScaleLoadCell,
    // Speed
    Tachometer,
    HallEffect,
    IncrementalEncoder,
    // Detection
    InductiveProximity,
    LaserScanner,
    UltrasonicSensor,
    // Safety
    EmergencyStop,
    LightCurtain,
    SafetyMat,
}

impl SensorKind {
    pub const ALL: [SensorKind; 53] = [
        SensorKind::RtdPt100,
        SensorKind::ThermocoupleKType,
        SensorKind::ThermocoupleJType,
        SensorKind::InfraredTemp,
        SensorKind::Thermistor,
        SensorKind::BimetallicTempSwitch,
        SensorKind::ThermalImaging,
        SensorKind::PiezoelectricAccelerometer,
        SensorKind::RotaryEncoder,
        SensorKind::Gyroscope,
        SensorKind::MemsAccelerometer,
        SensorKind::ProximityProbe,
        SensorKind::StrainGauge,
        SensorKind::IndustrialAccelerometer,
        SensorKind::VelocitySensor,
        SensorKind::IndustrialMicrophone,
        SensorKind::AcousticEmission,
        SensorKind::CapacitiveLevel,
        SensorKind::UltrasonicLevel,
        SensorKind::FloatLevelSwitch,
        SensorKind::RadarLevel,
        SensorKind::HydrostaticLevel,
        SensorKind::CurrentTransformer,
        SensorKind::PowerMeter,
        SensorKind::LinearEncoder,
        SensorKind::AbsoluteEncoder,
        SensorKind::Lvdt,
        SensorKind::MagnetostrictivePosition,
        SensorKind::LimitSwitch,
        SensorKind::LaserDistance,
        SensorKind::Photoelectric,
        SensorKind::PressureTransducer,
        SensorKind::ElectromagneticFlow,
        SensorKind::DifferentialPressure,
        SensorKind::StrainGaugePressure,
        SensorKind::PiezoelectricPressure,
        SensorKind::BourdonTubeGauge,
        SensorKind::BourdonPressureGauge,
        SensorKind::DiaphragmPressure,
        SensorKind::TurbineFlow,
        SensorKind::UltrasonicFlow,
        SensorKind::LoadCell,
        SensorKind::PiezoelectricForce,
        SensorKind::BeltScaleLoadCell,
        SensorKind::Tachometer,
        SensorKind::HallEffect,
        SensorKind::IncrementalEncoder,
        SensorKind::InductiveProximity,
        SensorKind::LaserScanner,
        SensorKind::UltrasonicSensor,
        SensorKind::EmergencyStop,
        SensorKind::LightCurtain,
        SensorKind::SafetyMat,
    ];

    /// Wire name used as the payload key.
    pub const fn as_str(self) -> &'static str {
        match self {
            SensorKind::RtdPt100 => "RTD_PT100",
            SensorKind::ThermocoupleKType => "THERMOCOUPLE_K_TYPE",
            SensorKind::ThermocoupleJType => "THERMOCOUPLE_J_TYPE",
            SensorKind::InfraredTemp => "INFRARED_TEMP",
            SensorKind::Thermistor => "THERMISTOR",
            SensorKind::BimetallicTempSwitch => "BIMETALLIC_TEMP_SWITCH",
            SensorKind::ThermalImaging => "THERMAL_IMAGING",
            SensorKind::PiezoelectricAccelerometer => "PIEZOELECTRIC_ACCELEROMETER",
            SensorKind::RotaryEncoder => "ROTARY_ENCODER",
            SensorKind::Gyroscope => "GYROSCOPE",
            SensorKind::MemsAccelerometer => "MEMS_ACCELEROMETER",
            SensorKind::ProximityProbe => "PROXIMITY_PROBE",
            SensorKind::StrainGauge => "STRAIN_GAUGE",
            SensorKind::IndustrialAccelerometer => "INDUSTRIAL_ACCELEROMETER",
            SensorKind::VelocitySensor => "VELOCITY_SENSOR",
            SensorKind::IndustrialMicrophone => "INDUSTRIAL_MICROPHONE",
            SensorKind::AcousticEmission => "ACOUSTIC_EMISSION",
            SensorKind::CapacitiveLevel => "CAPACITIVE_LEVEL",
            SensorKind::UltrasonicLevel => "ULTRASONIC_LEVEL",
            SensorKind::FloatLevelSwitch => "FLOAT_LEVEL_SWITCH",
            SensorKind::RadarLevel => "RADAR_LEVEL",
            SensorKind::HydrostaticLevel => "HYDROSTATIC_LEVEL",
            SensorKind::CurrentTransformer => "CURRENT_TRANSFORMER",
            SensorKind::PowerMeter => "POWER_METER",
            SensorKind::LinearEncoder => "LINEAR_ENCODER",
            SensorKind::AbsoluteEncoder => "ABSOLUTE_ENCODER",
            SensorKind::Lvdt => "LVDT",
            SensorKind::MagnetostrictivePosition => "MAGNETOSTRICTIVE_POSITION",
            SensorKind::LimitSwitch => "LIMIT_SWITCH",
            SensorKind::LaserDistance => "LASER_DISTANCE",
            SensorKind::Photoelectric => "PHOTOELECTRIC",
            SensorKind::PressureTransducer => "PRESSURE_TRANSDUCER",
            SensorKind::ElectromagneticFlow => "ELECTROMAGNETIC_FLOW",
            SensorKind::DifferentialPressure => "DIFFERENTIAL_PRESSURE",
            SensorKind::StrainGaugePressure => "STRAIN_GAUGE_PRESSURE",
            SensorKind::PiezoelectricPressure => "PIEZOELECTRIC_PRESSURE",
            SensorKind::BourdonTubeGauge => "BOURDON_TUBE_GAUGE",
            SensorKind::BourdonPressureGauge => "BOURDON_PRESSURE_GAUGE",
            SensorKind::DiaphragmPressure => "DIAPHRAGM_PRESSURE",
            SensorKind::TurbineFlow => "TURBINE_FLOW",
            SensorKind::UltrasonicFlow => "ULTRASONIC_FLOW",
            SensorKind::LoadCell => "LOAD_CELL",
            SensorKind::PiezoelectricForce => "PIEZOELECTRIC_FORCE",
            SensorKind::BeltScaleLoadCell => "BELT_SCALE_LOAD_CELL",
            SensorKind::Tachometer => "TACHOMETER",
            SensorKind::HallEffect => "HALL_EFFECT",
            SensorKind::IncrementalEncoder => "INCREMENTAL_ENCODER",
            SensorKind::InductiveProximity => "INDUCTIVE_PROXIMITY",
            SensorKind::LaserScanner => "LASER_SCANNER",
            SensorKind::UltrasonicSensor => "ULTRASONIC_SENSOR",
            SensorKind::EmergencyStop => "EMERGENCY_STOP",
            SensorKind::LightCurtain => "LIGHT_CURTAIN",
            SensorKind::SafetyMat => "SAFETY_MAT",
        }
    }

    /// Safety interlocks rest in the safe state (1) and only rarely trip.
    pub const fn is_safety(self) -> bool {
        matches!(
            self,
            SensorKind::EmergencyStop | SensorKind::LightCurtain | SensorKind::SafetyMat
        )
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigurationError::UnknownSensorKind(s.to_string()))
    }
}

/// Operating envelope of one sensor kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSpec {
    pub kind: SensorKind,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
    pub binary: bool,
}

impl SensorSpec {
    pub const fn continuous(kind: SensorKind, min: f64, max: f64, unit: &'static str) -> Self {
        Self {
            kind,
            min,
            max,
            unit,
            binary: false,
        }
    }

    pub const fn binary(kind: SensorKind) -> Self {
        Self {
            kind,
            min: 0.0,
            max: 1.0,
            unit: "binary",
            binary: true,
        }
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    #[inline]
    pub fn is_safety(&self) -> bool {
        self.binary && self.kind.is_safety()
    }
}

use SensorKind::*;

/// Built-in sensor catalog.
pub(crate) const SENSOR_TABLE: &[SensorSpec] = &[
    SensorSpec::continuous(RtdPt100, 20.0, 80.0, "°C"),
    SensorSpec::continuous(ThermocoupleKType, 25.0, 90.0, "°C"),
    SensorSpec::continuous(ThermocoupleJType, 20.0, 85.0, "°C"),
    SensorSpec::continuous(InfraredTemp, 22.0, 78.0, "°C"),
    SensorSpec::continuous(Thermistor, 25.0, 75.0, "°C"),
    SensorSpec::continuous(BimetallicTempSwitch, 30.0, 70.0, "°C"),
    SensorSpec::continuous(ThermalImaging, 20.0, 95.0, "°C"),
    SensorSpec::continuous(PiezoelectricAccelerometer, 0.1, 15.0, "mm/s"),
    SensorSpec::continuous(RotaryEncoder, 50.0, 2000.0, "RPM"),
    SensorSpec::continuous(Gyroscope, 0.01, 5.0, "rad/s"),
    SensorSpec::continuous(MemsAccelerometer, 0.05, 10.0, "mm/s²"),
    SensorSpec::continuous(ProximityProbe, 0.5, 5.0, "mm"),
    SensorSpec::continuous(StrainGauge, 10.0, 500.0, "µε"),
    SensorSpec::continuous(IndustrialAccelerometer, 0.2, 20.0, "mm/s²"),
    SensorSpec::continuous(VelocitySensor, 0.5, 25.0, "mm/s"),
    SensorSpec::continuous(IndustrialMicrophone, 50.0, 95.0, "dB"),
    SensorSpec::continuous(AcousticEmission, 40.0, 90.0, "dB"),
    SensorSpec::continuous(CapacitiveLevel, 10.0, 90.0, "%"),
    SensorSpec::continuous(UltrasonicLevel, 5.0, 95.0, "%"),
    SensorSpec::binary(FloatLevelSwitch),
    SensorSpec::continuous(RadarLevel, 0.0, 100.0, "%"),
    SensorSpec::continuous(HydrostaticLevel, 5.0, 95.0, "%"),
    SensorSpec::continuous(CurrentTransformer, 5.0, 80.0, "A"),
    SensorSpec::continuous(PowerMeter, 50.0, 200.0, "kW"),
    SensorSpec::continuous(LinearEncoder, 0.0, 1000.0, "mm"),
    SensorSpec::continuous(AbsoluteEncoder, 0.0, 360.0, "degrees"),
    SensorSpec::continuous(Lvdt, 0.0, 100.0, "mm"),
    SensorSpec::continuous(MagnetostrictivePosition, 0.0, 500.0, "mm"),
    SensorSpec::binary(LimitSwitch),
    SensorSpec::continuous(LaserDistance, 10.0, 5000.0, "mm"),
    SensorSpec::binary(Photoelectric),
    SensorSpec::continuous(PressureTransducer, 0.0, 100.0, "bar"),
    SensorSpec::continuous(ElectromagneticFlow, 5.0, 200.0, "L/min"),
    SensorSpec::continuous(DifferentialPressure, 0.0, 25.0, "bar"),
    SensorSpec::continuous(StrainGaugePressure, 0.0, 150.0, "bar"),
    SensorSpec::continuous(PiezoelectricPressure, 5.0, 120.0, "bar"),
    SensorSpec::continuous(BourdonTubeGauge, 0.0, 100.0, "bar"),
    SensorSpec::continuous(BourdonPressureGauge, 0.0, 100.0, "bar"),
    SensorSpec::continuous(DiaphragmPressure, 0.0, 50.0, "bar"),
    SensorSpec::continuous(TurbineFlow, 10.0, 300.0, "L/min"),
    SensorSpec::continuous(UltrasonicFlow, 5.0, 250.0, "L/min"),
    SensorSpec::continuous(LoadCell, 0.0, 5000.0, "kg"),
    SensorSpec::continuous(PiezoelectricForce, 0.0, 10000.0, "N"),
    SensorSpec::continuous(BeltScaleLoadCell, 0.0, 2000.0, "kg"),
    SensorSpec::continuous(Tachometer, 0.0, 3000.0, "RPM"),
    SensorSpec::binary(HallEffect),
    SensorSpec::continuous(IncrementalEncoder, 0.0, 5000.0, "pulses/rev"),
    SensorSpec::binary(InductiveProximity),
    SensorSpec::continuous(LaserScanner, 50.0, 10000.0, "mm"),
    SensorSpec::continuous(UltrasonicSensor, 100.0, 5000.0, "mm"),
    SensorSpec::binary(EmergencyStop),
    SensorSpec::binary(LightCurtain),
    SensorSpec::binary(SafetyMat),
];
