//! ## fleetsim-core::evolution
//! **One simulated step per sensor**
//!
//! Continuous sensors follow a bounded random walk: each step moves the
//! value by at most ±2.5% of the sensor's span and clamps to the range, so
//! evolution alone can never leave `[min, max]`. Binary sensors either trip
//! rarely (safety interlocks) or toggle occasionally (everything else).

use rand::Rng;

use crate::error::ConfigurationError;
use crate::registry::{Fleet, SensorState};
use crate::round2;
use crate::taxonomy::{SensorSpec, Taxonomy};

/// Fraction of the span a single step may move (before the ±0.5 factor).
pub const DRIFT_FRACTION: f64 = 0.05;
/// Chance per step that a safety interlock reads unsafe.
pub const SAFETY_TRIP_PROBABILITY: f64 = 0.01;
/// Chance per step that a non-safety binary sensor flips.
pub const TOGGLE_PROBABILITY: f64 = 0.05;

/// Advances one sensor by one step. The spec is only read.
pub fn step<R: Rng + ?Sized>(spec: &SensorSpec, sensor: &SensorState, rng: &mut R) -> SensorState {
    let value = if spec.binary {
        // An injected overshoot reads as the "on" state.
        let current = if sensor.value >= 0.5 { 1.0 } else { 0.0 };
        if spec.is_safety() {
            if rng.random_bool(SAFETY_TRIP_PROBABILITY) {
                0.0
            } else {
                1.0
            }
        } else if rng.random_bool(TOGGLE_PROBABILITY) {
            1.0 - current
        } else {
            current
        }
    } else {
        let variation = (rng.random::<f64>() - 0.5) * DRIFT_FRACTION * spec.span();
        round2((sensor.value + variation).clamp(spec.min, spec.max))
    };
    SensorState::new(sensor.kind, value)
}

/// Applies [`step`] to every sensor of every machine, in fleet order.
pub fn evolve_fleet<R: Rng + ?Sized>(
    fleet: &mut Fleet,
    taxonomy: &Taxonomy,
    rng: &mut R,
) -> Result<(), ConfigurationError> {
    for machine in fleet.machines_mut() {
        let machine_kind = machine.kind();
        for sensor in machine.sensors_mut() {
            let spec = taxonomy
                .sensor(sensor.kind)
                .ok_or(ConfigurationError::MissingSensorSpec {
                    machine: machine_kind,
                    sensor: sensor.kind,
                })?;
            *sensor = step(spec, sensor, rng);
        }
    }
    Ok(())
}
