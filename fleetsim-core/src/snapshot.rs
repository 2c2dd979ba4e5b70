//! ## fleetsim-core::snapshot
//! **Per-cycle projection of a machine into a sink payload**
//!
//! A `CycleSnapshot` copies one machine's sensor values together with its
//! kind and a timestamp. It owns its data, so sinks can hold it across
//! await points while the next cycle mutates the fleet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::ConfigurationError;
use crate::registry::Machine;
use crate::taxonomy::{MachineKind, SensorKind, Taxonomy};

/// One sensor value as captured at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub kind: SensorKind,
    pub value: f64,
    pub unit: &'static str,
    pub binary: bool,
}

/// Read-only copy of a machine for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSnapshot {
    pub machine_id: String,
    pub machine_kind: MachineKind,
    pub timestamp_ms: u64,
    pub readings: Vec<Reading>,
}

impl CycleSnapshot {
    pub fn capture(
        machine: &Machine,
        taxonomy: &Taxonomy,
        timestamp_ms: u64,
    ) -> Result<Self, ConfigurationError> {
        let readings = machine
            .sensors()
            .iter()
            .map(|sensor| {
                let spec = taxonomy.sensor(sensor.kind).ok_or(
                    ConfigurationError::MissingSensorSpec {
                        machine: machine.kind(),
                        sensor: sensor.kind,
                    },
                )?;
                Ok(Reading {
                    kind: sensor.kind,
                    value: sensor.value,
                    unit: spec.unit,
                    binary: spec.binary,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(Self {
            machine_id: machine.id().to_string(),
            machine_kind: machine.kind(),
            timestamp_ms,
            readings,
        })
    }

    /// Builds the `{ts, values}` wire payload.
    pub fn envelope(&self) -> Envelope {
        let mut values = Map::with_capacity(self.readings.len() * 2 + 2);
        for reading in &self.readings {
            let name = reading.kind.as_str();
            values.insert(name.to_string(), reading_value(reading));
            values.insert(format!("{name}_unit"), Value::from(reading.unit));
        }
        values.insert(
            "machine_type".into(),
            Value::from(self.machine_kind.as_str()),
        );
        values.insert("timestamp".into(), Value::from(self.timestamp_ms));
        Envelope {
            ts: self.timestamp_ms,
            values,
        }
    }
}

fn reading_value(reading: &Reading) -> Value {
    if reading.binary {
        // Injected binary values may sit outside {0, 1}; keep them as numbers.
        if reading.value == 0.0 || reading.value == 1.0 {
            return Value::from(reading.value as u8);
        }
    }
    Number::from_f64(reading.value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// The payload handed to every sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ts: u64,
    pub values: Map<String, Value>,
}

impl Envelope {
    /// Stable JSON encoding, used both on the wire and for stream digests.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn machine_type(&self) -> Option<&str> {
        self.values.get("machine_type").and_then(Value::as_str)
    }
}
