//! Anomaly injection tunables.

use fleetsim_core::anomaly::AnomalyPolicy;
use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Chance per cycle that one sensor is overwritten.
    #[validate(range(min = 0.0, max = 1.0))]
    pub probability: f64,

    /// Injected value as a multiple of the sensor maximum.
    #[validate(range(min = 1.0, max = 100.0))]
    pub overshoot: f64,

    /// Selection weight for machines that already faulted.
    #[validate(range(min = 1, max = 1000))]
    pub recurrence_weight: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        let policy = AnomalyPolicy::default();
        Self {
            probability: policy.probability,
            overshoot: policy.overshoot,
            recurrence_weight: policy.recurrence_weight,
        }
    }
}

impl AnomalyConfig {
    pub fn policy(&self) -> AnomalyPolicy {
        AnomalyPolicy {
            probability: self.probability,
            overshoot: self.overshoot,
            recurrence_weight: self.recurrence_weight,
        }
    }
}
