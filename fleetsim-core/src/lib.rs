//! # fleetsim-core
//!
//! Simulation engine for synthetic industrial-machine telemetry.
//!
//! ### Key Submodules:
//! - `taxonomy`: Immutable sensor and machine catalogs
//! - `registry`: Builds the fleet and seeds initial sensor state
//! - `evolution`: Bounded random walk and binary toggling, one step per cycle
//! - `anomaly`: Low-probability out-of-range injections with recurrence bias
//! - `snapshot`: Per-cycle projection of a machine into a sink payload
//! - `time`: Wall-clock and virtual clocks for snapshot timestamps
//!
//! Every random decision takes an explicit generator so that a run seeded
//! with the same value produces the same telemetry stream.

pub mod anomaly;
pub mod error;
pub mod evolution;
pub mod registry;
pub mod snapshot;
pub mod taxonomy;
pub mod time;

pub mod prelude {
    pub use crate::anomaly::{AnomalyEvent, AnomalyPolicy};
    pub use crate::error::ConfigurationError;
    pub use crate::registry::{AnomalyCounters, Fleet, Machine, Registry, SensorState};
    pub use crate::snapshot::{CycleSnapshot, Envelope};
    pub use crate::taxonomy::{MachineKind, MachineSpec, SensorKind, SensorSpec, Taxonomy};
    pub use crate::time::{Clock, SystemClock, VirtualClock};
}

pub use error::ConfigurationError;

/// Rounds to two decimal places, the precision every reported value carries.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
