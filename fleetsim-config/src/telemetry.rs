//! Logging and metrics configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// `tracing` filter directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    #[validate(custom(function = validation::validate_filter))]
    pub log_filter: String,

    /// Emit JSON log lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,

    /// Record Prometheus counters for the run.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_filter() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_filter(),
            json_logs: false,
            metrics_enabled: default_true(),
        }
    }
}
