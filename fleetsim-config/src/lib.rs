//! # Fleetsim Configuration System
//!
//! Layered configuration for the fleet telemetry simulator.
//!
//! ## Features
//! - **Layering**: defaults, then YAML files, then `FLEETSIM_*` environment variables
//! - **Validation**: field ranges via `validator`, cross-field rules via [`FleetsimConfig::check`]
//! - **Environment Awareness**: `FLEETSIM_ENV` selects an extra `config/<env>.yaml` overlay

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod anomaly;
mod error;
mod simulation;
mod sink;
mod telemetry;
mod validation;

pub use anomaly::AnomalyConfig;
pub use error::ConfigError;
pub use simulation::SimulationConfig;
pub use sink::{SinkConfig, SinkMode, Transport};
pub use telemetry::TelemetryConfig;
pub use validation::MAX_MACHINES_PER_KIND;

const BASE_FILE: &str = "config/fleetsim.yaml";
const ENV_PREFIX: &str = "FLEETSIM_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct FleetsimConfig {
    /// Fleet composition and cadence.
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Anomaly injection tunables.
    #[validate(nested)]
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Where telemetry is delivered.
    #[validate(nested)]
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging and metrics.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl FleetsimConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/fleetsim.yaml`, if present
    /// 3. `config/<FLEETSIM_ENV>.yaml`, if present
    /// 4. `FLEETSIM_*` environment variables (`__` separates sections)
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(FleetsimConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("FLEETSIM_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, over defaults and under
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(FleetsimConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                config.check()?;
                Ok(config)
            })
    }

    /// Rules spanning several fields, run after derive validation.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.sink.check().map_err(ConfigError::Inconsistent)?;
        self.anomaly.policy().validate()?;
        self.simulation.fleet_plan()?;
        Ok(())
    }

    /// Derive validation plus [`check`](Self::check), for configs built
    /// in code or patched by CLI flags.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.check()
    }
}
