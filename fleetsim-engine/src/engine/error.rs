use fleetsim_config::ConfigError;
use fleetsim_core::ConfigurationError;
use fleetsim_sink::SinkError;
use thiserror::Error;

use crate::engine::dispatch::LoopState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Sink setup failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Snapshot encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dispatch loop can only start from Idle (currently {0:?})")]
    NotIdle(LoopState),
}
