//! Telemetry destination configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// How devices authenticate against the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkMode {
    /// No remote delivery; telemetry only goes to the local log.
    #[default]
    LocalOnly,
    /// One access token for the whole fleet.
    SingleToken,
    /// One access token per device, read from `tokens_file`.
    MultiToken,
}

/// Wire protocol for remote delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[default]
    Mqtt,
    Http,
    /// HTTP over TLS.
    Https,
}

impl Transport {
    pub fn scheme(self) -> &'static str {
        match self {
            Transport::Mqtt => "mqtt",
            Transport::Http => "http",
            Transport::Https => "https",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct SinkConfig {
    #[serde(default)]
    pub mode: SinkMode,

    #[serde(default)]
    pub transport: Transport,

    #[serde(default = "default_host")]
    #[validate(custom(function = validation::validate_host))]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Fleet-wide token for `single-token` mode.
    #[serde(default)]
    pub token: Option<String>,

    /// JSON object file `{device_id: token}` for `multi-token` mode.
    #[serde(default)]
    pub tokens_file: Option<PathBuf>,

    /// Directory for the local JSONL telemetry log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Also write the local log when delivering remotely.
    #[serde(default)]
    pub save_local: bool,

    /// Budget for one cycle's fan-out to every sink.
    #[serde(default = "default_sink_timeout")]
    #[validate(range(min = 1, max = 600_000))]
    pub sink_timeout_ms: u64,

    /// Budget for establishing one remote session.
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1, max = 600_000))]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    1883
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("simulation_data")
}

fn default_sink_timeout() -> u64 {
    2000
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::default(),
            transport: Transport::default(),
            host: default_host(),
            port: default_port(),
            token: None,
            tokens_file: None,
            data_dir: default_data_dir(),
            save_local: false,
            sink_timeout_ms: default_sink_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl SinkConfig {
    /// Cross-field rules the derive cannot express.
    pub fn check(&self) -> Result<(), String> {
        match self.mode {
            SinkMode::SingleToken if self.token.as_deref().map_or(true, str::is_empty) => {
                Err("single-token mode requires `sink.token`".into())
            }
            SinkMode::MultiToken if self.tokens_file.is_none() => {
                Err("multi-token mode requires `sink.tokens_file`".into())
            }
            _ => Ok(()),
        }
    }

    /// Whether a local JSONL log is written for this run.
    pub fn writes_local_log(&self) -> bool {
        self.mode == SinkMode::LocalOnly || self.save_local
    }
}
