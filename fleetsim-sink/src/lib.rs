//! # Fleetsim Telemetry Sinks
//!
//! Destinations for cycle snapshots. The dispatch loop only sees the
//! [`TelemetrySink`] trait; this crate provides a local JSONL log, an MQTT
//! publisher and an HTTP(S) uploader, and builds the set a configuration
//! asks for.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetsim_config::{SinkConfig, SinkMode, Transport};
use fleetsim_core::snapshot::Envelope;
use tracing::{error, info, warn};

pub mod credentials;
mod error;
pub mod http;
pub mod local;
pub mod mqtt;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use credentials::Credentials;
pub use error::SinkError;
pub use http::HttpSink;
pub use local::LocalLogSink;
pub use mqtt::MqttSink;

/// Transport for one machine's snapshot.
///
/// Methods take `&self` so one sink can serve every machine of a cycle
/// concurrently; implementations guard their own connection state.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Establishes connectivity. Called once before the first cycle.
    async fn connect(&self) -> Result<(), SinkError>;

    /// Delivers one envelope on behalf of `device_id`.
    async fn send(&self, device_id: &str, envelope: &Envelope) -> Result<(), SinkError>;

    /// Releases connections. Called once after the last cycle.
    async fn close(&self) -> Result<(), SinkError>;
}

/// Builds the sinks a configuration asks for.
///
/// A tokens file that cannot be read is logged and the run continues
/// without the remote sink.
pub fn build_sinks(config: &SinkConfig) -> Result<Vec<Arc<dyn TelemetrySink>>, SinkError> {
    let mut sinks: Vec<Arc<dyn TelemetrySink>> = Vec::new();

    if config.writes_local_log() {
        sinks.push(Arc::new(LocalLogSink::new(&config.data_dir)));
    }

    let credentials = match (config.mode, &config.token, &config.tokens_file) {
        (SinkMode::LocalOnly, _, _) => None,
        (SinkMode::SingleToken, Some(token), _) => Some(Credentials::Single(token.clone())),
        (SinkMode::MultiToken, _, Some(path)) => match Credentials::load_file(path) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                error!("Failed to load device tokens: {}", e);
                None
            }
        },
        (mode, _, _) => {
            return Err(SinkError::Credentials(format!(
                "{mode:?} mode is missing its token setting"
            )))
        }
    };

    if let Some(credentials) = credentials {
        let io_timeout = Duration::from_millis(config.connect_timeout_ms);
        let remote: Arc<dyn TelemetrySink> = match config.transport {
            Transport::Mqtt => Arc::new(MqttSink::new(
                config.host.clone(),
                config.port,
                credentials,
                io_timeout,
            )),
            Transport::Http | Transport::Https => Arc::new(HttpSink::new(
                &config.host,
                config.port,
                config.transport == Transport::Https,
                credentials,
                io_timeout,
            )?),
        };
        info!(
            "Remote telemetry via {} to {}:{}",
            config.transport.scheme(),
            config.host,
            config.port
        );
        sinks.push(remote);
    }

    if sinks.is_empty() {
        warn!("No telemetry sinks configured; snapshots will be generated but not delivered");
    }
    Ok(sinks)
}
