use fleetsim_protocols::MqttParseError;
use thiserror::Error;

/// A delivery problem. Always recoverable from the loop's point of view.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MQTT protocol error: {0}")]
    Protocol(#[from] MqttParseError),

    #[error("Broker refused the session: {0}")]
    Refused(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for device {device_id}")]
    Status { device_id: String, status: u16 },

    #[error("No credential for device {0}")]
    MissingCredential(String),

    #[error("Sink is not connected")]
    NotConnected,

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl SinkError {
    /// Deliveries skipped for lack of a credential are not failures.
    pub fn is_skip(&self) -> bool {
        matches!(self, SinkError::MissingCredential(_))
    }
}
