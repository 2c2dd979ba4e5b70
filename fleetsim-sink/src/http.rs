//! ## fleetsim-sink::http
//! Telemetry upload through the device REST endpoint
//! `<scheme>://host:port/api/v1/<token>/telemetry`.

use std::time::Duration;

use async_trait::async_trait;
use fleetsim_core::snapshot::Envelope;
use tracing::{debug, info};

use crate::credentials::Credentials;
use crate::{SinkError, TelemetrySink};

pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpSink {
    /// `secure` selects `https`.
    pub fn new(
        host: &str,
        port: u16,
        secure: bool,
        credentials: Credentials,
        request_timeout: Duration,
    ) -> Result<Self, SinkError> {
        let scheme = if secure { "https" } else { "http" };
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{scheme}://{host}:{port}"),
            credentials,
        })
    }

    pub fn telemetry_url(&self, token: &str) -> String {
        format!("{}/api/v1/{}/telemetry", self.base_url, token)
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn connect(&self) -> Result<(), SinkError> {
        info!("Posting telemetry to {}", self.base_url);
        Ok(())
    }

    async fn send(&self, device_id: &str, envelope: &Envelope) -> Result<(), SinkError> {
        let token = self.credentials.for_device(device_id)?;
        let response = self
            .client
            .post(self.telemetry_url(token))
            .json(envelope)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                device_id: device_id.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(device_id, "Telemetry accepted over HTTP");
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
