//! ## fleetsim-telemetry::logging
//! **Subscriber setup and structured simulation events**
//!
//! `RUST_LOG` wins over the configured filter so a single run can be made
//! more verbose without editing files.

use fleetsim_config::TelemetryConfig;
use opentelemetry::KeyValue;
use tracing::{info_span, Instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. A second call is a no-op.
    pub fn init(config: &TelemetryConfig) {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let installed = if config.json_logs {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_thread_names(true)
                .try_init()
        } else {
            fmt()
                .with_env_filter(filter)
                .with_thread_names(true)
                .with_span_events(FmtSpan::NONE)
                .try_init()
        };
        if installed.is_err() {
            tracing::debug!("Global subscriber already installed");
        }
    }

    /// Records a structured simulation event inside its own span.
    #[inline]
    pub async fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "simulation_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );

        async {
            let fields: Vec<String> = metadata
                .iter()
                .map(|kv| format!("{}={}", kv.key.as_str(), kv.value.as_str()))
                .collect();
            tracing::info!(metadata = %fields.join(" "), "Simulation event recorded");
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logging() {
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(EventLogger::log_event(
                "anomaly",
                vec![
                    KeyValue::new("machine_id", "MIXER_002"),
                    KeyValue::new("value", 120.0),
                ],
            ));
        assert!(logs_contain("Simulation event recorded"));
        assert!(logs_contain("machine_id=MIXER_002"));
    }
}
