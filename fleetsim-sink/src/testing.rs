//! In-memory sinks for exercising the dispatch loop.

use std::time::Duration;

use async_trait::async_trait;
use fleetsim_core::snapshot::Envelope;
use parking_lot::Mutex;

use crate::{SinkError, TelemetrySink};

/// Records every delivery and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<(String, Envelope)>>,
    connects: Mutex<u32>,
    closes: Mutex<u32>,
    fail_sends: bool,
    fail_connect: bool,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with an I/O error.
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    /// `connect` fails; sends would still succeed.
    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// Every send sleeps before succeeding.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<(String, Envelope)> {
        self.deliveries.lock().clone()
    }

    pub fn connects(&self) -> u32 {
        *self.connects.lock()
    }

    pub fn closes(&self) -> u32 {
        *self.closes.lock()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self) -> Result<(), SinkError> {
        *self.connects.lock() += 1;
        if self.fail_connect {
            return Err(SinkError::Io(std::io::ErrorKind::ConnectionRefused.into()));
        }
        Ok(())
    }

    async fn send(&self, device_id: &str, envelope: &Envelope) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends {
            return Err(SinkError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        self.deliveries
            .lock()
            .push((device_id.to_string(), envelope.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        *self.closes.lock() += 1;
        Ok(())
    }
}
