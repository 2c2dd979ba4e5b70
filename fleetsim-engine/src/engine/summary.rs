use serde::Serialize;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The planned number of cycles ran.
    Completed,
    /// A cancellation signal arrived.
    Cancelled,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles_completed: u64,
    pub anomalies_injected: u64,
    /// Snapshots a sink accepted.
    pub deliveries: u64,
    /// Snapshots not sent because the device had no credential.
    pub skipped: u64,
    /// Sends that failed or were abandoned at the cycle timeout.
    pub sink_failures: u64,
    /// Cycles whose fan-out hit the timeout.
    pub timed_out_cycles: u64,
    pub stop_reason: StopReason,
    /// BLAKE3 over every generated envelope, in order.
    pub stream_digest: String,
}
