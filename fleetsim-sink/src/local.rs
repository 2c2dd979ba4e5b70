//! ## fleetsim-sink::local
//! Durability log: one JSON line per delivered snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fleetsim_core::snapshot::Envelope;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::{SinkError, TelemetrySink};

#[derive(Serialize)]
struct LogLine<'a> {
    device_id: &'a str,
    ts: u64,
    values: &'a serde_json::Map<String, serde_json::Value>,
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

/// Appends deliveries to `<data_dir>/telemetry_<YYYYmmdd_HHMMSS>.jsonl`.
///
/// File writes run on the blocking pool, never on a runtime worker.
pub struct LocalLogSink {
    path: PathBuf,
    writer: SharedWriter,
}

impl LocalLogSink {
    /// A log in `data_dir` named after the current local time.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self::with_path(data_dir.as_ref().join(format!("telemetry_{stamp}.jsonl")))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_writer<F>(&self, op: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut Option<BufWriter<File>>) -> Result<(), SinkError> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || op(&mut writer.lock()))
            .await
            .map_err(|e| SinkError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl TelemetrySink for LocalLogSink {
    fn name(&self) -> &str {
        "local-log"
    }

    async fn connect(&self) -> Result<(), SinkError> {
        let path = self.path.clone();
        self.with_writer(move |writer| {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *writer = Some(BufWriter::new(file));
            Ok(())
        })
        .await?;
        info!("Writing local telemetry log to {}", self.path.display());
        Ok(())
    }

    async fn send(&self, device_id: &str, envelope: &Envelope) -> Result<(), SinkError> {
        let line = serde_json::to_vec(&LogLine {
            device_id,
            ts: envelope.ts,
            values: &envelope.values,
        })?;
        self.with_writer(move |writer| {
            let writer = writer.as_mut().ok_or(SinkError::NotConnected)?;
            writer.write_all(&line)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.with_writer(|writer| {
            if let Some(mut writer) = writer.take() {
                writer.flush()?;
            }
            Ok(())
        })
        .await?;
        debug!("Closed local telemetry log {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn envelope(ts: u64) -> Envelope {
        let mut values = serde_json::Map::new();
        values.insert("RTD_PT100".into(), json!(42.5));
        values.insert("machine_type".into(), json!("MIXER"));
        Envelope { ts, values }
    }

    #[tokio::test]
    async fn appends_one_line_per_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalLogSink::new(dir.path().join("nested"));
        assert!(sink
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("telemetry_"));

        sink.connect().await.unwrap();
        sink.send("MIXER_001", &envelope(1)).await.unwrap();
        sink.send("MIXER_002", &envelope(2)).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["device_id"], "MIXER_001");
        assert_eq!(lines[1]["ts"], 2);
        assert_eq!(lines[1]["values"]["RTD_PT100"], 42.5);
    }

    #[tokio::test]
    async fn concurrent_sends_each_land_on_their_own_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(LocalLogSink::with_path(dir.path().join("log.jsonl")));
        sink.connect().await.unwrap();

        let sends = (1..=36).map(|i| {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                sink.send(&format!("MIXER_{i:03}"), &envelope(i)).await
            })
        });
        for handle in futures::future::join_all(sends).await {
            handle.unwrap().unwrap();
        }
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let mut ts: Vec<u64> = content
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["ts"].as_u64().unwrap())
            .collect();
        ts.sort_unstable();
        assert_eq!(ts, (1..=36).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalLogSink::with_path(dir.path().join("log.jsonl"));
        assert!(matches!(
            sink.send("MIXER_001", &envelope(1)).await,
            Err(SinkError::NotConnected)
        ));
    }
}
