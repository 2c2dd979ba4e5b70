//! Dispatch loop: drives the fleet through evolve → inject → snapshot →
//! deliver → sleep cycles at a fixed cadence.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleetsim_config::FleetsimConfig;
use fleetsim_core::anomaly::{maybe_inject, AnomalyEvent, AnomalyPolicy};
use fleetsim_core::evolution::evolve_fleet;
use fleetsim_core::prelude::*;
use fleetsim_sink::TelemetrySink;
use fleetsim_telemetry::{EventLogger, MetricsRecorder};
use futures::future::join_all;
use opentelemetry::KeyValue;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::engine::cancel::CancelSignal;
use crate::engine::error::EngineError;
use crate::engine::summary::{RunSummary, StopReason};

const PROGRESS_EVERY: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// Cadence and policy for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub interval: Duration,
    /// `None` runs until cancelled.
    pub planned_cycles: Option<u64>,
    pub sink_timeout: Duration,
    pub policy: AnomalyPolicy,
}

impl LoopSettings {
    /// `duration` of zero means unbounded.
    pub fn new(
        interval: Duration,
        duration: Duration,
        sink_timeout: Duration,
        policy: AnomalyPolicy,
    ) -> Result<Self, ConfigurationError> {
        if interval.is_zero() {
            return Err(ConfigurationError::NonPositiveInterval);
        }
        policy.validate()?;
        let planned_cycles =
            (!duration.is_zero()).then(|| (duration.as_nanos() / interval.as_nanos()) as u64);
        Ok(Self {
            interval,
            planned_cycles,
            sink_timeout,
            policy,
        })
    }

    pub fn from_config(config: &FleetsimConfig) -> Result<Self, ConfigurationError> {
        Self::new(
            config.simulation.interval(),
            Duration::from_secs(config.simulation.duration_secs),
            Duration::from_millis(config.sink.sink_timeout_ms),
            config.anomaly.policy(),
        )
    }
}

#[derive(Debug, Default)]
struct Tally {
    delivered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Owns the fleet for the duration of a run.
pub struct DispatchLoop {
    state: LoopState,
    settings: LoopSettings,
    taxonomy: Arc<Taxonomy>,
    fleet: Fleet,
    counters: AnomalyCounters,
    rng: StdRng,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl DispatchLoop {
    pub fn new(taxonomy: Arc<Taxonomy>, fleet: Fleet, settings: LoopSettings, rng: StdRng) -> Self {
        let counters = fleet.anomaly_counters();
        Self {
            state: LoopState::Idle,
            settings,
            taxonomy,
            fleet,
            counters,
            rng,
            sinks: Vec::new(),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    /// Builds the fleet described by `config` on the built-in taxonomy.
    pub fn from_config(
        config: &FleetsimConfig,
        sinks: Vec<Arc<dyn TelemetrySink>>,
    ) -> Result<Self, EngineError> {
        config.validate_all()?;
        let taxonomy = Taxonomy::standard()?;
        let mut rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let plan = config.simulation.fleet_plan()?;
        let fleet = Registry::new(taxonomy).build(&plan, &mut rng)?;
        let settings = LoopSettings::from_config(config)?;
        Ok(Self::new(Arc::new(taxonomy.clone()), fleet, settings, rng).with_sinks(sinks))
    }

    pub fn with_sinks(mut self, sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn counters(&self) -> &AnomalyCounters {
        &self.counters
    }

    /// Runs cycles until the planned count is reached or `cancel` fires.
    #[instrument(skip_all, fields(machines = self.fleet.len()))]
    pub async fn start(&mut self, cancel: CancelSignal) -> Result<RunSummary, EngineError> {
        if self.state != LoopState::Idle {
            return Err(EngineError::NotIdle(self.state));
        }
        self.state = LoopState::Running;
        info!(
            "Starting simulation: {} machines, interval {:?}, {}",
            self.fleet.len(),
            self.settings.interval,
            match self.settings.planned_cycles {
                Some(n) => format!("{n} cycles"),
                None => "until cancelled".to_string(),
            }
        );

        self.connect_sinks().await;
        let result = self.run_cycles(&cancel).await;
        self.close_sinks().await;
        self.state = LoopState::Stopped;

        let summary = result?;
        info!(
            cycles = summary.cycles_completed,
            anomalies = summary.anomalies_injected,
            deliveries = summary.deliveries,
            failures = summary.sink_failures,
            reason = ?summary.stop_reason,
            "Simulation stopped"
        );
        Ok(summary)
    }

    async fn connect_sinks(&mut self) {
        let mut connected = Vec::with_capacity(self.sinks.len());
        for sink in self.sinks.drain(..) {
            match sink.connect().await {
                Ok(()) => connected.push(sink),
                Err(e) => warn!("Sink {} unavailable, continuing without it: {}", sink.name(), e),
            }
        }
        self.sinks = connected;
    }

    async fn close_sinks(&mut self) {
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                warn!("Error closing sink {}: {}", sink.name(), e);
            }
        }
    }

    async fn run_cycles(&mut self, cancel: &CancelSignal) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary {
            cycles_completed: 0,
            anomalies_injected: 0,
            deliveries: 0,
            skipped: 0,
            sink_failures: 0,
            timed_out_cycles: 0,
            stop_reason: StopReason::Completed,
            stream_digest: String::new(),
        };
        let mut hasher = blake3::Hasher::new();

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.reached_plan(summary.cycles_completed) {
                break StopReason::Completed;
            }

            let cycle_start = Instant::now();
            if let Some(event) = self.advance()? {
                summary.anomalies_injected += 1;
                self.record_anomaly(&event).await;
            }

            let envelopes = self.snapshot()?;
            for (device_id, envelope) in &envelopes {
                hasher.update(device_id.as_bytes());
                hasher.update(&envelope.to_bytes()?);
            }

            let (tally, timed_out) = self.dispatch(&envelopes).await;
            let delivered = tally.delivered.load(Ordering::Relaxed);
            let skipped = tally.skipped.load(Ordering::Relaxed);
            let mut failed = tally.failed.load(Ordering::Relaxed);
            if timed_out {
                let attempted = (envelopes.len() * self.sinks.len()) as u64;
                failed = attempted - delivered - skipped;
                summary.timed_out_cycles += 1;
                warn!(
                    "Sink fan-out exceeded {:?}; abandoned {} deliveries",
                    self.settings.sink_timeout,
                    failed - tally.failed.load(Ordering::Relaxed)
                );
            }
            summary.deliveries += delivered;
            summary.skipped += skipped;
            summary.sink_failures += failed;
            summary.cycles_completed += 1;

            let elapsed = cycle_start.elapsed();
            if let Some(metrics) = &self.metrics {
                metrics.record_cycle(elapsed.as_secs_f64());
                metrics.deliveries.inc_by(delivered);
                metrics.skipped.inc_by(skipped);
                metrics.sink_failures.inc_by(failed);
            }
            if summary.cycles_completed % PROGRESS_EVERY == 0 {
                info!(
                    "Completed {} cycles ({} anomalies so far)",
                    summary.cycles_completed, summary.anomalies_injected
                );
            }

            if self.reached_plan(summary.cycles_completed) {
                break StopReason::Completed;
            }

            match self.settings.interval.checked_sub(elapsed) {
                Some(remaining) if !remaining.is_zero() => {
                    tokio::select! {
                        _ = sleep(remaining) => {}
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                    }
                }
                _ => debug!("Cycle took {:?}, starting next cycle immediately", elapsed),
            }
        };

        summary.stop_reason = stop_reason;
        summary.stream_digest = hex::encode(hasher.finalize().as_bytes());
        Ok(summary)
    }

    fn reached_plan(&self, cycles: u64) -> bool {
        self.settings.planned_cycles.is_some_and(|n| cycles >= n)
    }

    /// Evolution then injection. All state mutation of a cycle happens here.
    fn advance(&mut self) -> Result<Option<AnomalyEvent>, EngineError> {
        evolve_fleet(&mut self.fleet, &self.taxonomy, &mut self.rng)?;
        Ok(maybe_inject(
            &self.settings.policy,
            &mut self.fleet,
            &self.taxonomy,
            &mut self.counters,
            &mut self.rng,
        ))
    }

    async fn record_anomaly(&self, event: &AnomalyEvent) {
        if let Some(metrics) = &self.metrics {
            metrics.anomalies.inc();
        }
        EventLogger::log_event(
            "anomaly_injected",
            vec![
                KeyValue::new("machine_id", event.machine_id.clone()),
                KeyValue::new("sensor", event.sensor.as_str()),
                KeyValue::new("value", event.value),
                KeyValue::new("occurrence", event.occurrence as i64),
            ],
        )
        .await;
    }

    fn snapshot(&self) -> Result<Vec<(String, Envelope)>, EngineError> {
        let ts = self.clock.now_ms();
        self.fleet
            .machines()
            .iter()
            .map(|machine| {
                let snapshot = CycleSnapshot::capture(machine, &self.taxonomy, ts)?;
                Ok((snapshot.machine_id.clone(), snapshot.envelope()))
            })
            .collect()
    }

    /// Sends every envelope to every sink concurrently, bounded by the
    /// sink timeout. Returns the tally and whether the timeout fired.
    async fn dispatch(&self, envelopes: &[(String, Envelope)]) -> (Tally, bool) {
        let tally = Tally::default();
        if self.sinks.is_empty() {
            return (tally, false);
        }

        let sends = envelopes.iter().flat_map(|(device_id, envelope)| {
            let tally = &tally;
            self.sinks.iter().map(move |sink| async move {
                match sink.send(device_id, envelope).await {
                    Ok(()) => {
                        tally.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) if e.is_skip() => {
                        warn!("No token found for device {}, skipping telemetry", device_id);
                        tally.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!(sink = sink.name(), device_id = %device_id, error = %e, "Telemetry send failed");
                        tally.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        });

        let timed_out = timeout(self.settings.sink_timeout, join_all(sends))
            .await
            .is_err();
        (tally, timed_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cancel::cancel_pair;
    use fleetsim_sink::testing::RecordingSink;
    use fleetsim_sink::{Credentials, HttpSink};
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    fn build(
        kinds: &[(&str, usize)],
        seed: u64,
        interval_secs: u64,
        duration_secs: u64,
        policy: AnomalyPolicy,
    ) -> DispatchLoop {
        let taxonomy = Taxonomy::standard().unwrap();
        let plan: BTreeMap<String, usize> =
            kinds.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let fleet = Registry::new(taxonomy).build(&plan, &mut rng).unwrap();
        let settings = LoopSettings::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(duration_secs),
            Duration::from_millis(2000),
            policy,
        )
        .unwrap();
        DispatchLoop::new(Arc::new(taxonomy.clone()), fleet, settings, rng)
            .with_clock(Arc::new(VirtualClock::new(1_700_000_000_000)))
    }

    #[tokio::test(start_paused = true)]
    async fn runs_exactly_duration_over_interval_cycles() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = build(&[("MIXER", 3)], 1, 2, 10, AnomalyPolicy::default())
            .with_sinks(vec![sink.clone()]);
        let started = Instant::now();

        let summary = engine.start(CancelSignal::never()).await.unwrap();

        assert_eq!(summary.cycles_completed, 5);
        assert_eq!(summary.stop_reason, StopReason::Completed);
        assert_eq!(summary.deliveries, 15);
        assert_eq!(sink.deliveries().len(), 15);
        assert_eq!(sink.connects(), 1);
        assert_eq!(sink.closes(), 1);
        assert_eq!(engine.state(), LoopState::Stopped);
        // Four cadence sleeps; no sleep after the last cycle.
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_loop_cannot_restart() {
        let mut engine = build(&[("PUMP_SYSTEM", 1)], 2, 1, 2, AnomalyPolicy::default());
        engine.start(CancelSignal::never()).await.unwrap();
        let before = engine.fleet().clone();
        assert!(matches!(
            engine.start(CancelSignal::never()).await,
            Err(EngineError::NotIdle(LoopState::Stopped))
        ));
        assert_eq!(engine.fleet(), &before);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_cadence_sleep() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = build(&[("MIXER", 1)], 3, 2, 0, AnomalyPolicy::default())
            .with_sinks(vec![sink.clone()]);
        let (handle, signal) = cancel_pair();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            handle.cancel();
        });
        let started = Instant::now();

        let summary = engine.start(signal).await.unwrap();

        // Cycles at t=0, 2 and 4; the sleep toward t=6 is cut short.
        assert_eq!(summary.cycles_completed, 3);
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_no_cycle() {
        let mut engine = build(&[("MIXER", 1)], 4, 1, 0, AnomalyPolicy::default());
        let initial = engine.fleet().clone();
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let summary = engine.start(signal).await.unwrap();
        assert_eq!(summary.cycles_completed, 0);
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(engine.fleet(), &initial);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_does_not_change_generated_stream() {
        let policy = AnomalyPolicy {
            probability: 0.2,
            ..AnomalyPolicy::default()
        };
        let fleet = [("CONVEYOR_SYSTEM", 2), ("CNC_MACHINE", 2)];

        let ok_sink = Arc::new(RecordingSink::new());
        let mut ok_run =
            build(&fleet, 42, 1, 100, policy).with_sinks(vec![ok_sink.clone()]);
        let ok = ok_run.start(CancelSignal::never()).await.unwrap();

        let mut failing_run = build(&fleet, 42, 1, 100, policy)
            .with_sinks(vec![Arc::new(RecordingSink::failing())]);
        let failed = failing_run.start(CancelSignal::never()).await.unwrap();

        assert_eq!(ok.cycles_completed, 100);
        assert_eq!(failed.cycles_completed, 100);
        assert!(ok.anomalies_injected > 0);
        assert_eq!(ok.anomalies_injected, failed.anomalies_injected);
        assert_eq!(ok.stream_digest, failed.stream_digest);
        assert_eq!(ok_run.fleet(), failing_run.fleet());
        assert_eq!(ok.deliveries, 400);
        assert_eq!(failed.deliveries, 0);
        assert_eq!(failed.sink_failures, 400);
        assert_eq!(ok_sink.deliveries().len(), 400);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sink_is_abandoned_at_timeout() {
        let mut engine = build(&[("MIXER", 2)], 5, 2, 4, AnomalyPolicy::default());
        engine.settings.sink_timeout = Duration::from_millis(100);
        let mut engine = engine.with_sinks(vec![Arc::new(RecordingSink::slow(Duration::from_secs(1)))]);
        let started = Instant::now();

        let summary = engine.start(CancelSignal::never()).await.unwrap();

        assert_eq!(summary.cycles_completed, 2);
        assert_eq!(summary.timed_out_cycles, 2);
        assert_eq!(summary.sink_failures, 4);
        assert_eq!(summary.deliveries, 0);
        // Cadence holds: the slow sink cannot stretch a cycle past the interval.
        assert_eq!(started.elapsed(), Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_sink_is_dropped_at_start() {
        let sink = Arc::new(RecordingSink::unreachable());
        let mut engine = build(&[("MIXER", 1)], 6, 1, 3, AnomalyPolicy::default())
            .with_sinks(vec![sink.clone()]);
        let summary = engine.start(CancelSignal::never()).await.unwrap();
        assert_eq!(summary.cycles_completed, 3);
        assert_eq!(summary.deliveries + summary.sink_failures, 0);
        assert_eq!(sink.connects(), 1);
        assert_eq!(sink.closes(), 0);
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn devices_without_token_are_skipped() {
        let http = HttpSink::new(
            "127.0.0.1",
            9,
            false,
            Credentials::PerDevice(Default::default()),
            Duration::from_secs(1),
        )
        .unwrap();
        let mut engine = build(&[("PUMP_SYSTEM", 3)], 7, 1, 2, AnomalyPolicy::default())
            .with_sinks(vec![Arc::new(http)]);
        let summary = engine.start(CancelSignal::never()).await.unwrap();
        assert_eq!(summary.skipped, 6);
        assert_eq!(summary.sink_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_follow_the_run() {
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        let mut engine = build(&[("MIXER", 2)], 8, 1, 4, AnomalyPolicy::default())
            .with_sinks(vec![Arc::new(RecordingSink::new())])
            .with_metrics(metrics.clone());
        let summary = engine.start(CancelSignal::never()).await.unwrap();
        assert_eq!(metrics.cycles.get(), 4);
        assert_eq!(metrics.deliveries.get(), 8);
        assert_eq!(metrics.anomalies.get(), summary.anomalies_injected);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn progress_and_anomalies_are_logged() {
        let policy = AnomalyPolicy {
            probability: 1.0,
            ..AnomalyPolicy::default()
        };
        let mut engine = build(&[("HYDRAULIC_PRESS", 1)], 9, 1, 10, policy);
        let summary = engine.start(CancelSignal::never()).await.unwrap();
        assert_eq!(summary.anomalies_injected, 10);
        assert_eq!(engine.counters().get("HYDRAULIC_PRESS_001"), 10);
        assert!(logs_contain("Completed 10 cycles"));
        assert!(logs_contain("Abnormal value injected"));
        assert!(logs_contain("anomaly_injected"));
    }

    #[test]
    fn settings_reject_zero_interval() {
        assert_eq!(
            LoopSettings::new(
                Duration::ZERO,
                Duration::from_secs(10),
                Duration::from_secs(1),
                AnomalyPolicy::default()
            ),
            Err(ConfigurationError::NonPositiveInterval)
        );
    }

    #[test]
    fn planned_cycles_floor_duration_by_interval() {
        let settings = LoopSettings::new(
            Duration::from_secs(2),
            Duration::from_secs(11),
            Duration::from_secs(1),
            AnomalyPolicy::default(),
        )
        .unwrap();
        assert_eq!(settings.planned_cycles, Some(5));
    }

    #[test]
    fn settings_from_default_config_are_unbounded() {
        let settings = LoopSettings::from_config(&FleetsimConfig::default()).unwrap();
        assert_eq!(settings.interval, Duration::from_secs(5));
        assert_eq!(settings.planned_cycles, None);
        assert_eq!(settings.sink_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn from_config_builds_seeded_fleet() {
        let mut config = FleetsimConfig::default();
        config.simulation.seed = Some(11);
        let a = DispatchLoop::from_config(&config, Vec::new()).unwrap();
        let b = DispatchLoop::from_config(&config, Vec::new()).unwrap();
        assert_eq!(a.fleet().len(), 36);
        assert_eq!(a.fleet(), b.fleet());
        assert_eq!(a.state(), LoopState::Idle);
    }
}
