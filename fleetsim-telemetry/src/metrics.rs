//! ## fleetsim-telemetry::metrics
//! **Prometheus counters for a simulation run**
//!
//! Each recorder owns its registry, so several runs in one process (tests)
//! never collide on metric names.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub cycles: IntCounter,
    pub anomalies: IntCounter,
    pub deliveries: IntCounter,
    pub skipped: IntCounter,
    pub sink_failures: IntCounter,
    pub cycle_duration: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let cycles = IntCounter::new("fleetsim_cycles_total", "Completed simulation cycles")?;
        let anomalies =
            IntCounter::new("fleetsim_anomalies_total", "Injected out-of-range values")?;
        let deliveries = IntCounter::new(
            "fleetsim_deliveries_total",
            "Snapshots accepted by a sink",
        )?;
        let skipped = IntCounter::new(
            "fleetsim_skipped_deliveries_total",
            "Snapshots not sent for lack of a device credential",
        )?;
        let sink_failures =
            IntCounter::new("fleetsim_sink_failures_total", "Failed or abandoned sends")?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "fleetsim_cycle_duration_seconds",
                "Processing time of one cycle, excluding the cadence sleep",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(anomalies.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(skipped.clone()))?;
        registry.register(Box::new(sink_failures.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            cycles,
            anomalies,
            deliveries,
            skipped,
            sink_failures,
            cycle_duration,
        })
    }

    /// Text exposition format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_cycle(&self, seconds: f64) {
        self.cycles.inc();
        self.cycle_duration.observe(seconds);
    }
}
