//! Runs in its own test binary so installing the global subscriber does not
//! collide with `#[traced_test]` in the unit tests.

use fleetsim_config::TelemetryConfig;
use fleetsim_telemetry::EventLogger;

#[test]
fn init_twice_does_not_panic() {
    let config = TelemetryConfig::default();
    EventLogger::init(&config);
    EventLogger::init(&config);
}
