//! # Fleetsim Protocol Codecs
//!
//! Wire formats used by the telemetry sinks. Only the MQTT 3.1.1 subset a
//! QoS 1 publisher needs is implemented.

pub mod mqtt;

pub use mqtt::{ConnectReturnCode, MqttParseError, MqttParser, Packet};
