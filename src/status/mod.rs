//! Status Module
//!
//! Polls drone telemetry in the background and publishes a status report
//! for the presentation layer.

mod monitor;

pub use monitor::{StatusMonitor, StatusReport};
