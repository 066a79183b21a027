//! Transport trait abstraction for pluggable drone links

use crate::video::Frame;
use async_trait::async_trait;
use std::time::Duration;
use tello_shared::TransportError;

/// Scalar telemetry snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    /// Battery percentage
    pub battery: u32,
    /// Height above takeoff point in cm
    pub height: i32,
    /// Average board temperature in °C
    pub temperature: f32,
    /// Motor-on time in seconds
    pub flight_time: u32,
    /// Ground speed in cm/s
    pub speed: f32,
    pub airborne: bool,
}

/// A link to the drone: command channel, video frames and telemetry
///
/// Implementations must allow the command methods and the frame methods to
/// be called concurrently from different tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a command and wait up to `timeout` for its response
    async fn send_command_with_response(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;

    /// Send a command without waiting for any response
    async fn send_command_without_response(&self, command: &str) -> Result<(), TransportError>;

    /// Most recent decoded frame; never queued
    async fn pull_latest_frame(&self) -> Result<Frame, TransportError>;

    /// Turn the drone's video stream on or off
    async fn set_stream_enabled(&self, enabled: bool) -> Result<(), TransportError>;

    async fn telemetry(&self) -> Result<Telemetry, TransportError>;

    async fn is_airborne(&self) -> bool;

    /// Release the link
    async fn close(&self) {}

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
