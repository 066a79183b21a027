//! Scripted in-memory transport for tests

use super::{Telemetry, Transport};
use crate::video::Frame;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tello_shared::{FlightStateMachine, TransportError};

/// Answers commands from a script (then `ok`), records everything sent and
/// produces synthetic frames
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<String, TransportError>>>,
    sent: Mutex<Vec<String>>,
    unanswered: Mutex<Vec<String>>,
    stream_calls: Mutex<Vec<bool>>,
    flight: Mutex<FlightStateMachine>,
    airborne_pin: Mutex<Option<bool>>,
    pulls: AtomicUsize,
    battery: AtomicU32,
    fail_frames: AtomicBool,
    failed_pulls: usize,
    frame_size: (u32, u32),
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            unanswered: Mutex::new(Vec::new()),
            stream_calls: Mutex::new(Vec::new()),
            flight: Mutex::new(FlightStateMachine::new()),
            airborne_pin: Mutex::new(None),
            pulls: AtomicUsize::new(0),
            battery: AtomicU32::new(80),
            fail_frames: AtomicBool::new(false),
            failed_pulls: 0,
            frame_size: (32, 24),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue plain text responses
    pub fn with_responses<'a>(self, responses: impl IntoIterator<Item = &'a str>) -> Self {
        self.with_script(responses.into_iter().map(|r| Ok(r.to_string())))
    }

    /// Queue raw results, e.g. timeouts
    pub fn with_script(self, script: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        self.script.lock().unwrap().extend(script);
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// Every exchange takes this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_frames(self) -> Self {
        self.fail_frames.store(true, Ordering::SeqCst);
        self
    }

    /// The first `count` pulls report no frame, as a decoder still warming up
    pub fn fail_first_frames(mut self, count: usize) -> Self {
        self.failed_pulls = count;
        self
    }

    pub fn set_failing_frames(&self, failing: bool) {
        self.fail_frames.store(failing, Ordering::SeqCst);
    }

    /// Report this airborne state regardless of acknowledged commands
    pub fn pin_airborne(&self, airborne: Option<bool>) {
        *self.airborne_pin.lock().unwrap() = airborne;
    }

    pub fn set_battery(&self, percent: u32) {
        self.battery.store(percent, Ordering::SeqCst);
    }

    pub fn timeout(command: &str) -> Result<String, TransportError> {
        Err(TransportError::Timeout {
            command: command.to_string(),
            after: Duration::from_millis(1),
        })
    }

    /// Commands sent with a response expected, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn unanswered(&self) -> Vec<String> {
        self.unanswered.lock().unwrap().clone()
    }

    pub fn stream_calls(&self) -> Vec<bool> {
        self.stream_calls.lock().unwrap().clone()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Highest number of exchanges observed in progress at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_command_with_response(
        &self,
        command: &str,
        _timeout: Duration,
    ) -> Result<String, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.sent.lock().unwrap().push(command.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()));
        if let Ok(response) = &result {
            self.flight.lock().unwrap().observe_exchange(command, response);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn send_command_without_response(&self, command: &str) -> Result<(), TransportError> {
        self.unanswered.lock().unwrap().push(command.to_string());
        Ok(())
    }

    async fn pull_latest_frame(&self) -> Result<Frame, TransportError> {
        let n = self.pulls.fetch_add(1, Ordering::SeqCst);
        if n < self.failed_pulls || self.fail_frames.load(Ordering::SeqCst) {
            return Err(TransportError::NoFrame);
        }
        let shade = (n % 256) as u8;
        let (width, height) = self.frame_size;
        Ok(Frame::new(RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]))))
    }

    async fn set_stream_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        self.stream_calls.lock().unwrap().push(enabled);
        Ok(())
    }

    async fn telemetry(&self) -> Result<Telemetry, TransportError> {
        Ok(Telemetry {
            battery: self.battery.load(Ordering::SeqCst),
            airborne: self.is_airborne().await,
            ..Default::default()
        })
    }

    async fn is_airborne(&self) -> bool {
        let pinned = *self.airborne_pin.lock().unwrap();
        pinned.unwrap_or_else(|| self.flight.lock().unwrap().is_airborne())
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}
