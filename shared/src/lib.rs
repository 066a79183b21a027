//! Tello Shared Protocol Types
//!
//! This crate provides the protocol constants, command types, response
//! classification and state-packet codec shared by the pilot binary and its
//! transports.

pub mod codec;
pub mod command;
pub mod state_machine;

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub use codec::{StateParseError, TelloState};
pub use command::{classify_response, Command, CommandOutcome, ResponseClass};
pub use state_machine::{FlightEvent, FlightState, FlightStateMachine, TransitionResult};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Local time formatted as `YYYY-MMDD-HHMMSS`, used to name photos and videos
pub fn timestamp() -> String {
    timestamp_at(SystemTime::now())
}

/// `at` in local time, in the same format as [`timestamp`]
pub fn timestamp_at(at: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(at)
        .format("%Y-%m%d-%H%M%S")
        .to_string()
}

/// Protocol parameters for the Tello SDK
pub mod protocol {
    use std::time::Duration;

    /// Default drone address in AP mode
    pub const TELLO_IP: &str = "192.168.10.1";

    /// UDP port the drone accepts commands on
    pub const CONTROL_PORT: u16 = 8889;

    /// UDP port the drone broadcasts state packets to
    pub const STATE_PORT: u16 = 8890;

    /// Per-attempt response timeout for commands
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(7);

    /// Attempts made for a control command before giving up
    pub const RETRY_COUNT: u32 = 3;

    /// Minimum gap the drone needs between two commands
    pub const TIME_BETWEEN_COMMANDS: Duration = Duration::from_millis(100);

    /// Response substrings meaning the command can never succeed
    pub const FATAL_MARKERS: [&str; 3] = ["error auto land", "unknown command", "error motor stop"];

    /// Command file executed by `run`/`load` without an argument
    pub const DEFAULT_COMMAND_FILE: &str = "telloCommands.txt";

    /// Battery percentage below which the status monitor warns
    pub const BATTERY_CRITICAL_PERCENT: u32 = 20;

    /// RC channel limits
    pub const RC_MIN: i32 = -100;
    pub const RC_MAX: i32 = 100;
}

/// Errors reported by a drone transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Aborting command '{command}'. Did not receive a response after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Transport I/O error: {0}")]
    Io(String),

    #[error("No video frame available")]
    NoFrame,

    #[error("Command '{command}' rejected: {response}")]
    Rejected { command: String, response: String },

    #[error("Video stream is not enabled")]
    StreamOff,

    #[error("No state packet received yet")]
    NoState,

    #[error("Transport closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
