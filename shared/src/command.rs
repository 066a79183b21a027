//! Command and outcome types for the Tello text protocol

use crate::protocol;
use std::fmt;
use std::time::Duration;

/// A text command with its per-send retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command text, sent verbatim
    pub text: String,
    /// Per-attempt response timeout
    pub timeout: Duration,
    /// Maximum number of attempts
    pub max_attempts: u32,
}

impl Command {
    /// Create a command with the default timeout and retry count
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout: protocol::RESPONSE_TIMEOUT,
            max_attempts: protocol::RETRY_COUNT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Read commands end with `?` and expect a value instead of an ack
    pub fn is_read(&self) -> bool {
        self.text.trim_end().ends_with('?')
    }
}

/// Final result of sending a control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The drone acknowledged the command
    Success,
    /// The drone answered with a fatal marker; retrying cannot help
    RejectedFatal { reason: String },
    /// Every attempt timed out or returned an unrecognized answer
    ExhaustedRetries { last_response: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Success => write!(f, "ok"),
            CommandOutcome::RejectedFatal { reason } => write!(f, "rejected: {}", reason),
            CommandOutcome::ExhaustedRetries { last_response } => {
                write!(f, "gave up: {}", last_response)
            }
        }
    }
}

/// How a single response is treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Ok,
    Fatal,
    Retry,
}

/// Classify a raw response by substring match on its lower-cased text
pub fn classify_response(response: &str) -> ResponseClass {
    let lowered = response.to_lowercase();
    if lowered.contains("ok") {
        ResponseClass::Ok
    } else if protocol::FATAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        ResponseClass::Fatal
    } else {
        ResponseClass::Retry
    }
}
