//! Command observers
//!
//! Everything the dispatcher and executor do is reported as a
//! [`CommandEvent`]. The presentation layer subscribes through
//! [`CommandLog::with_channel`].

use arc_swap::ArcSwap;
use std::sync::Arc;
use tello_shared::CommandOutcome;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// A command is about to be sent
    Attempt {
        command: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// Raw response received for a command
    Response { command: String, response: String },
    /// An attempt got no response, e.g. it timed out
    AttemptFailed {
        command: String,
        attempt: u32,
        error: String,
    },
    /// Final outcome of a control command
    Outcome {
        command: String,
        outcome: CommandOutcome,
    },
    /// Informational message for the operator
    Note(String),
    /// An executed line failed
    Failure { line: String, error: String },
}

pub trait CommandObserver: Send + Sync {
    fn on_event(&self, event: &CommandEvent);
}

impl<F> CommandObserver for F
where
    F: Fn(&CommandEvent) + Send + Sync,
{
    fn on_event(&self, event: &CommandEvent) {
        self(event)
    }
}

/// Text of the most recently sent command, read by the frame stamper
#[derive(Debug, Clone)]
pub struct LatestCommand {
    text: Arc<ArcSwap<String>>,
}

impl LatestCommand {
    pub fn new() -> Self {
        Self {
            text: Arc::new(ArcSwap::from_pointee(String::new())),
        }
    }

    pub fn set(&self, command: &str) {
        self.text.store(Arc::new(command.to_string()));
    }

    pub fn get(&self) -> Arc<String> {
        self.text.load_full()
    }
}

impl Default for LatestCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Default observer: remembers the latest command and forwards events
pub struct CommandLog {
    latest: LatestCommand,
    events: Option<mpsc::UnboundedSender<CommandEvent>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self {
            latest: LatestCommand::new(),
            events: None,
        }
    }

    /// Also forward every event to the returned receiver
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<CommandEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Self {
            latest: LatestCommand::new(),
            events: Some(tx),
        };
        (log, rx)
    }

    pub fn latest_command(&self) -> LatestCommand {
        self.latest.clone()
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandObserver for CommandLog {
    fn on_event(&self, event: &CommandEvent) {
        trace!("Command event: {:?}", event);

        if let CommandEvent::Attempt { command, attempt: 1, .. } = event {
            self.latest.set(command);
        }
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is listening anymore
            let _ = tx.send(event.clone());
        }
    }
}
