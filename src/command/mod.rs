//! Command handling for the pilot
//!
//! This module handles:
//! - Sending control commands with retry and response classification
//! - Parsing operator lines into meta-commands or raw drone commands
//! - Playing back command files
//! - Repeating a command until told to stop
//! - Reporting command traffic to observers

mod dispatcher;
mod executor;
mod observer;
mod repeater;

pub use dispatcher::CommandDispatcher;
pub use executor::CommandExecutor;
pub use observer::{CommandEvent, CommandLog, CommandObserver, LatestCommand};
pub use repeater::CommandRepeater;
