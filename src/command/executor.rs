//! Command executor - parses operator lines and dispatches them
//!
//! A line is either a meta-command handled locally (photo, video, stream,
//! track, sleep, run) or a raw SDK command sent to the drone. Command files
//! are played back line by line through the same path.

use super::{CommandDispatcher, CommandEvent, CommandObserver};
use crate::config::ExecutorConfig;
use crate::video::{TrackerFactory, VideoWorker, RECORDING_EXTENSION};
use anyhow::{bail, Context, Result};
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Deepest allowed nesting of command files
pub const MAX_RUN_DEPTH: usize = 8;

/// Seconds slept when `sleep` has no usable argument
const DEFAULT_SLEEP_SECS: f64 = 1.0;

const PHOTO_EXTENSION: &str = "png";

/// What a line asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Land,
    Takeoff,
    Photo,
    Video,
    Stream,
    Track,
    /// `?`-suffixed read command
    Query(String),
    Sleep(f64),
    Run(PathBuf),
    /// Anything else goes to the drone verbatim
    Control(String),
}

impl Action {
    /// Parse a line; `None` for blank input
    pub fn parse(line: &str, default_file: &Path) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let lowered = line.to_lowercase();

        let action = match lowered.as_str() {
            "land" => Action::Land,
            "takeoff" => Action::Takeoff,
            "p" | "photo" => Action::Photo,
            "v" | "video" => Action::Video,
            "s" | "stream" => Action::Stream,
            "t" | "track" => Action::Track,
            _ if lowered.ends_with('?') => Action::Query(line.to_string()),
            _ if lowered.contains("sleep") => Action::Sleep(
                argument(line)
                    .and_then(|value| value.parse::<f64>().ok())
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .unwrap_or(DEFAULT_SLEEP_SECS),
            ),
            _ if lowered.contains("run") || lowered.contains("load") => Action::Run(
                argument(line)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| default_file.to_path_buf()),
            ),
            _ => Action::Control(line.to_string()),
        };
        Some(action)
    }
}

/// Second word of a two-word line
fn argument(line: &str) -> Option<&str> {
    let mut parts = line.split(' ');
    let _keyword = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() || value.is_empty() {
        return None;
    }
    Some(value)
}

pub struct CommandExecutor {
    dispatcher: Arc<CommandDispatcher>,
    worker: Arc<VideoWorker>,
    observer: Arc<dyn CommandObserver>,
    config: ExecutorConfig,
    tracker_factory: Option<TrackerFactory>,
}

impl CommandExecutor {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        worker: Arc<VideoWorker>,
        observer: Arc<dyn CommandObserver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            dispatcher,
            worker,
            observer,
            config,
            tracker_factory: None,
        }
    }

    /// Trackers are built from this factory each time tracking starts
    pub fn with_tracker_factory(mut self, factory: TrackerFactory) -> Self {
        self.tracker_factory = Some(factory);
        self
    }

    /// Execute one line; failures are logged and reported, never raised
    pub fn execute<'a>(&'a self, line: &'a str) -> BoxFuture<'a, bool> {
        self.execute_at_depth(line, 0)
    }

    /// Play back a command file
    pub async fn run_file(&self, path: &Path) -> bool {
        let result = self.run_file_at_depth(path, 1).await;
        self.report(&format!("run {}", path.display()), result)
    }

    fn execute_at_depth<'a>(&'a self, line: &'a str, depth: usize) -> BoxFuture<'a, bool> {
        async move {
            let result = self.perform(line, depth).await;
            self.report(line.trim(), result)
        }
        .boxed()
    }

    fn report(&self, line: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Error executing '{}': {:#}", line, e);
                self.observer.on_event(&CommandEvent::Failure {
                    line: line.to_string(),
                    error: format!("{:#}", e),
                });
                false
            }
        }
    }

    async fn perform(&self, line: &str, depth: usize) -> Result<()> {
        let Some(action) = Action::parse(line, &self.config.default_command_file) else {
            return Ok(());
        };

        match action {
            Action::Land => self.land().await,
            Action::Takeoff => self.takeoff().await,
            Action::Photo => {
                let path = artifact_path(&self.config.photo_dir, PHOTO_EXTENSION);
                if !self.worker.take_picture(&path).await {
                    bail!("Failed to save picture {}", path.display());
                }
                self.note(format!("Picture saved to {}", path.display()));
                Ok(())
            }
            Action::Video => {
                let path = artifact_path(&self.config.video_dir, RECORDING_EXTENSION);
                let on = self.worker.toggle_recording(path.clone()).await;
                self.note(if on {
                    format!("Recording to {}", path.display())
                } else {
                    "Recording stopped".to_string()
                });
                Ok(())
            }
            Action::Stream => {
                let on = self.worker.toggle_streaming().await;
                self.note(format!("Streaming {}", if on { "on" } else { "off" }));
                Ok(())
            }
            Action::Track => {
                let tracker = self.tracker_factory.as_ref().map(|factory| factory());
                let on = self.worker.toggle_tracking(tracker).await?;
                self.note(format!("Tracking {}", if on { "on" } else { "off" }));
                Ok(())
            }
            Action::Query(text) => {
                let response = self.dispatcher.send_read(&text).await?;
                self.note(format!("{} {}", text, response));
                Ok(())
            }
            Action::Sleep(secs) => {
                self.note(format!("Sleeping {} s", secs));
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                Ok(())
            }
            Action::Run(path) => self.run_file_at_depth(&path, depth + 1).await,
            Action::Control(text) => self.control(&text).await,
        }
    }

    async fn control(&self, text: &str) -> Result<()> {
        let outcome = self.dispatcher.send_control(text).await;
        if !outcome.is_success() {
            bail!("Command '{}' {}", text, outcome);
        }
        Ok(())
    }

    async fn takeoff(&self) -> Result<()> {
        self.control("takeoff").await?;
        if !self.dispatcher.transport().is_airborne().await {
            bail!("Drone is not airborne after takeoff");
        }
        Ok(())
    }

    async fn land(&self) -> Result<()> {
        self.control("land").await?;
        if self.dispatcher.transport().is_airborne().await {
            bail!("Drone is still airborne after land");
        }
        Ok(())
    }

    async fn run_file_at_depth(&self, path: &Path, depth: usize) -> Result<()> {
        if depth > MAX_RUN_DEPTH {
            bail!("Command files nested deeper than {} levels", MAX_RUN_DEPTH);
        }
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open command file {}", path.display()))?;
        info!("Running command file {}", path.display());

        let mut lines = BufReader::new(file).lines();
        let mut executed = 0usize;
        let mut failed = 0usize;

        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("Failed to read command file {}", path.display()))?
        {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            executed += 1;
            if !self.execute_at_depth(line, depth).await {
                failed += 1;
            }
        }

        info!(
            "Finished command file {} ({} lines, {} failed)",
            path.display(),
            executed,
            failed
        );
        Ok(())
    }

    fn note(&self, message: String) {
        info!("{}", message);
        self.observer.on_event(&CommandEvent::Note(message));
    }
}

/// Timestamp-named file in `dir`
fn artifact_path(dir: &Path, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", tello_shared::timestamp(), extension))
}
