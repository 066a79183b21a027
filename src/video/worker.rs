//! Video Worker
//!
//! A single task that runs while any of streaming, recording or tracking is
//! on. Each iteration pulls the newest frame from the transport, fits it to
//! the target size, runs the tracker, stamps it, hands it to the recorder and
//! the preview, and finally stores it for snapshots.
//!
//! Toggles flip their flag while holding the task handle lock, so a stop that
//! waits for the task to exit cannot be overtaken by a concurrent start.

use super::recording::RecordingSession;
use super::{FlagSnapshot, Frame, FrameStore, FrameTracker, PreviewSink, WorkerFlags};
use crate::command::LatestCommand;
use crate::config::VideoConfig;
use crate::transport::Transport;
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the current recording span writes to
#[derive(Debug, Clone, Default)]
struct RecordingTarget {
    path: Option<PathBuf>,
    /// Incremented on every recording start
    epoch: u64,
}

pub(super) struct WorkerShared {
    pub(super) transport: Arc<dyn Transport>,
    pub(super) flags: WorkerFlags,
    pub(super) store: FrameStore,
    target_size: (u32, u32),
    frame_period: Duration,
    stamping: bool,
    recording: Mutex<RecordingTarget>,
    tracker: Mutex<Option<Box<dyn FrameTracker>>>,
    preview: Arc<dyn PreviewSink>,
    latest_command: LatestCommand,
}

pub struct VideoWorker {
    pub(super) shared: Arc<WorkerShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VideoWorker {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &VideoConfig,
        latest_command: LatestCommand,
        preview: Arc<dyn PreviewSink>,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                transport,
                flags: WorkerFlags::new(),
                store: FrameStore::new(),
                target_size: config.target_size(),
                frame_period: config.frame_period(),
                stamping: config.stamping,
                recording: Mutex::new(RecordingTarget::default()),
                tracker: Mutex::new(None),
                preview,
                latest_command,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn flags(&self) -> FlagSnapshot {
        self.shared.flags.snapshot()
    }

    #[cfg(test)]
    pub fn store(&self) -> &FrameStore {
        &self.shared.store
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Flip live preview; returns the new state
    pub async fn toggle_streaming(&self) -> bool {
        let mut task = self.task.lock().await;
        let on = !self.shared.flags.streaming();
        self.shared.flags.set_streaming(on);
        self.sync_task(&mut task).await;

        debug!("Streaming {}", if on { "started" } else { "stopped" });
        on
    }

    /// Flip recording; `path` is used only when recording starts
    pub async fn toggle_recording(&self, path: PathBuf) -> bool {
        let mut task = self.task.lock().await;
        let on = !self.shared.flags.recording();
        if on {
            let mut target = self.shared.recording.lock().await;
            target.epoch += 1;
            debug!("Recording span {} targets {}", target.epoch, path.display());
            target.path = Some(path);
        }
        self.shared.flags.set_recording(on);
        self.sync_task(&mut task).await;

        on
    }

    /// Flip tracking; turning it on installs `tracker`
    pub async fn toggle_tracking(&self, tracker: Option<Box<dyn FrameTracker>>) -> Result<bool> {
        let mut task = self.task.lock().await;
        let on = !self.shared.flags.tracking();
        if on {
            let tracker = tracker.ok_or_else(|| anyhow!("No tracker available"))?;
            *self.shared.tracker.lock().await = Some(tracker);
        }
        self.shared.flags.set_tracking(on);
        self.sync_task(&mut task).await;

        if !on {
            *self.shared.tracker.lock().await = None;
        }
        debug!("Tracking {}", if on { "started" } else { "stopped" });
        Ok(on)
    }

    /// Turn every consumer off and wait for the task to exit
    pub async fn stop_all(&self) {
        let mut task = self.task.lock().await;
        self.shared.flags.clear();
        self.sync_task(&mut task).await;
        *self.shared.tracker.lock().await = None;
    }

    /// Start the task if a flag is on, join it if none is
    async fn sync_task(&self, task: &mut Option<JoinHandle<()>>) {
        if self.shared.flags.any() {
            if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
                return;
            }
            if let Some(stale) = task.take() {
                let _ = stale.await;
            }
            let shared = self.shared.clone();
            *task = Some(tokio::spawn(async move { shared.run().await }));
        } else if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                error!("Video worker task failed: {}", e);
            }
        }
    }
}

/// Edge detector for frame failures: warns once per failure streak
#[derive(Debug)]
struct FailureStreak {
    failing: bool,
}

impl FailureStreak {
    fn new() -> Self {
        Self { failing: false }
    }

    /// True only on the first failure of a streak
    fn failure(&mut self) -> bool {
        let first = !self.failing;
        self.failing = true;
        first
    }

    /// True only on the success that ends a streak
    fn success(&mut self) -> bool {
        let recovered = self.failing;
        self.failing = false;
        recovered
    }
}

/// State carried from one worker iteration to the next
struct IterationState {
    session: Option<RecordingSession>,
    frames: FailureStreak,
}

impl IterationState {
    fn new() -> Self {
        Self {
            session: None,
            frames: FailureStreak::new(),
        }
    }
}

impl WorkerShared {
    async fn run(self: Arc<Self>) {
        info!("Video worker started");
        if let Err(e) = self.transport.set_stream_enabled(true).await {
            warn!("Failed to enable video stream: {}", e);
        }

        let mut state = IterationState::new();
        loop {
            let started = Instant::now();
            if !self.iterate(&mut state).await {
                break;
            }
            tokio::time::sleep(self.frame_period.saturating_sub(started.elapsed())).await;
        }

        if let Some(finished) = state.session.take() {
            close_session(finished);
        }
        self.store.clear();
        self.preview.close();
        if let Err(e) = self.transport.set_stream_enabled(false).await {
            warn!("Failed to disable video stream: {}", e);
        }
        info!("Video worker stopped");
    }

    /// One pass of the loop; returns false once every flag is off
    async fn iterate(&self, state: &mut IterationState) -> bool {
        let flags = self.flags.snapshot();
        let epoch = self.recording.lock().await.epoch;

        // a session from a finished span closes before the next pull
        let stale = state
            .session
            .as_ref()
            .is_some_and(|s| !flags.recording || s.epoch() != epoch);
        if stale {
            if let Some(finished) = state.session.take() {
                close_session(finished);
            }
        }

        if !flags.any() {
            return false;
        }

        match self.process_frame(flags, &mut state.session).await {
            Ok(()) => {
                if state.frames.success() {
                    info!("Video frames flowing again");
                }
            }
            Err(e) => {
                if state.frames.failure() {
                    warn!("Video frame processing failed: {:#}", e);
                } else {
                    debug!("Video frame processing failed: {:#}", e);
                }
            }
        }
        true
    }

    async fn process_frame(
        &self,
        flags: FlagSnapshot,
        session: &mut Option<RecordingSession>,
    ) -> Result<()> {
        let mut frame = self
            .transport
            .pull_latest_frame()
            .await
            .context("Failed to pull frame")?
            .fit_to(self.target_size);
        let mut failures = Vec::new();

        if flags.tracking {
            if let Some(tracker) = self.tracker.lock().await.as_mut() {
                if let Err(e) = tracker.track(&mut frame) {
                    failures.push(e.context("Tracker failed"));
                }
            }
        }

        if self.stamping {
            frame.caption = self.caption(&frame).await;
        }

        let frame = Arc::new(frame);

        if flags.recording {
            if let Err(e) = self.record(&frame, session).await {
                failures.push(e);
            }
        }
        if flags.streaming {
            if let Err(e) = self.preview.show(&frame) {
                failures.push(e.context("Preview failed"));
            }
        }

        self.store.publish(frame);

        if failures.is_empty() {
            return Ok(());
        }
        let joined: Vec<String> = failures.iter().map(|e| format!("{:#}", e)).collect();
        bail!("{}", joined.join("; "))
    }

    async fn record(&self, frame: &Frame, session: &mut Option<RecordingSession>) -> Result<()> {
        if session.is_none() {
            let target = self.recording.lock().await.clone();
            let path = target
                .path
                .ok_or_else(|| anyhow!("Recording enabled without a target file"))?;
            *session = Some(RecordingSession::create(
                &path,
                frame.dimensions(),
                target.epoch,
                self.frame_period,
            )?);
            debug!("Opened recording {}", path.display());
        }
        match session.as_mut() {
            Some(s) => s.write(frame),
            None => Ok(()),
        }
    }

    /// Capture time, altitude and the last command sent
    async fn caption(&self, frame: &Frame) -> Vec<String> {
        let mut lines = vec![tello_shared::timestamp_at(frame.captured_at)];
        if let Ok(telemetry) = self.transport.telemetry().await {
            lines.push(format!("h: {} cm", telemetry.height));
        }
        let command = self.latest_command.get();
        if !command.is_empty() {
            lines.push(command.to_string());
        }
        lines
    }
}

fn close_session(session: RecordingSession) {
    let path = session.path().to_path_buf();
    match session.finish() {
        Ok(frames) => info!("Recording saved to {} ({} frames)", path.display(), frames),
        Err(e) => error!("Failed to close recording {}: {:#}", path.display(), e),
    }
}
