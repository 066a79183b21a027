//! Pilot context
//!
//! Owns the configuration, transport, dispatcher, video worker, executor and
//! repeater for one drone session, and wires them together.

use crate::command::{CommandDispatcher, CommandEvent, CommandExecutor, CommandLog, CommandObserver, CommandRepeater};
use crate::config::PilotConfig;
use crate::transport::{Telemetry, Transport};
use crate::video::{FrameTracker, MotionTracker, PreviewSink, VideoWorker, RECORDING_EXTENSION};
use std::sync::Arc;
use std::time::Duration;
use tello_shared::protocol;
use tracing::{error, info, warn};

/// How long `connect` waits for the first state packet
const STATE_WAIT: Duration = Duration::from_secs(2);
const STATE_POLL: Duration = Duration::from_millis(100);

pub struct Pilot {
    config: PilotConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn CommandObserver>,
    dispatcher: Arc<CommandDispatcher>,
    worker: Arc<VideoWorker>,
    executor: Arc<CommandExecutor>,
    repeater: CommandRepeater,
}

impl Pilot {
    pub fn new(
        config: PilotConfig,
        transport: Arc<dyn Transport>,
        log: Arc<CommandLog>,
        preview: Arc<dyn PreviewSink>,
    ) -> Self {
        let latest_command = log.latest_command();
        let observer: Arc<dyn CommandObserver> = log;

        let dispatcher = Arc::new(CommandDispatcher::new(
            transport.clone(),
            observer.clone(),
            &config.connection,
        ));
        let worker = Arc::new(VideoWorker::new(
            transport.clone(),
            &config.video,
            latest_command,
            preview,
        ));

        let threshold = config.video.tracker_threshold;
        let executor = Arc::new(
            CommandExecutor::new(
                dispatcher.clone(),
                worker.clone(),
                observer.clone(),
                config.executor.clone(),
            )
            .with_tracker_factory(Box::new(move || {
                Box::new(MotionTracker::new(threshold)) as Box<dyn FrameTracker>
            })),
        );
        let repeater = CommandRepeater::new(executor.clone(), config.repeat_delay);

        Self {
            config,
            transport,
            observer,
            dispatcher,
            worker,
            executor,
            repeater,
        }
    }

    pub fn worker(&self) -> &Arc<VideoWorker> {
        &self.worker
    }

    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    pub fn repeater(&self) -> &CommandRepeater {
        &self.repeater
    }

    /// Enter SDK mode, report the drone's condition and apply the
    /// configured speed and video defaults
    pub async fn connect(&self) -> bool {
        info!("Connecting to drone over {}", self.transport.name());
        let outcome = self.dispatcher.send_control("command").await;
        if !outcome.is_success() {
            error!("Failed to connect: {}", outcome);
            self.note(format!("Connection failed: {}", outcome));
            return false;
        }

        match self.wait_for_telemetry().await {
            Some(t) => self.note(format!(
                "Connected. Battery: {}%, speed: {:.0} cm/s, temperature: {:.1} °C",
                t.battery, t.speed, t.temperature
            )),
            None => {
                warn!("No state packets received from drone");
                self.note("Connected. No telemetry yet".to_string());
            }
        }

        if !self.set_speed(self.config.default_speed).await {
            warn!("Failed to apply default speed {}", self.config.default_speed);
        }
        if self.config.video.stream_on_connect {
            self.worker.toggle_streaming().await;
        }
        if self.config.video.record_on_connect {
            let path = self.config.executor.video_dir.join(format!(
                "{}.{}",
                tello_shared::timestamp(),
                RECORDING_EXTENSION
            ));
            self.worker.toggle_recording(path).await;
        }
        true
    }

    /// Speed in cm/s for subsequent movement commands
    pub async fn set_speed(&self, speed: u32) -> bool {
        self.dispatcher
            .send_control(&format!("speed {}", speed))
            .await
            .is_success()
    }

    /// Four-channel remote control; values are clamped to the SDK range
    pub async fn send_rc_control(
        &self,
        left_right: i32,
        forward_backward: i32,
        up_down: i32,
        yaw: i32,
        context: &str,
    ) -> bool {
        let clamp = |v: i32| v.clamp(protocol::RC_MIN, protocol::RC_MAX);
        let command = format!(
            "rc {} {} {} {}",
            clamp(left_right),
            clamp(forward_backward),
            clamp(up_down),
            clamp(yaw)
        );

        match self.dispatcher.send_without_response(&command).await {
            Ok(()) => {
                self.note(format!("{}: {}", context, command));
                true
            }
            Err(e) => {
                error!("Failed to send '{}': {}", command, e);
                false
            }
        }
    }

    /// Restart the drone; it does not answer
    pub async fn reboot(&self) -> bool {
        match self.dispatcher.send_without_response("reboot").await {
            Ok(()) => {
                self.note("Rebooting drone".to_string());
                true
            }
            Err(e) => {
                error!("Failed to send reboot: {}", e);
                false
            }
        }
    }

    /// Stop every repeating command and video consumer, then release the link
    pub async fn end(&self) {
        self.repeater.stop_all().await;
        self.worker.stop_all().await;
        self.transport.close().await;
        info!("Session ended");
    }

    async fn wait_for_telemetry(&self) -> Option<Telemetry> {
        let deadline = tokio::time::Instant::now() + STATE_WAIT;
        loop {
            if let Ok(telemetry) = self.transport.telemetry().await {
                return Some(telemetry);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(STATE_POLL).await;
        }
    }

    fn note(&self, message: String) {
        info!("{}", message);
        self.observer.on_event(&CommandEvent::Note(message));
    }
}
