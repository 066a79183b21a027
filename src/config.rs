//! Pilot configuration
//!
//! Settings come from a plain `key=value` text file (`telloConfig.txt` by
//! default). Lines starting with `#` and blank lines are skipped; a line
//! without a separator continues the value of the previous key.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tello_shared::protocol;
use tracing::warn;

/// Default config file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "telloConfig.txt";

/// Connection parameters for the drone link
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Drone address
    pub host: String,
    /// Remote (and local) command port
    pub control_port: u16,
    /// Local port state packets arrive on
    pub state_port: u16,
    /// Per-attempt response timeout
    pub response_timeout: Duration,
    /// Attempts per control command
    pub retry_count: u32,
    /// Minimum gap between two commands
    pub time_between_commands: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: protocol::TELLO_IP.into(),
            control_port: protocol::CONTROL_PORT,
            state_port: protocol::STATE_PORT,
            response_timeout: protocol::RESPONSE_TIMEOUT,
            retry_count: protocol::RETRY_COUNT,
            time_between_commands: protocol::TIME_BETWEEN_COMMANDS,
        }
    }
}

/// Video processing parameters
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// Target frame width; frames of any other size are resized
    pub width: u32,
    /// Target frame height
    pub height: u32,
    /// Worker cadence in frames per second
    pub fps: u32,
    /// Attach timestamp, altitude and latest command to frames
    pub stamping: bool,
    /// Start streaming right after connecting
    pub stream_on_connect: bool,
    /// Start recording right after connecting
    pub record_on_connect: bool,
    /// Per-pixel luma difference counted as motion by the tracker
    pub tracker_threshold: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 720,
            fps: 30,
            stamping: false,
            stream_on_connect: false,
            record_on_connect: false,
            tracker_threshold: 32,
        }
    }
}

impl VideoConfig {
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Where the executor puts its artifacts
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub photo_dir: PathBuf,
    pub video_dir: PathBuf,
    /// File run by `run`/`load` without an argument
    pub default_command_file: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            photo_dir: PathBuf::new(),
            video_dir: PathBuf::new(),
            default_command_file: PathBuf::from(protocol::DEFAULT_COMMAND_FILE),
        }
    }
}

/// Complete pilot configuration
#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub connection: ConnectionConfig,
    pub video: VideoConfig,
    pub executor: ExecutorConfig,
    /// Speed (cm/s) applied after connecting
    pub default_speed: u32,
    /// Telemetry poll interval of the status monitor
    pub status_interval: Duration,
    /// Pause between runs of a repeating command
    pub repeat_delay: Duration,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            video: VideoConfig::default(),
            executor: ExecutorConfig::default(),
            default_speed: 100,
            status_interval: Duration::from_secs(5),
            repeat_delay: Duration::ZERO,
        }
    }
}

impl PilotConfig {
    /// Load from a settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Settings::load(path)?;
        Ok(Self::from_settings(&settings))
    }

    /// Build from parsed settings, keeping defaults for absent or invalid keys
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = PilotConfig::default();

        let connection = ConnectionConfig {
            host: settings
                .get("Host")
                .map(str::to_string)
                .unwrap_or(defaults.connection.host),
            retry_count: settings.get_or("RetryCount", defaults.connection.retry_count),
            response_timeout: settings
                .get_secs("ResponseTimeout")
                .unwrap_or(defaults.connection.response_timeout),
            ..defaults.connection
        };

        let video = VideoConfig {
            width: settings.get_or("Video.Width", defaults.video.width),
            height: settings.get_or("Video.Height", defaults.video.height),
            fps: settings.get_or("Video.Fps", defaults.video.fps),
            stamping: settings.get_bool("Video.Stamping", defaults.video.stamping),
            stream_on_connect: settings.get_bool("Video.Streaming", defaults.video.stream_on_connect),
            record_on_connect: settings.get_bool("Video.Recording", defaults.video.record_on_connect),
            tracker_threshold: settings
                .get_or("Video.TrackerThreshold", defaults.video.tracker_threshold),
        };

        let executor = ExecutorConfig {
            photo_dir: settings
                .get("DefaultPhotoFolder")
                .map(PathBuf::from)
                .unwrap_or(defaults.executor.photo_dir),
            video_dir: settings
                .get("DefaultVideoFolder")
                .map(PathBuf::from)
                .unwrap_or(defaults.executor.video_dir),
            ..defaults.executor
        };

        Self {
            connection,
            video,
            executor,
            default_speed: settings.get_or("DefaultSpeed", defaults.default_speed),
            status_interval: settings
                .get_secs("StatusUpdateInterval")
                .unwrap_or(defaults.status_interval),
            repeat_delay: settings
                .get_secs("DelayForContinuousCommands")
                .unwrap_or(defaults.repeat_delay),
        }
    }
}

/// Raw `key=value` settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut values: HashMap<String, String> = HashMap::new();
        let mut last_key: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // A separator at index 0 or 1 does not make a key
            match line.find('=') {
                Some(index) if index > 1 => {
                    let key = line[..index].to_string();
                    values.insert(key.clone(), line[index + 1..].to_string());
                    last_key = Some(key);
                }
                _ => match &last_key {
                    Some(key) => {
                        if let Some(value) = values.get_mut(key) {
                            value.push_str(line);
                        }
                    }
                    None => warn!("Invalid setting: {}", line),
                },
            }
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse a value, falling back to `default` when missing or invalid
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => match raw.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!("Invalid value for {}: {}", key, raw);
                    default
                }
            },
            None => default,
        }
    }

    /// Booleans accept `1`, `true` and `yes`; anything else is false
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
            None => default,
        }
    }

    /// Fractional seconds
    pub fn get_secs(&self, key: &str) -> Option<Duration> {
        let raw = self.get(key)?;
        match raw.trim().parse::<f64>().ok().and_then(|s| Duration::try_from_secs_f64(s).ok()) {
            Some(duration) => Some(duration),
            None => {
                warn!("Invalid duration for {}: {}", key, raw);
                None
            }
        }
    }
}
