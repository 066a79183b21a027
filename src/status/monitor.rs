//! Status Monitor
//!
//! Runs a background task that polls telemetry every interval, publishes the
//! result on a watch channel, and warns when the battery becomes critical.

use crate::transport::{Telemetry, Transport};
use crate::video::{FlagSnapshot, VideoWorker};
use std::sync::Arc;
use std::time::Duration;
use tello_shared::{now_ms, protocol};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Latest known drone status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    /// `None` until the first state packet arrived
    pub telemetry: Option<Telemetry>,
    pub flags: FlagSnapshot,
    /// Telemetry was available on the last poll
    pub connected: bool,
    pub updated_at_ms: u64,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.telemetry {
            Some(t) if self.connected => write!(
                f,
                "battery {}% | height {} cm | temp {:.1} °C | flight {} s | speed {:.0} cm/s",
                t.battery, t.height, t.temperature, t.flight_time, t.speed
            )?,
            _ => write!(f, "no telemetry")?,
        }
        if self.flags.streaming {
            write!(f, " | streaming")?;
        }
        if self.flags.recording {
            write!(f, " | recording")?;
        }
        if self.flags.tracking {
            write!(f, " | tracking")?;
        }
        Ok(())
    }
}

/// Edge detector for the critical battery level
#[derive(Debug)]
struct BatteryWatch {
    critical: u32,
    low: bool,
}

impl BatteryWatch {
    fn new(critical: u32) -> Self {
        Self {
            critical,
            low: false,
        }
    }

    /// True only on the poll where the level first drops below critical
    fn update(&mut self, battery: u32) -> bool {
        let low = battery < self.critical;
        let newly_low = low && !self.low;
        self.low = low;
        newly_low
    }
}

pub struct StatusMonitor {
    transport: Arc<dyn Transport>,
    worker: Arc<VideoWorker>,
    poll_interval: Duration,
    battery: BatteryWatch,
}

impl StatusMonitor {
    pub fn new(transport: Arc<dyn Transport>, worker: Arc<VideoWorker>, poll_interval: Duration) -> Self {
        Self {
            transport,
            worker,
            poll_interval,
            battery: BatteryWatch::new(protocol::BATTERY_CRITICAL_PERCENT),
        }
    }

    /// Start polling; the first poll happens immediately
    pub fn start(mut self) -> StatusMonitorHandle {
        let (report_tx, report_rx) = watch::channel(StatusReport::default());
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.poll_interval.max(Duration::from_millis(1)));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                let report = self.poll().await;
                report_tx.send_replace(report);
            }

            info!("Status monitoring stopped");
        });

        StatusMonitorHandle {
            stop_tx,
            task,
            reports: report_rx,
        }
    }

    async fn poll(&mut self) -> StatusReport {
        let telemetry = match self.transport.telemetry().await {
            Ok(telemetry) => Some(telemetry),
            Err(e) => {
                debug!("Telemetry unavailable: {}", e);
                None
            }
        };

        if let Some(t) = &telemetry {
            if self.battery.update(t.battery) {
                warn!("Battery critical: {}%", t.battery);
            }
        }

        StatusReport {
            connected: telemetry.is_some(),
            telemetry,
            flags: self.worker.flags(),
            updated_at_ms: now_ms(),
        }
    }
}

/// Handle to read reports and stop monitoring
pub struct StatusMonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    reports: watch::Receiver<StatusReport>,
}

impl StatusMonitorHandle {
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.reports.clone()
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Status monitor task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LatestCommand;
    use crate::config::VideoConfig;
    use crate::transport::fake::ScriptedTransport;
    use crate::video::NullPreview;

    fn monitor(transport: Arc<ScriptedTransport>) -> StatusMonitor {
        let worker = Arc::new(VideoWorker::new(
            transport.clone(),
            &VideoConfig::default(),
            LatestCommand::new(),
            Arc::new(NullPreview),
        ));
        StatusMonitor::new(transport, worker, Duration::from_millis(10))
    }

    #[test]
    fn test_battery_warning_is_edge_triggered() {
        let mut watch = BatteryWatch::new(20);
        assert!(!watch.update(50));
        assert!(watch.update(19));
        assert!(!watch.update(18));
        assert!(!watch.update(25));
        assert!(watch.update(10));
    }

    #[tokio::test]
    async fn test_reports_are_published() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_battery(64);
        let handle = monitor(transport).start();
        let mut reports = handle.subscribe();

        reports.changed().await.expect("report");
        let report = reports.borrow().clone();
        assert!(report.connected);
        assert_eq!(report.telemetry.map(|t| t.battery), Some(64));
        assert!(report.to_string().starts_with("battery 64%"));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_reports_follow_battery() {
        let transport = Arc::new(ScriptedTransport::new());
        let handle = monitor(transport.clone()).start();

        transport.set_battery(15);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.subscribe().borrow().telemetry.map(|t| t.battery), Some(15));
        handle.stop().await;
    }

    #[test]
    fn test_display_without_telemetry() {
        let report = StatusReport {
            flags: FlagSnapshot {
                recording: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(report.to_string(), "no telemetry | recording");
    }
}
