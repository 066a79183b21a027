//! Continuous commands
//!
//! Re-executes a command until told to stop, e.g. while a movement key is
//! held down.

use super::CommandExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct Repetition {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

pub struct CommandRepeater {
    executor: Arc<CommandExecutor>,
    delay: Duration,
    running: Mutex<HashMap<String, Repetition>>,
}

impl CommandRepeater {
    pub fn new(executor: Arc<CommandExecutor>, delay: Duration) -> Self {
        Self {
            executor,
            delay,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Start repeating `command`; false if it already repeats
    pub async fn start(&self, command: &str) -> bool {
        let mut running = self.running.lock().await;
        if running.get(command).is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let executor = self.executor.clone();
        let delay = self.delay;
        let text = command.to_string();

        let task = tokio::spawn(async move {
            let mut runs = 0u64;
            while !*stop_rx.borrow() {
                executor.execute(&text).await;
                runs += 1;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("Command '{}' repeated {} times", text, runs);
            runs
        });

        running.insert(command.to_string(), Repetition { stop_tx, task });
        true
    }

    /// Stop repeating `command` and wait for the current run to finish;
    /// returns how often it ran
    pub async fn stop(&self, command: &str) -> Option<u64> {
        let repetition = self.running.lock().await.remove(command)?;
        finish(command, repetition).await
    }

    pub async fn is_running(&self, command: &str) -> bool {
        self.running
            .lock()
            .await
            .get(command)
            .is_some_and(|r| !r.task.is_finished())
    }

    pub async fn stop_all(&self) {
        let drained: Vec<(String, Repetition)> = self.running.lock().await.drain().collect();
        for (command, repetition) in drained {
            finish(&command, repetition).await;
        }
    }
}

async fn finish(command: &str, repetition: Repetition) -> Option<u64> {
    let _ = repetition.stop_tx.send(true);
    match repetition.task.await {
        Ok(runs) => Some(runs),
        Err(e) => {
            warn!("Repeating '{}' ended abnormally: {}", command, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandDispatcher, CommandLog};
    use crate::config::{ConnectionConfig, ExecutorConfig, VideoConfig};
    use crate::transport::fake::ScriptedTransport;
    use crate::video::{NullPreview, VideoWorker};

    fn repeater(transport: Arc<ScriptedTransport>) -> CommandRepeater {
        let log = Arc::new(CommandLog::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            transport.clone(),
            log.clone(),
            &ConnectionConfig::default(),
        ));
        let worker = Arc::new(VideoWorker::new(
            transport,
            &VideoConfig::default(),
            log.latest_command(),
            Arc::new(NullPreview),
        ));
        let executor = Arc::new(CommandExecutor::new(
            dispatcher,
            worker,
            log,
            ExecutorConfig::default(),
        ));
        CommandRepeater::new(executor, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_repeats_until_stopped() {
        let transport = Arc::new(ScriptedTransport::new());
        let repeater = repeater(transport.clone());

        assert!(repeater.start("forward 20").await);
        assert!(!repeater.start("forward 20").await);
        assert!(repeater.is_running("forward 20").await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let runs = repeater.stop("forward 20").await.expect("runs");
        assert!(runs >= 2, "ran {} times", runs);
        assert!(!repeater.is_running("forward 20").await);

        let sent = transport.sent();
        assert_eq!(sent.len() as u64, runs);
        assert!(sent.iter().all(|c| c == "forward 20"));
    }

    #[tokio::test]
    async fn test_stop_unknown_command() {
        let repeater = repeater(Arc::new(ScriptedTransport::new()));
        assert_eq!(repeater.stop("cw 90").await, None);
    }

    #[tokio::test]
    async fn test_stop_all() {
        let repeater = repeater(Arc::new(ScriptedTransport::new()));
        repeater.start("cw 10").await;
        repeater.start("ccw 10").await;
        repeater.stop_all().await;
        assert!(!repeater.is_running("cw 10").await);
        assert!(!repeater.is_running("ccw 10").await);
    }
}
