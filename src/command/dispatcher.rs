//! Command dispatcher - retry and response classification
//!
//! Control commands are retried until the drone acknowledges them, answers
//! with a fatal marker, or the attempt budget runs out. Read commands (`?`)
//! get a single exchange and their raw response. A single lock keeps one
//! command in flight across every caller.

use super::{CommandEvent, CommandObserver};
use crate::config::ConnectionConfig;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tello_shared::{classify_response, Command, CommandOutcome, ResponseClass, TransportError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Last response reported when no attempt was made
const NO_ATTEMPTS: &str = "max retries exceeded";

pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    observer: Arc<dyn CommandObserver>,
    timeout: Duration,
    max_attempts: u32,
    in_flight: Mutex<()>,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        observer: Arc<dyn CommandObserver>,
        config: &ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            observer,
            timeout: config.response_timeout,
            max_attempts: config.retry_count,
            in_flight: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build a command carrying the configured timeout and retry count
    pub fn command(&self, text: &str) -> Command {
        Command::new(text)
            .with_timeout(self.timeout)
            .with_max_attempts(self.max_attempts)
    }

    /// Send a control command with the configured policy
    pub async fn send_control(&self, text: &str) -> CommandOutcome {
        self.send(&self.command(text)).await
    }

    /// Send a control command, retrying per its policy
    pub async fn send(&self, command: &Command) -> CommandOutcome {
        let _guard = self.in_flight.lock().await;
        let text = command.text.as_str();
        let mut last_response = NO_ATTEMPTS.to_string();

        for attempt in 1..=command.max_attempts {
            self.observer.on_event(&CommandEvent::Attempt {
                command: text.to_string(),
                attempt,
                max_attempts: command.max_attempts,
            });
            if attempt == 1 {
                info!("Sending command: {}", text);
            } else {
                debug!("Retrying '{}' (attempt {}/{})", text, attempt, command.max_attempts);
            }

            let response = match self
                .transport
                .send_command_with_response(text, command.timeout)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    debug!("Attempt {} of '{}' failed: {}", attempt, text, e);
                    last_response = e.to_string();
                    self.observer.on_event(&CommandEvent::AttemptFailed {
                        command: text.to_string(),
                        attempt,
                        error: last_response.clone(),
                    });
                    continue;
                }
            };

            self.observer.on_event(&CommandEvent::Response {
                command: text.to_string(),
                response: response.clone(),
            });

            match classify_response(&response) {
                ResponseClass::Ok => {
                    info!("Response to '{}': {}", text, response);
                    return self.finish(text, CommandOutcome::Success);
                }
                ResponseClass::Fatal => {
                    error!("Command '{}' was unsuccessful: {}", text, response);
                    return self.finish(text, CommandOutcome::RejectedFatal { reason: response });
                }
                ResponseClass::Retry => {
                    debug!("Command '{}' was unsuccessful: {}", text, response);
                    last_response = response;
                }
            }
        }

        warn!(
            "Command '{}' failed after {} attempts: {}",
            text, command.max_attempts, last_response
        );
        self.finish(text, CommandOutcome::ExhaustedRetries { last_response })
    }

    /// Single exchange returning the raw response
    pub async fn send_read(&self, text: &str) -> Result<String, TransportError> {
        let _guard = self.in_flight.lock().await;
        self.observer.on_event(&CommandEvent::Attempt {
            command: text.to_string(),
            attempt: 1,
            max_attempts: 1,
        });
        info!("Sending query: {}", text);

        let response = self
            .transport
            .send_command_with_response(text, self.timeout)
            .await?;

        info!("Response to '{}': {}", text, response);
        self.observer.on_event(&CommandEvent::Response {
            command: text.to_string(),
            response: response.clone(),
        });
        Ok(response)
    }

    /// Fire-and-forget send
    pub async fn send_without_response(&self, text: &str) -> Result<(), TransportError> {
        let _guard = self.in_flight.lock().await;
        self.observer.on_event(&CommandEvent::Attempt {
            command: text.to_string(),
            attempt: 1,
            max_attempts: 1,
        });
        debug!("Sending without response: {}", text);
        self.transport.send_command_without_response(text).await
    }

    fn finish(&self, text: &str, outcome: CommandOutcome) -> CommandOutcome {
        self.observer.on_event(&CommandEvent::Outcome {
            command: text.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::ScriptedTransport;
    use std::sync::Mutex as StdMutex;

    struct Recorder(StdMutex<Vec<CommandEvent>>);

    impl CommandObserver for Recorder {
        fn on_event(&self, event: &CommandEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn attempts(&self) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, CommandEvent::Attempt { .. }))
                .count()
        }
    }

    fn dispatcher(transport: Arc<ScriptedTransport>) -> (CommandDispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let dispatcher =
            CommandDispatcher::new(transport, recorder.clone(), &ConnectionConfig::default());
        (dispatcher, recorder)
    }

    #[tokio::test]
    async fn test_ok_succeeds_on_first_attempt() {
        let transport = Arc::new(ScriptedTransport::new().with_responses(["OK"]));
        let (dispatcher, recorder) = dispatcher(transport.clone());

        assert_eq!(dispatcher.send_control("takeoff").await, CommandOutcome::Success);
        assert_eq!(transport.sent(), vec!["takeoff"]);
        assert_eq!(recorder.attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_ok() {
        let transport = Arc::new(ScriptedTransport::new().with_responses(["error", "error", "ok"]));
        let (dispatcher, _) = dispatcher(transport.clone());

        assert_eq!(dispatcher.send_control("forward 50").await, CommandOutcome::Success);
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_marker_stops_immediately() {
        let transport = Arc::new(ScriptedTransport::new().with_responses(["error auto land", "ok"]));
        let (dispatcher, recorder) = dispatcher(transport.clone());

        let outcome = dispatcher.send_control("up 20").await;
        assert_eq!(
            outcome,
            CommandOutcome::RejectedFatal {
                reason: "error auto land".into()
            }
        );
        assert_eq!(transport.sent().len(), 1);
        assert!(recorder.0.lock().unwrap().iter().any(|e| matches!(
            e,
            CommandEvent::Outcome {
                outcome: CommandOutcome::RejectedFatal { .. },
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::new().with_script([
            ScriptedTransport::timeout("land"),
            ScriptedTransport::timeout("land"),
            ScriptedTransport::timeout("land"),
        ]));
        let (dispatcher, recorder) = dispatcher(transport.clone());

        match dispatcher.send_control("land").await {
            CommandOutcome::ExhaustedRetries { last_response } => {
                assert!(last_response.contains("Aborting command 'land'"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(transport.sent().len(), 3);

        // every failed attempt reaches the observer
        let failed: Vec<u32> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                CommandEvent::AttemptFailed { attempt, error, .. } => {
                    assert!(error.contains("'land'"));
                    Some(*attempt)
                }
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_attempt_then_ok() {
        let transport = Arc::new(ScriptedTransport::new().with_script([
            ScriptedTransport::timeout("cw 90"),
            Ok("ok".to_string()),
        ]));
        let (dispatcher, recorder) = dispatcher(transport);

        assert_eq!(dispatcher.send_control("cw 90").await, CommandOutcome::Success);
        let events = recorder.0.lock().unwrap().clone();
        assert!(matches!(
            &events[1],
            CommandEvent::AttemptFailed { attempt: 1, .. }
        ));
        assert!(matches!(&events[3], CommandEvent::Response { response, .. } if response == "ok"));
    }

    #[tokio::test]
    async fn test_zero_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        let (dispatcher, _) = dispatcher(transport.clone());

        let outcome = dispatcher.send(&Command::new("land").with_max_attempts(0)).await;
        assert_eq!(
            outcome,
            CommandOutcome::ExhaustedRetries {
                last_response: "max retries exceeded".into()
            }
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_read_is_not_retried_or_classified() {
        let transport = Arc::new(ScriptedTransport::new().with_responses(["error", "ok"]));
        let (dispatcher, _) = dispatcher(transport.clone());

        assert_eq!(dispatcher.send_read("battery?").await, Ok("error".to_string()));
        assert_eq!(transport.sent(), vec!["battery?"]);
    }

    #[tokio::test]
    async fn test_read_timeout_is_an_error() {
        let transport = Arc::new(ScriptedTransport::new().with_script([ScriptedTransport::timeout("speed?")]));
        let (dispatcher, _) = dispatcher(transport);

        assert!(matches!(
            dispatcher.send_read("speed?").await,
            Err(TransportError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_one_command_in_flight() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(20)));
        let (dispatcher, _) = dispatcher(transport.clone());
        let dispatcher = Arc::new(dispatcher);

        let mut tasks = Vec::new();
        for i in 0..4 {
            let dispatcher = dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.send_control(&format!("cw {}", i + 1)).await
            }));
        }
        let read = dispatcher.send_read("battery?");
        let unanswered = dispatcher.send_without_response("rc 0 0 0 0");
        let (read, unanswered) = tokio::join!(read, unanswered);
        assert!(read.is_ok());
        assert!(unanswered.is_ok());

        for task in tasks {
            assert!(task.await.expect("join").is_success());
        }
        assert_eq!(transport.max_in_flight(), 1);
        assert_eq!(transport.sent().len(), 5);
    }
}
