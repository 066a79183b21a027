//! UDP transport for the Tello SDK
//!
//! Commands go to `host:8889` from a socket bound to the same port; the drone
//! answers each command with one datagram. State packets arrive unsolicited on
//! port 8890. Decoded video frames are published by an external decoder, or
//! by a [`super::FrameReplay`], through a [`FrameFeed`].

use super::{Telemetry, TelemetryReader, Transport};
use crate::config::ConnectionConfig;
use crate::video::Frame;
use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tello_shared::{classify_response, codec, ResponseClass, TransportError};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Handle an external video decoder uses to hand frames to the transport
#[derive(Clone, Default)]
pub struct FrameFeed {
    latest: Arc<ArcSwapOption<Frame>>,
}

impl FrameFeed {
    pub fn publish(&self, frame: Frame) {
        self.latest.store(Some(Arc::new(frame)));
    }

    pub(super) fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.load_full()
    }

    fn clear(&self) {
        self.latest.store(None);
    }
}

/// Control socket plus the time the last command left it
struct ControlChannel {
    socket: UdpSocket,
    last_sent: Option<Instant>,
}

pub struct UdpTransport {
    target: SocketAddr,
    time_between_commands: Duration,
    control: Mutex<ControlChannel>,
    telemetry: Arc<TelemetryReader>,
    frames: FrameFeed,
    stream_on: Mutex<bool>,
    #[cfg(test)]
    state_addr: SocketAddr,
    state_task: JoinHandle<()>,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind the standard local ports and target the configured drone
    pub async fn bind(config: &ConnectionConfig) -> Result<Self> {
        let control_local = SocketAddr::from(([0, 0, 0, 0], config.control_port));
        let state_local = SocketAddr::from(([0, 0, 0, 0], config.state_port));
        Self::bind_on(config, control_local, state_local).await
    }

    /// Bind explicit local addresses
    pub async fn bind_on(
        config: &ConnectionConfig,
        control_local: SocketAddr,
        state_local: SocketAddr,
    ) -> Result<Self> {
        let target = tokio::net::lookup_host((config.host.as_str(), config.control_port))
            .await
            .with_context(|| format!("Failed to resolve {}", config.host))?
            .next()
            .with_context(|| format!("No address for {}", config.host))?;

        let socket = UdpSocket::bind(control_local)
            .await
            .with_context(|| format!("Failed to bind control socket {}", control_local))?;
        let state_socket = UdpSocket::bind(state_local)
            .await
            .with_context(|| format!("Failed to bind state socket {}", state_local))?;
        let state_addr = state_socket.local_addr()?;

        let telemetry = Arc::new(TelemetryReader::new());
        let state_task = tokio::spawn(state_loop(state_socket, telemetry.clone()));

        info!("UDP transport targeting {} (state on {})", target, state_addr);

        Ok(Self {
            target,
            time_between_commands: config.time_between_commands,
            control: Mutex::new(ControlChannel {
                socket,
                last_sent: None,
            }),
            telemetry,
            frames: FrameFeed::default(),
            stream_on: Mutex::new(false),
            #[cfg(test)]
            state_addr,
            state_task,
            closed: AtomicBool::new(false),
        })
    }

    /// Feed for the video decoder
    pub fn frame_feed(&self) -> FrameFeed {
        self.frames.clone()
    }

    #[cfg(test)]
    pub fn state_addr(&self) -> SocketAddr {
        self.state_addr
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Wait out the minimum gap, then send
    async fn send_locked(&self, channel: &mut ControlChannel, command: &str) -> Result<(), TransportError> {
        if let Some(last) = channel.last_sent {
            let ready_at = last + self.time_between_commands;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        channel.socket.send_to(command.as_bytes(), self.target).await?;
        channel.last_sent = Some(Instant::now());
        Ok(())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.state_task.abort();
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_command_with_response(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.ensure_open()?;
        let mut channel = self.control.lock().await;

        // A response that arrived after its command timed out must not be
        // taken as the answer to this one
        let mut buf = [0u8; 1024];
        while let Ok((len, _)) = channel.socket.try_recv_from(&mut buf) {
            debug!("Discarding stale response: {}", String::from_utf8_lossy(&buf[..len]).trim());
        }

        self.send_locked(&mut channel, command).await?;

        let deadline = Instant::now() + timeout;
        let response = loop {
            let received = tokio::time::timeout_at(deadline, channel.socket.recv_from(&mut buf)).await;
            match received {
                Err(_) => {
                    return Err(TransportError::Timeout {
                        command: command.to_string(),
                        after: timeout,
                    })
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok((len, from))) if from.ip() == self.target.ip() => {
                    break String::from_utf8_lossy(&buf[..len]).trim().to_string();
                }
                Ok(Ok((_, from))) => debug!("Ignoring datagram from {}", from),
            }
        };
        drop(channel);

        self.telemetry.observe_exchange(command, &response).await;
        Ok(response)
    }

    async fn send_command_without_response(&self, command: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut channel = self.control.lock().await;
        self.send_locked(&mut channel, command).await
    }

    async fn pull_latest_frame(&self) -> Result<Frame, TransportError> {
        self.ensure_open()?;
        if !*self.stream_on.lock().await {
            return Err(TransportError::StreamOff);
        }
        self.frames
            .latest()
            .map(|frame| frame.as_ref().clone())
            .ok_or(TransportError::NoFrame)
    }

    async fn set_stream_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let mut stream_on = self.stream_on.lock().await;
        if *stream_on == enabled {
            return Ok(());
        }
        let command = if enabled { "streamon" } else { "streamoff" };
        let response = self
            .send_command_with_response(command, tello_shared::protocol::RESPONSE_TIMEOUT)
            .await?;
        if classify_response(&response) != ResponseClass::Ok {
            return Err(TransportError::Rejected {
                command: command.to_string(),
                response,
            });
        }
        *stream_on = enabled;
        if !enabled {
            self.frames.clear();
        }
        Ok(())
    }

    async fn telemetry(&self) -> Result<Telemetry, TransportError> {
        self.ensure_open()?;
        self.telemetry.get_telemetry().await
    }

    async fn is_airborne(&self) -> bool {
        self.telemetry.is_airborne().await
    }

    /// Stop the state listener; later calls fail with `Closed`
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state_task.abort();
            self.frames.clear();
            info!("UDP transport closed");
        }
    }

    fn name(&self) -> &'static str {
        "UDP"
    }
}

async fn state_loop(socket: UdpSocket, telemetry: Arc<TelemetryReader>) {
    let mut buf = vec![0u8; codec::MAX_PACKET_SIZE + 1];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, _)) => telemetry.process_packet(&buf[..len]).await,
            Err(e) => {
                warn!("State socket error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
