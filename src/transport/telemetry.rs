//! Telemetry Reader
//!
//! Keeps the latest state packet and the acknowledged flight state, and
//! converts them to the scalar `Telemetry` snapshot.

use super::Telemetry;
use std::sync::Arc;
use tello_shared::{FlightStateMachine, TelloState, TransportError};
use tokio::sync::RwLock;
use tracing::debug;

pub struct TelemetryReader {
    /// Latest decoded state packet
    state: Arc<RwLock<Option<TelloState>>>,
    /// Flight state derived from acknowledged commands
    flight: Arc<RwLock<FlightStateMachine>>,
}

impl TelemetryReader {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
            flight: Arc::new(RwLock::new(FlightStateMachine::new())),
        }
    }

    /// Decode a state datagram and keep it if valid
    pub async fn process_packet(&self, buf: &[u8]) {
        match TelloState::decode(buf) {
            Ok(state) => {
                *self.state.write().await = Some(state);
            }
            Err(e) => debug!("Ignoring state packet: {}", e),
        }
    }

    /// Track takeoff/land acknowledgements
    pub async fn observe_exchange(&self, command: &str, response: &str) {
        if let Some(result) = self.flight.write().await.observe_exchange(command, response) {
            debug!("Flight state after '{}': {:?}", command, result);
        }
    }

    pub async fn is_airborne(&self) -> bool {
        self.flight.read().await.is_airborne()
    }

    pub async fn get_telemetry(&self) -> Result<Telemetry, TransportError> {
        let state = self.state.read().await.clone().ok_or(TransportError::NoState)?;
        Ok(Telemetry {
            battery: state.bat,
            height: state.h,
            temperature: state.temperature(),
            flight_time: state.time,
            speed: state.ground_speed(),
            airborne: self.is_airborne().await,
        })
    }
}

impl Default for TelemetryReader {
    fn default() -> Self {
        Self::new()
    }
}
