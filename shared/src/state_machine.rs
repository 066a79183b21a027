//! Flight State Machine
//!
//! Tracks whether the drone is airborne from the commands it acknowledged.
//! The drone does not report this directly; a `takeoff` answered with `ok`
//! is the only reliable signal.

use crate::command::{classify_response, ResponseClass};

/// Coarse flight state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlightState {
    #[default]
    Grounded,
    Airborne,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEvent {
    /// `takeoff` acknowledged
    TakeoffAcknowledged,
    /// `land` acknowledged
    LandAcknowledged,
    /// `emergency` acknowledged (motors cut)
    Emergency,
    /// The drone landed on its own and reported `error auto land`
    AutoLanded,
}

impl FlightEvent {
    /// Derive the event, if any, implied by a command and its response
    pub fn from_exchange(command: &str, response: &str) -> Option<Self> {
        let command = command.trim().to_lowercase();
        match classify_response(response) {
            ResponseClass::Ok => match command.as_str() {
                "takeoff" => Some(FlightEvent::TakeoffAcknowledged),
                "land" => Some(FlightEvent::LandAcknowledged),
                "emergency" => Some(FlightEvent::Emergency),
                _ => None,
            },
            ResponseClass::Fatal if response.to_lowercase().contains("error auto land") => {
                Some(FlightEvent::AutoLanded)
            }
            _ => None,
        }
    }
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed, for idempotent events)
    Success(FlightState),
    /// Transition was invalid from current state
    Invalid { from: FlightState, event: FlightEvent },
}

#[derive(Debug, Default)]
pub struct FlightStateMachine {
    current_state: FlightState,
}

impl FlightStateMachine {
    /// Create a new state machine in the grounded state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlightState {
        self.current_state
    }

    pub fn is_airborne(&self) -> bool {
        self.current_state == FlightState::Airborne
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: FlightEvent) -> TransitionResult {
        use FlightEvent::*;
        use FlightState::*;

        // Anything that stops the motors grounds the drone
        if matches!(event, Emergency | AutoLanded) {
            self.current_state = Grounded;
            return TransitionResult::Success(Grounded);
        }

        let next = match (self.current_state, event) {
            (Grounded, TakeoffAcknowledged) => Some(Airborne),
            (Airborne, LandAcknowledged) => Some(Grounded),
            // A repeated ack after a lost response is harmless
            (Airborne, TakeoffAcknowledged) => Some(Airborne),
            _ => None,
        };

        match next {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Feed a command/response exchange; returns the transition if one applied
    pub fn observe_exchange(&mut self, command: &str, response: &str) -> Option<TransitionResult> {
        FlightEvent::from_exchange(command, response).map(|event| self.process_event(event))
    }
}
