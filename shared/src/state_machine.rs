//! Request Lifecycle State Machine
//!
//! Defines the valid transitions of a single in-flight request:
//! ```text
//! Sent -> Acknowledged* -> Resolved(..)
//! ```
//! `Resolved` is terminal; every event arriving afterwards is rejected.

use std::fmt;

/// Final outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Device reported success
    Success,
    /// Device reported an application error
    Error,
    /// Device declared a timeout
    RemoteTimeout,
    /// Caller stopped waiting
    LocalTimeout,
    /// Connection went away before a terminal reply
    ConnectionClosed,
    /// Non-blocking caller released on the first acknowledgement
    Accepted,
}

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Sent,
    Acknowledged,
    Resolved(Resolution),
}

impl RequestState {
    pub fn is_resolved(self) -> bool {
        matches!(self, RequestState::Resolved(_))
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// A `pending` reply arrived
    Acknowledged,
    /// A terminal outcome was reached
    Resolved(Resolution),
}

/// Result of a state transition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(RequestState),
    /// Transition was invalid from current state
    Invalid { from: RequestState, event: RequestEvent },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

impl fmt::Display for TransitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionResult::Success(state) => write!(f, "-> {:?}", state),
            TransitionResult::Invalid { from, event } => {
                write!(f, "invalid event {:?} in state {:?}", event, from)
            }
        }
    }
}

/// State machine tracking one request
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    current_state: RequestState,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    /// Create a new lifecycle in the Sent state
    pub fn new() -> Self {
        Self {
            current_state: RequestState::Sent,
        }
    }

    /// Get current state
    pub fn state(&self) -> RequestState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: RequestEvent) -> TransitionResult {
        match self.get_next_state(event) {
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

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: RequestEvent) -> Option<RequestState> {
        use RequestState::*;

        match (self.current_state, event) {
            (Resolved(_), _) => None,

            // Repeated acknowledgements are progress, not a new state
            (Sent | Acknowledged, RequestEvent::Acknowledged) => Some(Acknowledged),

            // Releasing a caller on acceptance only makes sense before any ack
            (Sent, RequestEvent::Resolved(Resolution::Accepted)) => {
                Some(Resolved(Resolution::Accepted))
            }
            (Acknowledged, RequestEvent::Resolved(Resolution::Accepted)) => None,

            (Sent | Acknowledged, RequestEvent::Resolved(resolution)) => {
                Some(Resolved(resolution))
            }
        }
    }
}
