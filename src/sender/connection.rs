use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

/// Lifecycle of the outbound connection. Owned by the delivery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    ConnectSucceeded,
    ConnectFailed,
    ConnectionLost,
    RetryScheduled,
    BackoffElapsed,
    Shutdown,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid transition: {event:?} in state {state}")]
pub struct InvalidTransition {
    pub state: ConnectionState,
    pub event: ConnectionEvent,
}

impl ConnectionState {
    /// The transition table. `Closed` is terminal; `Shutdown` is accepted
    /// from every other state.
    pub fn transition(self, event: ConnectionEvent) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::Closed, _) => Err(InvalidTransition { state: self, event }),
            (_, E::Shutdown) => Ok(S::Closed),
            (S::Disconnected, E::Start) => Ok(S::Connecting),
            (S::Disconnected, E::RetryScheduled) => Ok(S::Backoff),
            (S::Connecting, E::ConnectSucceeded) => Ok(S::Connected),
            (S::Connecting, E::ConnectFailed) => Ok(S::Backoff),
            (S::Connected, E::ConnectionLost) => Ok(S::Disconnected),
            (S::Backoff, E::BackoffElapsed) => Ok(S::Connecting),
            (state, event) => Err(InvalidTransition { state, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Backoff => 3,
            ConnectionState::Closed => 4,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Backoff,
            4 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff => "backoff",
            ConnectionState::Closed => "closed",
        })
    }
}

/// Lock-free published copy of the state for observers.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}
