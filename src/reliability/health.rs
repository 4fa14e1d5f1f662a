use crate::sender::ConnectionState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => HealthStatus::Healthy,
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Backoff => HealthStatus::Degraded,
            ConnectionState::Closed => HealthStatus::Unhealthy,
        }
    }
}
