//! Status projection for pollers.

use crate::ConnectionState;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Point-in-time view of the gateway connection.
///
/// Built fresh on every read. `connected_at` is set iff `state` is
/// [`ConnectionState::Connected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Epoch milliseconds of the transition into `Connected`.
    pub connected_at: Option<u64>,
    pub uptime_seconds: u64,
}

impl ConnectionStatus {
    /// Project a status from the machine's fields at time `now_ms`.
    pub fn project(state: ConnectionState, connected_at: Option<u64>, now_ms: u64) -> Self {
        let connected_at = match state {
            ConnectionState::Connected => connected_at,
            _ => None,
        };
        let uptime_seconds = connected_at
            .map(|at| now_ms.saturating_sub(at) / 1000)
            .unwrap_or(0);
        Self {
            state,
            connected_at,
            uptime_seconds,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::project(ConnectionState::Disconnected, None, 0)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
