//! Core types for the Mission Control gateway.
//!
//! This crate holds the pieces that need no I/O: the connection state and its
//! status projection, the reconnect backoff policy, the error taxonomy, the
//! outbound request shapes and the tolerant decoding of tool responses.
//! The `mcc-gateway` crate drives them against a live upstream.

pub mod backoff;
mod envelope;
mod error;
mod request;
mod status;

pub use backoff::Backoff;
pub use envelope::{
    DETAIL_LIMIT, bounded, extract_detail, parse_structured, unwrap_rpc_response,
    unwrap_tool_response,
};
pub use error::{ErrorKind, GatewayError};
pub use request::{RpcRequest, ToolRequest};
pub use status::{ConnectionStatus, epoch_millis};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle state of the upstream stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Stopped, or making the very first connect attempt.
    #[default]
    Disconnected,
    /// Waiting on the backoff timer or retrying a dropped stream.
    Reconnecting,
    /// Stream handshake accepted.
    Connected,
    /// Upstream rejected the credential. No automatic recovery.
    Unauthorized,
}

impl ConnectionState {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Connected => "connected",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
