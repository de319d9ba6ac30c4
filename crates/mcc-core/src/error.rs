//! Gateway error taxonomy.

/// Coarse classification of a [`GatewayError`], for callers that only need
/// to decide how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upstream down, connect failed, or a non-auth error status.
    Transient,
    /// Credential missing or rejected.
    AuthRejected,
    /// Upstream accepted the request but reported a domain failure.
    ToolFailed,
    /// A payload could not be decoded where decoding was required.
    Malformed,
}

/// Error returned by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced an HTTP response.
    #[error("gateway unreachable: {0}")]
    Transport(String),
    /// Non-success status other than 401/403.
    #[error("gateway request failed ({status}){}", detail_suffix(.detail))]
    RequestFailed { status: u16, detail: Option<String> },
    /// 401/403, a rejected stream handshake, or the known unauthorized state.
    #[error("gateway unauthorized{}", status_suffix(.status))]
    Unauthorized { status: Option<u16> },
    #[error("{0}")]
    ToolFailed(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::RequestFailed { .. } => ErrorKind::Transient,
            Self::Unauthorized { .. } => ErrorKind::AuthRejected,
            Self::ToolFailed(_) => ErrorKind::ToolFailed,
            Self::Malformed(_) => ErrorKind::Malformed,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::AuthRejected
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" ({s})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_detail() {
        let err = GatewayError::RequestFailed {
            status: 500,
            detail: Some("boom".into()),
        };
        assert_eq!(err.to_string(), "gateway request failed (500): boom");

        let err = GatewayError::RequestFailed {
            status: 502,
            detail: None,
        };
        assert_eq!(err.to_string(), "gateway request failed (502)");

        let err = GatewayError::Unauthorized { status: Some(403) };
        assert_eq!(err.to_string(), "gateway unauthorized (403)");
    }

    #[test]
    fn kinds() {
        assert_eq!(
            GatewayError::Transport("refused".into()).kind(),
            ErrorKind::Transient
        );
        assert!(GatewayError::Unauthorized { status: None }.is_unauthorized());
        assert_eq!(
            GatewayError::ToolFailed("x".into()).kind(),
            ErrorKind::ToolFailed
        );
    }
}
