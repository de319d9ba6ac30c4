//! Gateway client configuration.

use mcc_core::Backoff;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the upstream gateway lives and how to authenticate to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL for request/response calls, e.g. `http://127.0.0.1:9471`.
    pub base_url: String,
    /// Event stream URL, e.g. `ws://127.0.0.1:9471/ws`.
    pub ws_url: String,
    /// Bearer token. Empty means no credential.
    pub token: Option<String>,
    pub rpc_path: String,
    pub invoke_path: String,
    pub request_timeout_secs: u64,
    #[serde(skip)]
    pub backoff: Backoff,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9471".to_string(),
            ws_url: "ws://127.0.0.1:9471/ws".to_string(),
            token: None,
            rpc_path: "/rpc".to_string(),
            invoke_path: "/tools/invoke".to_string(),
            request_timeout_secs: 15,
            backoff: Backoff::default(),
        }
    }
}

/// Invalid gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field} URL {value:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayConfig {
    /// Check both URLs parse and use the expected schemes.
    ///
    /// The stream is plain `ws`: the socket is built without a TLS stack, so
    /// a `wss` URL would fail every attempt and retry forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("base", &self.base_url, &["http", "https"])?;
        check_url("stream", &self.ws_url, &["ws"])?;
        Ok(())
    }

    /// The credential, if one is configured.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn rpc_url(&self) -> String {
        join(&self.base_url, &self.rpc_path)
    }

    pub fn invoke_url(&self) -> String {
        join(&self.base_url, &self.invoke_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn check_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!("expected scheme {}", schemes.join("/"))));
    }
    Ok(())
}

fn join(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
