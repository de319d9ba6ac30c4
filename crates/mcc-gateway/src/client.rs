//! The gateway client handle.

use crate::connection::Shared;
use crate::machine::Event;
use crate::{ConfigError, GatewayConfig};
use mcc_core::{
    ConnectionState, ConnectionStatus, GatewayError, RpcRequest, ToolRequest, extract_detail,
    parse_structured, unwrap_rpc_response, unwrap_tool_response,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Client for one upstream gateway.
///
/// Owns the background stream connection and issues request/response calls.
/// Cheap to clone; all clones share the same connection. Construct one per
/// process and pass it to whatever needs it.
#[derive(Clone)]
pub struct GatewayClient {
    shared: Arc<Shared>,
    http: reqwest::Client,
}

impl GatewayClient {
    /// Create a client. Nothing connects until [`start`](Self::start).
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            shared: Shared::new(config),
            http,
        })
    }

    /// Begin maintaining the stream connection. Idempotent while running;
    /// from `Unauthorized` it starts over with a fresh retry count.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        self.shared.dispatch(Event::Start);
    }

    /// Cancel any pending reconnect, close the stream, and go quiet until the
    /// next [`start`](Self::start). Safe to call from any context, any number
    /// of times.
    pub fn stop(&self) {
        self.shared.dispatch(Event::Stop);
    }

    /// Current connection snapshot. Never blocks on I/O.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Receive a snapshot on every state transition, in order.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.shared.subscribe_state()
    }

    /// Receive stream frames (as text) in receipt order.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<String> {
        self.shared.subscribe_messages()
    }

    pub fn config(&self) -> &GatewayConfig {
        self.shared.config()
    }

    /// Generic RPC: returns the body's `result` field, or the whole body.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let request = RpcRequest::new(method, params);
        let url = self.config().rpc_url();
        let body = self.post_json(&url, &request).await?;
        Ok(unwrap_rpc_response(body))
    }

    /// Invoke a named tool and normalize whatever envelope comes back.
    pub async fn invoke_tool(&self, name: &str, input: Value) -> Result<Value, GatewayError> {
        let request = ToolRequest::new(name, input);
        let url = self.config().invoke_url();
        let body = self.post_json(&url, &request).await?;
        unwrap_tool_response(body).inspect_err(|err| {
            tracing::warn!(tool = name, %err, "tool reported failure");
        })
    }

    async fn post_json<T: Serialize>(&self, url: &str, payload: &T) -> Result<Value, GatewayError> {
        if self.status().state == ConnectionState::Unauthorized {
            return Err(GatewayError::Unauthorized { status: None });
        }

        let mut request = self.http.post(url).json(payload);
        if let Some(token) = self.config().token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(url, err = %e, "gateway request failed to send");
            GatewayError::Transport(e.to_string())
        })?;
        let status = response.status();

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            tracing::warn!(url, %status, "gateway rejected credential");
            self.shared.dispatch(Event::CallUnauthorized);
            return Err(GatewayError::Unauthorized {
                status: Some(status.as_u16()),
            });
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(url, %err, "could not read gateway response body");
                String::new()
            }
        };

        if !status.is_success() {
            tracing::warn!(url, %status, "gateway request returned error status");
            return Err(GatewayError::RequestFailed {
                status: status.as_u16(),
                detail: extract_detail(&text),
            });
        }

        Ok(parse_structured(&text).unwrap_or_else(|err| {
            tracing::debug!(url, %err, "gateway response is not JSON, treating as empty");
            Value::Object(Map::new())
        }))
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.config().base_url)
            .field("status", &self.status())
            .finish()
    }
}
