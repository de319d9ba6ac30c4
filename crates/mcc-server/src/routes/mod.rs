//! HTTP routes.

mod auth;
mod calendar;
mod gateway;
mod memory;
mod overview;
mod skills;

use crate::audit::{AuditError, AuditStore, Outcome};
use crate::auth::SessionAuth;
use crate::config::Paths;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use mcc_gateway::{GatewayClient, GatewayError};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub gateway: GatewayClient,
    pub audit: Arc<AuditStore>,
    pub paths: Arc<Paths>,
    /// Set when `/api` requires a login session.
    pub auth: Option<Arc<SessionAuth>>,
}

impl AppState {
    /// Append to the audit log without blocking the runtime. Failures are
    /// logged, never returned.
    pub async fn audit(
        &self,
        action: &'static str,
        target: impl Into<String>,
        outcome: Outcome,
        detail: Option<String>,
    ) {
        let audit = self.audit.clone();
        let target = target.into();
        let write =
            tokio::task::spawn_blocking(move || audit.record(action, &target, outcome, detail.as_deref()));
        if let Err(err) = write.await {
            tracing::error!(action, %err, "audit write task failed");
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut api: Router<AppState> = Router::new();
    if state.auth.is_some() {
        api = api.route("/api/auth/login", post(auth::login));
    }
    api.route("/api/health", get(gateway::health))
        .route("/api/gateway/status", get(gateway::status))
        .route("/api/gateway/events", get(gateway::events))
        .route("/api/gateway/restart", post(gateway::restart))
        .route("/api/gateway/rpc", post(gateway::rpc))
        .route("/api/audit", get(gateway::audit_log))
        .route("/api/overview", get(overview::overview))
        .route("/api/overview/agents/{agent_id}", get(overview::agent_sessions))
        .route(
            "/api/overview/sessions/{session_key}/history",
            get(overview::session_history),
        )
        .route(
            "/api/calendar/cron",
            get(calendar::list)
                .post(calendar::add)
                .patch(calendar::update_from_body),
        )
        .route("/api/calendar/cron/{id}", patch(calendar::update))
        .route("/api/calendar/cron/{id}/run", post(calendar::run))
        .route("/api/calendar/cron/{id}/runs", get(calendar::runs))
        .route(
            "/api/memory/search",
            get(memory::search_query).post(memory::search_body),
        )
        .route(
            "/api/memory/export",
            get(memory::export_query).post(memory::export_body),
        )
        .route(
            "/api/memory/import",
            get(memory::import_usage).post(memory::import),
        )
        .route(
            "/api/memory/clear",
            get(memory::clear_usage).post(memory::clear),
        )
        .route("/api/skills", get(skills::list))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_session))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Error responses. Always a JSON object with an `error` field.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    /// No valid console session.
    #[error("Auth required")]
    AuthRequired,
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// An upstream call failed. `status` applies unless the credential was
    /// rejected, which is always 401.
    #[error("{}", gateway_message(.context, .source))]
    Gateway {
        status: StatusCode,
        context: Option<&'static str>,
        source: GatewayError,
    },
    #[error("{0}")]
    Internal(String),
}

fn gateway_message(context: &Option<&'static str>, source: &GatewayError) -> String {
    match context {
        Some(context) => format!("{context}: {source}"),
        None => source.to_string(),
    }
}

impl ApiError {
    /// 502 for a failed read.
    pub fn upstream(source: GatewayError) -> Self {
        Self::Gateway {
            status: StatusCode::BAD_GATEWAY,
            context: None,
            source,
        }
    }

    /// 400 for a failed mutation.
    pub fn rejected(source: GatewayError) -> Self {
        Self::Gateway {
            status: StatusCode::BAD_REQUEST,
            context: None,
            source,
        }
    }

    /// Prefix the message of a gateway error.
    pub fn context(self, context: &'static str) -> Self {
        match self {
            Self::Gateway { status, source, .. } => Self::Gateway {
                status,
                context: Some(context),
                source,
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AuthRequired | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Gateway { source, .. } if source.is_unauthorized() => StatusCode::UNAUTHORIZED,
            Self::Gateway { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::upstream(err)
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "error": self.to_string() });
        // Only a rejected gateway credential is fixed by reconnecting.
        if status == StatusCode::UNAUTHORIZED && matches!(self, Self::Gateway { .. }) {
            body["reauthenticate"] = Value::Bool(true);
        }
        (status, Json(body)).into_response()
    }
}

/// A numeric query parameter, if present.
fn query_number<T: FromStr>(params: &HashMap<String, String>, key: &str) -> Result<Option<T>, ApiError> {
    params
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("{key} must be a number")))
        })
        .transpose()
}

/// Parse a JSON request body; an empty body reads as `{}`.
fn json_body(bytes: &Bytes) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}
