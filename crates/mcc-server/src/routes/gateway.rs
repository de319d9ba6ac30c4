//! Health, gateway connection control and the audit log.

use super::{ApiError, AppState, json_body, query_number};
use crate::audit::{AuditRecord, Outcome};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{SecondsFormat, Utc};
use futures_util::Stream;
use mcc_gateway::ConnectionStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

pub async fn health() -> Json<Value> {
    Json(json!({
        "ok": true,
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<ConnectionStatus> {
    Json(state.gateway.status())
}

/// Server-sent `status` events: the current snapshot, then one per transition.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    // Subscribe before sampling so no transition falls in between.
    let rx = state.gateway.subscribe_state();
    let current = state.gateway.status();

    let stream = futures_util::stream::unfold((Some(current), rx), |(pending, mut rx)| async move {
        if let Some(status) = pending {
            return Some((Ok(status_event(&status)), (None, rx)));
        }
        loop {
            match rx.recv().await {
                Ok(status) => return Some((Ok(status_event(&status)), (None, rx))),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "status event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn status_event(status: &ConnectionStatus) -> Event {
    Event::default()
        .event("status")
        .json_data(status)
        .unwrap_or_else(|err| {
            tracing::warn!(%err, "failed to encode status event");
            Event::default().comment("status unavailable")
        })
}

/// Stop and start the gateway connection with a fresh retry count.
pub async fn restart(State(state): State<AppState>) -> Json<ConnectionStatus> {
    state.gateway.stop();
    state.gateway.start();
    let status = state.gateway.status();
    tracing::info!(state = %status.state, "gateway connection restarted");
    state
        .audit("gateway.restart", "gateway", Outcome::Success, None)
        .await;
    Json(status)
}

#[derive(Debug, Deserialize)]
struct RpcBody {
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Value,
}

/// Forward a raw RPC call. Audited.
pub async fn rpc(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let body: RpcBody = serde_json::from_value(json_body(&body)?)
        .map_err(|e| ApiError::BadRequest(format!("invalid rpc request: {e}")))?;
    let method = body.method.trim();
    if method.is_empty() {
        return Err(ApiError::BadRequest("Missing method".into()));
    }

    match state.gateway.call(method, body.params).await {
        Ok(out) => {
            state
                .audit("gateway.rpc", method, Outcome::Success, None)
                .await;
            Ok(Json(out))
        }
        Err(err) => {
            state
                .audit("gateway.rpc", method, Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::upstream(err))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditPage {
    items: Vec<AuditRecord>,
}

pub async fn audit_log(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AuditPage>, ApiError> {
    let limit: usize = query_number(&params, "limit")?.unwrap_or(200);
    let audit = state.audit.clone();
    let items = tokio::task::spawn_blocking(move || audit.list(limit))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(AuditPage { items }))
}
