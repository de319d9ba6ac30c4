//! Memory search through the gateway, with a local markdown fallback, plus
//! export, import and clearing of the workspace's markdown memory.

use super::{ApiError, AppState, json_body, query_number};
use crate::audit::Outcome;
use crate::markdown::{self, ClearTarget, MemoryItem};
use crate::normalize;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

const DEFAULT_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 50;
const EXPORT_SOURCE: &str = "openclaw-markdown-memory";
const CLEAR_PHRASE: &str = "CLEAR MEMORY";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

impl SearchRequest {
    fn validate(self) -> Result<Self, ApiError> {
        if self.query.is_empty() {
            return Err(ApiError::BadRequest("query is required".into()));
        }
        if self
            .max_results
            .is_some_and(|n| !(1..=MAX_RESULTS).contains(&n))
        {
            return Err(ApiError::BadRequest(format!(
                "maxResults must be between 1 and {MAX_RESULTS}"
            )));
        }
        Ok(self)
    }

    fn limit(&self) -> u32 {
        self.max_results.unwrap_or(DEFAULT_RESULTS)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    results: Vec<Value>,
    provider: Value,
    mode: Value,
    warnings: Vec<String>,
    upstream_error: Option<String>,
}

pub async fn search_query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let max_results = query_number(&params, "maxResults")?;
    let request = SearchRequest {
        query: params.get("query").cloned().unwrap_or_default(),
        max_results,
    };
    run_search(&state, request.validate()?).await
}

pub async fn search_body(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: SearchRequest = serde_json::from_value(json_body(&body)?)
        .map_err(|e| ApiError::BadRequest(format!("invalid search request: {e}")))?;
    run_search(&state, request.validate()?).await
}

async fn run_search(state: &AppState, request: SearchRequest) -> Result<Response, ApiError> {
    let limit = request.limit();
    let args = json!({"query": request.query, "maxResults": limit});

    let mut upstream_error = None;
    let mut gateway_out = Value::Null;
    let mut results = Vec::new();
    match state.gateway.invoke_tool("memory_search", args).await {
        Ok(out) => {
            results = normalize::search_results(&out);
            gateway_out = out;
        }
        Err(err) => upstream_error = Some(err.to_string()),
    }

    let mut fallback_used = false;
    if results.is_empty() {
        let paths = state.paths.clone();
        let query = request.query.clone();
        let hits = tokio::task::spawn_blocking(move || markdown::search(&paths, &query, limit as usize))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !hits.is_empty() {
            fallback_used = true;
            results = hits
                .into_iter()
                .filter_map(|hit| serde_json::to_value(hit).ok())
                .collect();
        }
    }

    let mut warnings = Vec::new();
    if let Some(err) = &upstream_error {
        tracing::warn!(%err, "memory_search failed");
        warnings.push(format!("memory_search failed: {err}"));
    }
    if fallback_used {
        warnings.push("Using local markdown fallback results.".to_string());
    }

    let reported = |key: &str, fallback: &str, default: &str| {
        gateway_out
            .get(key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from(if fallback_used { fallback } else { default }))
    };
    let status = if upstream_error.is_some() && results.is_empty() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    let response = SearchResponse {
        provider: reported("provider", markdown::SOURCE, "unknown"),
        mode: reported("mode", "local-fallback", "gateway"),
        results,
        warnings,
        upstream_error,
    };
    Ok((status, Json(response)).into_response())
}

/// Run filesystem work off the async runtime.
async fn blocking<T: Send + 'static>(
    work: impl FnOnce() -> std::io::Result<T> + Send + 'static,
) -> Result<std::io::Result<T>, ApiError> {
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    all: bool,
}

impl ExportRequest {
    fn target(self) -> String {
        self.agent_id
            .unwrap_or_else(|| if self.all { "all" } else { "default" }.to_string())
    }
}

pub async fn export_query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let request = ExportRequest {
        agent_id: params.get("agentId").cloned(),
        all: params.get("all").is_some_and(|v| v == "true"),
    };
    run_export(&state, request).await
}

pub async fn export_body(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: ExportRequest = serde_json::from_value(json_body(&body)?)
        .map_err(|e| ApiError::BadRequest(format!("invalid export request: {e}")))?;
    run_export(&state, request).await
}

async fn run_export(state: &AppState, request: ExportRequest) -> Result<Json<Value>, ApiError> {
    let paths = state.paths.clone();
    match blocking(move || markdown::export(&paths)).await? {
        Ok(items) => {
            state
                .audit("memory.export", request.target(), Outcome::Success, None)
                .await;
            Ok(Json(json!({
                "exportedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "source": EXPORT_SOURCE,
                "items": items,
            })))
        }
        Err(err) => {
            state
                .audit("memory.export", "default", Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::Internal(err.to_string()))
        }
    }
}

pub async fn import_usage() -> Json<Value> {
    Json(json!({
        "method": "POST",
        "accepts": "{ items: [{ path, content }], overwrite?: boolean }",
    }))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    items: Vec<MemoryItem>,
    #[serde(default)]
    overwrite: bool,
}

/// Write `.md` items into the workspace. Paths that leave the workspace are
/// skipped, not rejected.
pub async fn import(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: ImportRequest = serde_json::from_value(json_body(&body)?)
        .map_err(|e| ApiError::BadRequest(format!("invalid import request: {e}")))?;
    if request.items.is_empty() {
        return Err(ApiError::BadRequest("No items to import".into()));
    }

    let paths = state.paths.clone();
    let written =
        blocking(move || markdown::import(&paths, &request.items, request.overwrite)).await?;
    match written {
        Ok(written) => {
            state
                .audit("memory.import", format!("{written} files"), Outcome::Success, None)
                .await;
            Ok(Json(json!({ "imported": written })))
        }
        Err(err) => {
            state
                .audit("memory.import", "default", Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::Internal(err.to_string()))
        }
    }
}

pub async fn clear_usage() -> Json<Value> {
    Json(json!({ "method": "POST", "requiresConfirmation": CLEAR_PHRASE }))
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    confirm: String,
    #[serde(default)]
    target: ClearTarget,
}

pub async fn clear(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: ClearRequest = serde_json::from_value(json_body(&body)?)
        .map_err(|e| ApiError::BadRequest(format!("invalid clear request: {e}")))?;
    if request.confirm != CLEAR_PHRASE {
        return Err(ApiError::BadRequest(format!(
            "Confirmation phrase must be exactly: {CLEAR_PHRASE}"
        )));
    }

    let target = request.target;
    let paths = state.paths.clone();
    match blocking(move || markdown::clear(&paths, target)).await? {
        Ok(touched) => {
            tracing::warn!(target = target.as_str(), files = touched.len(), "memory cleared");
            state
                .audit(
                    "memory.clear",
                    target.as_str(),
                    Outcome::Success,
                    Some(touched.join(", ")),
                )
                .await;
            Ok(Json(json!({ "cleared": touched })))
        }
        Err(err) => {
            state
                .audit("memory.clear", "all", Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::Internal(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str, max_results: Option<u32>) -> SearchRequest {
        SearchRequest {
            query: query.into(),
            max_results,
        }
    }

    #[test]
    fn validation_bounds() {
        assert!(request("x", None).validate().is_ok());
        assert!(request("x", Some(1)).validate().is_ok());
        assert!(request("x", Some(50)).validate().is_ok());
        assert!(request("x", Some(0)).validate().is_err());
        assert!(request("x", Some(51)).validate().is_err());
        assert!(request("", Some(5)).validate().is_err());
        assert_eq!(request("x", None).limit(), 10);
    }

    #[test]
    fn export_target_names() {
        let target = |agent_id: Option<&str>, all| {
            ExportRequest {
                agent_id: agent_id.map(str::to_string),
                all,
            }
            .target()
        };
        assert_eq!(target(None, false), "default");
        assert_eq!(target(None, true), "all");
        assert_eq!(target(Some("ops"), true), "ops");
    }
}
