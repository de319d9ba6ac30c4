//! Scheduled jobs, managed through the gateway's `cron` tool.

use super::{ApiError, AppState, json_body};
use crate::audit::Outcome;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value, json};

/// Fields an operator may change on a job. Anything else in the body is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ScheduleKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every_ms: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    At,
    Every,
    Cron,
}

impl CronPatch {
    pub fn parse(value: Value) -> Result<Self, ApiError> {
        let patch: Self = serde_json::from_value(value)
            .map_err(|e| ApiError::BadRequest(format!("invalid patch: {e}")))?;
        if patch.name.as_deref().is_some_and(str::is_empty) {
            return Err(ApiError::BadRequest("invalid patch: name must not be empty".into()));
        }
        Ok(patch)
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let out = state
        .gateway
        .invoke_tool("cron", json!({"action": "list", "includeDisabled": true}))
        .await?;
    Ok(Json(json!({ "jobs": jobs_of(out) })))
}

/// `jobs.jobs`, else the value itself, else an empty list.
fn jobs_of(out: Value) -> Value {
    match out {
        Value::Null => json!([]),
        Value::Object(mut map) => match map.remove("jobs") {
            Some(jobs) if !jobs.is_null() => jobs,
            Some(_) | None => Value::Object(map),
        },
        other => other,
    }
}

pub async fn add(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let body = json_body(&body)?;
    let job = body.get("job").cloned().unwrap_or(Value::Null);
    let target = job
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string();

    match state
        .gateway
        .invoke_tool("cron", json!({"action": "add", "job": job}))
        .await
    {
        Ok(out) => {
            state
                .audit("cron.add", target, Outcome::Success, Some(out.to_string()))
                .await;
            Ok(Json(out))
        }
        Err(err) => {
            state
                .audit("cron.add", "unknown", Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::rejected(err))
        }
    }
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let patch = CronPatch::parse(json_body(&body)?)?;
    apply_patch(&state, &id, patch).await
}

/// PATCH with the job id in the body as `id` or `jobId`, and the changes
/// either under `patch` or alongside it.
pub async fn update_from_body(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let mut body = json_body(&body)?;
    let id = ["id", "jobId"]
        .iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("Missing id/jobId".into()))?;

    let fields = match body.get_mut("patch").map(Value::take) {
        Some(patch) if !patch.is_null() => patch,
        _ => body,
    };
    let patch = CronPatch::parse(fields)?;
    apply_patch(&state, &id, patch).await
}

async fn apply_patch(state: &AppState, id: &str, patch: CronPatch) -> Result<Json<Value>, ApiError> {
    let args = json!({"action": "update", "jobId": id, "patch": patch});
    match state.gateway.invoke_tool("cron", args).await {
        Ok(out) => {
            let detail = serde_json::to_string(&patch).unwrap_or_default();
            state
                .audit("cron.update", id, Outcome::Success, Some(detail))
                .await;
            Ok(Json(out))
        }
        Err(err) => {
            state
                .audit("cron.update", id, Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::rejected(err))
        }
    }
}

/// Run a job now, regardless of its schedule.
pub async fn run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let args = json!({"action": "run", "jobId": id, "runMode": "force"});
    match state.gateway.invoke_tool("cron", args).await {
        Ok(out) => {
            state.audit("cron.run", id, Outcome::Success, None).await;
            Ok(Json(out))
        }
        Err(err) => {
            state
                .audit("cron.run", id, Outcome::Error, Some(err.to_string()))
                .await;
            Err(ApiError::rejected(err))
        }
    }
}

pub async fn runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let out = state
        .gateway
        .invoke_tool("cron", json!({"action": "runs", "jobId": id}))
        .await?;
    Ok(Json(out))
}
