//! Console login and the session guard in front of `/api`.

use super::{ApiError, AppState, json_body};
use crate::auth::OPEN_PATHS;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use serde_json::{Value, json};

pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(SignedCookieJar, Json<Value>), ApiError> {
    let Some(auth) = state.auth.as_deref() else {
        return Err(ApiError::NotFound);
    };
    let body = json_body(&body)?;
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if !auth.password_matches(password) {
        tracing::warn!("console login rejected");
        return Err(ApiError::InvalidCredentials);
    }
    Ok((auth.issue(), Json(json!({ "ok": true }))))
}

/// Reject `/api` requests without a valid session, except health and login.
pub async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(auth) = state.auth.as_deref() else {
        return next.run(request).await;
    };
    let path = request.uri().path();
    if !path.starts_with("/api") || OPEN_PATHS.contains(&path) {
        return next.run(request).await;
    }
    if auth.has_session(request.headers()) {
        next.run(request).await
    } else {
        ApiError::AuthRequired.into_response()
    }
}
