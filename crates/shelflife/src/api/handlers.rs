//! HTTP handlers outside the realtime endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::{Serialize, de::IgnoredAny};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Liveness check.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Response for the dev notify endpoint.
#[derive(Debug, Serialize)]
pub struct DevNotifyResponse {
    pub user_id: String,
    /// Connections the payload was offered to.
    pub active_connections: usize,
}

/// Push a raw JSON payload to every connection of a user.
///
/// POST /v1/dev/notify/{user_id}
///
/// Only mounted in dev mode. The body is forwarded as-is.
pub async fn dev_notify(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<DevNotifyResponse>> {
    serde_json::from_slice::<IgnoredAny>(&body)
        .map_err(|e| ApiError::bad_request(format!("body is not JSON: {}", e)))?;

    let active_connections = state.hub.connection_count(&user_id);
    state.hub.send_to_user(&user_id, body);

    Ok(Json(DevNotifyResponse {
        user_id,
        active_connections,
    }))
}
