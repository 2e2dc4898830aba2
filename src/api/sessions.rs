//! Session inspection routes.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::auth;
use crate::error::ServiceError;
use crate::models::NegotiationSession;
use crate::store::records::AuditRecord;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: u32,
    pub limit: Option<u32>,
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<NegotiationSession>, ServiceError> {
    auth::verify_session_token(state.cache.as_ref(), &session_id, &headers).await?;

    let session = state
        .records
        .load_session(&session_id)
        .await
        .map_err(|e| ServiceError::Degraded(e.to_string()))?
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;
    Ok(Json(session))
}

/// GET /api/v1/sessions/{session_id}/history?skip&limit
pub async fn get_session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(page): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<AuditRecord>>, ServiceError> {
    auth::verify_session_token(state.cache.as_ref(), &session_id, &headers).await?;

    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let logs = state
        .records
        .list_audit(&session_id, page.skip, limit)
        .await
        .map_err(|e| ServiceError::Degraded(e.to_string()))?;
    if logs.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "history for session {session_id}"
        )));
    }
    Ok(Json(logs))
}
