//! Negotiation routes: the main interaction endpoints.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::auth;
use crate::error::ServiceError;
use crate::models::session::is_valid_session_id;
use crate::service::NegotiationResponse;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub product_id: String,
    #[serde(default)]
    pub buyer_name: String,
}

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    #[serde(default)]
    pub message: String,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub session_id: String,
    pub state: String,
    pub current_round: u32,
    pub max_rounds: u32,
    pub current_seller_price: f64,
    pub agreed_price: Option<f64>,
    pub bot_score: f64,
}

/// POST /api/v1/negotiate/start
pub async fn start_negotiation(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<StartRequest>,
) -> Result<Json<NegotiationResponse>, ServiceError> {
    let buyer_ip = addr.ip().to_string();
    check_ip_rate_limit(&state, &buyer_ip).await?;

    let response = state
        .service
        .start(&body.product_id, &body.buyer_name, &buyer_ip)
        .await?;
    Ok(Json(response))
}

/// POST /api/v1/negotiate/{session_id}/offer
pub async fn make_offer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<OfferRequest>,
) -> Result<Json<NegotiationResponse>, ServiceError> {
    if !is_valid_session_id(&session_id) {
        return Err(ServiceError::InvalidInput(
            "invalid session ID format".into(),
        ));
    }
    auth::verify_session_token(state.cache.as_ref(), &session_id, &headers).await?;

    if !(body.price.is_finite() && body.price > 0.0) {
        return Err(ServiceError::InvalidInput(
            "price must be a positive finite number".into(),
        ));
    }

    // Cooldown check: bot defense between turns
    if state
        .cache
        .in_cooldown(&session_id)
        .await
        .unwrap_or(false)
    {
        return Err(ServiceError::RateLimited(
            "please wait before making another offer".into(),
        ));
    }

    let response = state
        .service
        .negotiate(&session_id, &body.message, body.price)
        .await?;

    // Arm the cooldown only after a successful turn
    let delay = Duration::from_millis(state.settings.min_response_delay_ms);
    let _ = state.cache.set_cooldown(&session_id, delay).await;

    Ok(Json(response))
}

/// GET /api/v1/negotiate/{session_id}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusView>, ServiceError> {
    if !is_valid_session_id(&session_id) {
        return Err(ServiceError::InvalidInput(
            "invalid session ID format".into(),
        ));
    }
    auth::verify_session_token(state.cache.as_ref(), &session_id, &headers).await?;

    let session = state
        .service
        .load_session(&session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;

    Ok(Json(StatusView {
        session_id: session.session_id.clone(),
        state: session.state.as_str().to_string(),
        current_round: session.current_round,
        max_rounds: session.max_rounds,
        current_seller_price: session.current_seller_price,
        agreed_price: session.agreed_price,
        bot_score: session.bot_score,
    }))
}

/// INCR + EXPIRE(60) iff first hit, rejected above the per-minute quota.
async fn check_ip_rate_limit(state: &AppState, ip: &str) -> Result<(), ServiceError> {
    if ip.is_empty() {
        return Ok(());
    }
    let count = state
        .cache
        .incr_rate(ip)
        .await
        .map_err(|e| ServiceError::Degraded(e.to_string()))?;
    if count > state.settings.max_requests_per_minute_per_ip {
        return Err(ServiceError::RateLimited(
            "rate limit exceeded, try again later".into(),
        ));
    }
    Ok(())
}
