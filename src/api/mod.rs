//! HTTP route handlers and the shared application state.

pub mod beckn;
pub mod negotiate;
pub mod products;
pub mod sessions;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::config::Settings;
use crate::service::NegotiationService;
use crate::store::{RecordStore, SessionCache};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<dyn SessionCache>,
    pub records: Arc<dyn RecordStore>,
    pub service: Arc<NegotiationService>,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    engine: &'static str,
    version: &'static str,
    cache: &'static str,
    records: &'static str,
}

/// Liveness probe: 200 when both stores answer, 503 when degraded.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache_ok = state.cache.ping().await.is_ok();
    let records_ok = state.records.ping().await.is_ok();
    let all_ok = cache_ok && records_ok;

    let report = HealthReport {
        status: if all_ok { "ok" } else { "degraded" },
        engine: "hagglebot",
        version: env!("CARGO_PKG_VERSION"),
        cache: if cache_ok { "ok" } else { "unavailable" },
        records: if records_ok { "ok" } else { "unavailable" },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
