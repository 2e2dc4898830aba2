//! Hagglebot: AI bazaar-style price negotiation for e-commerce.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hagglebot_backend::{
    api::{self, AppState},
    config::Settings,
    dialogue::{DialogueGenerator, NimClient},
    middleware::{body_size_limit, request_logging},
    service::NegotiationService,
    store::{InMemoryCache, SqliteRecords},
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let settings = Arc::new(Settings::from_env());
    init_tracing(&settings.log_level);

    info!("🛒 Hagglebot negotiation engine starting");

    if settings.nim_api_key.is_empty() {
        warn!("NIM_API_KEY not set; dialogue generation will use fallback responses");
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let records = Arc::new(connect_records(&settings.database_path).await?);
    info!("💾 Record store ready at {}", settings.database_path);

    let cache = Arc::new(InMemoryCache::new());

    let nim = NimClient::new(
        http_client,
        settings.nim_base_url.clone(),
        settings.nim_api_key.clone(),
        settings.nim_model.clone(),
    );
    let dialogue = DialogueGenerator::new(Arc::new(nim));

    let service = Arc::new(NegotiationService::new(
        settings.clone(),
        cache.clone(),
        records.clone(),
        dialogue,
    ));

    let app_state = AppState {
        settings: settings.clone(),
        cache,
        records,
        service,
    };

    let app = build_router(app_state.clone());

    let addr = "0.0.0.0:8000";
    let listener = TcpListener::bind(addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            state
                .settings
                .cors_allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<header::HeaderValue>().ok()),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
            header::HeaderName::from_static("x-session-token"),
            header::HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(api::health_check))
        .route("/api/v1/negotiate/start", post(api::negotiate::start_negotiation))
        .route(
            "/api/v1/negotiate/:session_id/offer",
            post(api::negotiate::make_offer),
        )
        .route(
            "/api/v1/negotiate/:session_id/status",
            get(api::negotiate::get_status),
        )
        .route("/api/v1/sessions/:session_id", get(api::sessions::get_session))
        .route(
            "/api/v1/sessions/:session_id/history",
            get(api::sessions::get_session_history),
        )
        .route(
            "/api/v1/products",
            post(api::products::create_product).get(api::products::list_products),
        )
        .route("/api/v1/products/:product_id", get(api::products::get_product))
        .route("/beckn/select", post(api::beckn::beckn_select))
        .layer(axum_mw::from_fn_with_state(
            state.settings.max_request_body_bytes,
            body_size_limit,
        ))
        .layer(axum_mw::from_fn(request_logging))
        .layer(cors)
        .with_state(state)
}

/// Open the record store, retrying with exponential backoff so a slow disk or
/// locked database at boot does not kill the process.
async fn connect_records(db_path: &str) -> Result<SqliteRecords> {
    const MAX_RETRIES: u32 = 3;
    let mut attempt = 1;
    loop {
        match SqliteRecords::new(db_path) {
            Ok(store) => {
                info!("Record store connected (attempt {attempt})");
                return Ok(store);
            }
            Err(e) if attempt < MAX_RETRIES => {
                warn!(
                    "Record store connection attempt {attempt}/{MAX_RETRIES} failed: {e}"
                );
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e).context("connect record store"),
        }
    }
}

fn init_tracing(log_level: &str) {
    let default_filter = format!("hagglebot_backend={log_level},hagglebot={log_level},tower_http=info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
