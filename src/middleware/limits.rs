//! Request body size limit.
//!
//! Rejects oversized payloads before any handler buffers them; the cap is
//! `max_request_body_bytes` from the settings.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ServiceError;

pub async fn body_size_limit(
    State(max_bytes): State<usize>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared {
        if length > max_bytes {
            return ServiceError::PayloadTooLarge.into_response();
        }
    }

    next.run(request).await
}
