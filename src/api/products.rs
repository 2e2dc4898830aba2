//! Product catalogue routes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::auth;
use crate::error::ServiceError;
use crate::models::Product;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub anchor_price: f64,
    pub cost_price: f64,
    pub min_margin: f64,
    pub target_margin: f64,
}

#[derive(Debug, Serialize)]
pub struct CreatedView {
    pub status: &'static str,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: u32,
    pub limit: Option<u32>,
}

/// POST /api/v1/products (admin only)
pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<CreatedView>), ServiceError> {
    auth::verify_admin_key(&state.settings, &headers)?;

    let product = Product {
        id: body.id,
        name: body.name,
        category: body.category,
        anchor_price: body.anchor_price,
        cost_price: body.cost_price,
        min_margin: body.min_margin,
        target_margin: body.target_margin,
    };
    product.validate()?;

    let created = state
        .records
        .create_product(&product)
        .await
        .map_err(|e| ServiceError::Degraded(e.to_string()))?;
    if !created {
        return Err(ServiceError::Conflict(format!(
            "product {} already exists",
            product.id
        )));
    }

    Ok((
        StatusCode::CREATED,
        Json(CreatedView {
            status: "created",
            id: product.id,
        }),
    ))
}

/// GET /api/v1/products/{product_id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ServiceError> {
    let product = state
        .records
        .get_product(&product_id)
        .await
        .map_err(|e| ServiceError::Degraded(e.to_string()))?
        .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))?;
    Ok(Json(product))
}

/// GET /api/v1/products?skip&limit
pub async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Product>>, ServiceError> {
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let products = state
        .records
        .list_products(page.skip, limit)
        .await
        .map_err(|e| ServiceError::Degraded(e.to_string()))?;
    Ok(Json(products))
}
