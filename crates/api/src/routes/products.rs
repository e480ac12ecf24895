//! Catalog and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{Money, Product, ProductId};
use fulfillment::{NewProduct, ProductUpdate};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::parse_id;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    #[serde(default)]
    pub stock: u32,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub stock: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.to_string(),
            sku: product.sku,
            name: product.name,
            description: product.description,
            price_cents: product.price.cents(),
            stock: product.stock,
            is_active: product.is_active,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

// -- Handlers --

/// POST /products: add a product to the catalog.
#[tracing::instrument(skip(state, req), fields(sku = %req.sku))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .catalog
        .create_product(NewProduct {
            sku: req.sku,
            name: req.name,
            description: req.description,
            price: Money::from_cents(req.price_cents),
            stock: req.stock,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    let product = state.catalog.get_product(product_id).await?;
    Ok(Json(product.into()))
}

/// PUT /products/:id: update catalog fields. Stock is untouched.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    let update = ProductUpdate {
        sku: req.sku,
        name: req.name,
        description: req.description,
        price: req.price_cents.map(Money::from_cents),
        is_active: req.is_active,
    };
    let product = state.catalog.update_product(product_id, update).await?;
    Ok(Json(product.into()))
}

/// DELETE /products/:id
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    state.catalog.delete_product(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /products/:id/stock: restock (positive delta) or write off
/// (negative delta) units.
#[tracing::instrument(skip(state, req), fields(delta = req.delta))]
pub async fn adjust_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    let product = state.ledger.adjust(product_id, req.delta).await?;
    Ok(Json(product.into()))
}
