//! Cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Cart, ProductId};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub user_id: String,
    pub items: Vec<CartItemResponse>,
    pub item_count: u32,
    /// `None` when the total does not fit in an `i64` of cents.
    pub total_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: Option<i64>,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let items = cart
            .lines()
            .iter()
            .map(|line| CartItemResponse {
                product_id: line.product_id.to_string(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                subtotal_cents: line.subtotal().map(|m| m.cents()),
            })
            .collect();
        Self {
            id: cart.id().to_string(),
            user_id: cart.user_id().to_string(),
            items,
            item_count: cart.item_count(),
            total_cents: cart.total().map(|m| m.cents()),
        }
    }
}

/// GET /cart: the caller's cart, created empty on first use.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_or_create(user_id).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/items: add units of a product, merging into an existing line.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id: ProductId = parse_id(&req.product_id)?;
    let cart = state
        .carts
        .add_item(user_id, product_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// PUT /cart/items/:product_id: overwrite a line's quantity; zero removes it.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id: ProductId = parse_id(&product_id)?;
    let cart = state
        .carts
        .update_item(user_id, product_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items/:product_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id: ProductId = parse_id(&product_id)?;
    let cart = state.carts.remove_item(user_id, product_id).await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart: remove every line.
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.clear(user_id).await?;
    Ok(Json(cart.into()))
}
