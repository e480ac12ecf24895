//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{Money, Order, OrderId, OrderStatus, Payment, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub billing_address: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_code: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordPaymentRequest {
    pub amount_cents: i64,
    pub method: String,
    pub status: Option<String>,
    pub external_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub shipping_address: String,
    pub billing_address: String,
    pub tracking_code: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let items = order
            .lines()
            .iter()
            .map(|line| OrderItemResponse {
                product_id: line.product_id.to_string(),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                subtotal_cents: line.subtotal().map(|m| m.cents()),
            })
            .collect();
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status(),
            items,
            total_cents: order.total().cents(),
            shipping_address: order.shipping_address().to_string(),
            billing_address: order.billing_address().to_string(),
            tracking_code: order.tracking_code().map(String::from),
            payment_id: order.payment_id().map(|id| id.to_string()),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            order_id: payment.order_id.to_string(),
            amount_cents: payment.amount.cents(),
            currency: payment.currency,
            method: payment.method,
            status: payment.status,
            external_id: payment.external_id,
            created_at: payment.created_at,
        }
    }
}

// -- Handlers --

/// POST /orders: turn the caller's cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .assembler
        .create_order(user_id, &req.shipping_address, &req.billing_address)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.lifecycle.orders_for_user(user_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/:id: only the owner may read an order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let order = state.lifecycle.get_order_for_user(user_id, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/:id: customer cancellation; restores stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let order = state.lifecycle.cancel_order(user_id, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/:id/status: operator status change, optionally recording a
/// tracking code first.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let next = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let Some(code) = req.tracking_code.as_deref() {
        state.lifecycle.set_tracking_code(order_id, code).await?;
    }
    let order = state.lifecycle.update_status(order_id, next).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/:id/payments: record a payment received for the caller's
/// order. The amount must equal the order total.
#[tracing::instrument(skip(state, req))]
pub async fn record_payment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let method = req
        .method
        .parse::<PaymentMethod>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let status = match req.status.as_deref() {
        Some(s) => s
            .parse::<PaymentStatus>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => PaymentStatus::default(),
    };

    let order = state.lifecycle.get_order_for_user(user_id, order_id).await?;
    let mut payment = Payment::new(order.id(), Money::from_cents(req.amount_cents), method);
    payment.status = status;
    payment.external_id = req.external_id;
    if status != PaymentStatus::Pending {
        payment.processed_at = Some(Utc::now());
    }

    let payment = state.lifecycle.record_payment(payment).await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}
