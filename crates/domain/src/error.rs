//! Domain error types.

use common::ProductId;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised when a stock adjustment cannot be applied to a product.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Reservations against inactive products are refused.
    #[error("Product is inactive: {name}")]
    ProductInactive { product_id: ProductId, name: String },

    /// Applying the reservation would take stock below zero.
    #[error("Insufficient stock for product: {name} (requested {requested}, available {available})")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: u32,
    },

    /// Applying the restock would exceed the representable stock level.
    #[error("Stock overflow for product: {name}")]
    Overflow { product_id: ProductId, name: String },
}

impl StockError {
    /// Returns the product the error refers to.
    pub fn product_id(&self) -> ProductId {
        match self {
            StockError::ProductNotFound(id) => *id,
            StockError::ProductInactive { product_id, .. }
            | StockError::InsufficientStock { product_id, .. }
            | StockError::Overflow { product_id, .. } => *product_id,
        }
    }
}

/// Errors raised by the order state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order is in a terminal status and its metadata is frozen.
    #[error("Order is {status} and can no longer be modified")]
    Closed { status: OrderStatus },
}

/// An order or cart total that does not fit in a [`Money`](crate::Money).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Amount is too large to represent")]
pub struct AmountOverflow;

/// Error returned when parsing a lowercase enum value (status, method) fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
