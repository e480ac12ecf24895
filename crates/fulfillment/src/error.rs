//! Fulfillment error types.

use domain::{AmountOverflow, LifecycleError, OrderId, OrderStatus, ProductId, StockError, UserId};
use store::StoreError;
use thiserror::Error;

/// Coarse classification of a [`FulfillmentError`], used by presentation
/// layers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InsufficientStock,
    InvalidTransition,
    Unauthorized,
    Conflict,
    StockUpdateFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StockUpdateFailed => "stock_update_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors that can occur in the fulfillment services.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Input rejected before anything was read or written.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart not found for user: {0}")]
    CartNotFound(UserId),

    #[error("Product {0} is not in the cart")]
    CartLineNotFound(ProductId),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product cannot supply the requested quantity.
    #[error("Insufficient stock for product: {name}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: u32,
    },

    /// Reservations against inactive products are refused.
    #[error("Product is not available: {name}")]
    ProductInactive { product_id: ProductId, name: String },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Customers may only cancel pending or paid orders.
    #[error("Order cannot be cancelled in status {0}")]
    NotCancellable(OrderStatus),

    /// Metadata writes are refused once the order is terminal.
    #[error("Order is {0} and can no longer be modified")]
    OrderClosed(OrderStatus),

    /// The acting user does not own the order.
    #[error("Unauthorized to access this order")]
    Unauthorized,

    #[error("Product with SKU {0} already exists")]
    DuplicateSku(String),

    /// Persisting an order and reserving its stock failed; nothing was written.
    #[error("Failed to update stock: {0}")]
    StockUpdateFailed(#[source] StoreError),

    /// Restocking a cancelled order failed; the order was left untouched.
    #[error("Failed to restore stock: {0}")]
    StockRestoreFailed(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Validation(_) => ErrorKind::Validation,
            FulfillmentError::CartNotFound(_)
            | FulfillmentError::CartLineNotFound(_)
            | FulfillmentError::ProductNotFound(_)
            | FulfillmentError::OrderNotFound(_) => ErrorKind::NotFound,
            FulfillmentError::CartEmpty => ErrorKind::Validation,
            FulfillmentError::InsufficientStock { .. } | FulfillmentError::ProductInactive { .. } => {
                ErrorKind::InsufficientStock
            }
            FulfillmentError::InvalidTransition { .. }
            | FulfillmentError::NotCancellable(_)
            | FulfillmentError::OrderClosed(_) => ErrorKind::InvalidTransition,
            FulfillmentError::Unauthorized => ErrorKind::Unauthorized,
            FulfillmentError::DuplicateSku(_) => ErrorKind::Conflict,
            FulfillmentError::StockUpdateFailed(_) | FulfillmentError::StockRestoreFailed(_) => {
                ErrorKind::StockUpdateFailed
            }
            FulfillmentError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            FulfillmentError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns the stock refusal behind a failed stock update, if that is
    /// what caused it (as opposed to a backend failure).
    pub fn stock_refusal(&self) -> Option<&StockError> {
        match self {
            FulfillmentError::StockUpdateFailed(StoreError::Stock(e))
            | FulfillmentError::StockRestoreFailed(StoreError::Stock(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<StockError> for FulfillmentError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::ProductNotFound(id) => FulfillmentError::ProductNotFound(id),
            StockError::ProductInactive { product_id, name } => {
                FulfillmentError::ProductInactive { product_id, name }
            }
            StockError::InsufficientStock {
                product_id,
                name,
                requested,
                available,
            } => FulfillmentError::InsufficientStock {
                product_id,
                name,
                requested,
                available,
            },
            StockError::Overflow { name, .. } => {
                FulfillmentError::Validation(format!("stock for {name} would overflow"))
            }
        }
    }
}

impl From<LifecycleError> for FulfillmentError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidTransition { from, to } => {
                FulfillmentError::InvalidTransition { from, to }
            }
            LifecycleError::Closed { status } => FulfillmentError::OrderClosed(status),
        }
    }
}

impl From<AmountOverflow> for FulfillmentError {
    fn from(_: AmountOverflow) -> Self {
        FulfillmentError::Validation("order total is too large".to_string())
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Stock(e) => e.into(),
            StoreError::Transition(e) => e.into(),
            StoreError::DuplicateSku(sku) => FulfillmentError::DuplicateSku(sku),
            other => FulfillmentError::Store(other),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(FulfillmentError::CartEmpty.kind(), ErrorKind::Validation);
        assert_eq!(
            FulfillmentError::NotCancellable(OrderStatus::Shipped).kind(),
            ErrorKind::InvalidTransition
        );
        assert_eq!(
            FulfillmentError::CartLineNotFound(ProductId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FulfillmentError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_store_stock_refusal_maps_to_domain_error() {
        let product_id = ProductId::new();
        let err: FulfillmentError = StoreError::Stock(StockError::InsufficientStock {
            product_id,
            name: "Widget".into(),
            requested: 3,
            available: 1,
        })
        .into();

        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock { product_id: id, requested: 3, .. } if id == product_id
        ));
        assert_eq!(err.to_string(), "Insufficient stock for product: Widget");
    }

    #[test]
    fn test_stock_refusal_only_for_stock_errors() {
        let refused = FulfillmentError::StockUpdateFailed(StoreError::Stock(
            StockError::ProductNotFound(ProductId::new()),
        ));
        assert!(refused.stock_refusal().is_some());

        let backend =
            FulfillmentError::StockUpdateFailed(StoreError::Unavailable("offline".into()));
        assert!(backend.stock_refusal().is_none());
    }

    #[test]
    fn test_closed_order_maps_to_order_closed() {
        let err: FulfillmentError = LifecycleError::Closed {
            status: OrderStatus::Refunded,
        }
        .into();
        assert!(matches!(err, FulfillmentError::OrderClosed(OrderStatus::Refunded)));
    }
}
