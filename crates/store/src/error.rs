use domain::{LifecycleError, OrderId, OrderStatus, StockError};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stock adjustment was refused.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// The order's status changed between read and write.
    #[error("Status conflict for order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A status write that the transition table does not allow.
    #[error(transparent)]
    Transition(#[from] LifecycleError),

    /// A product with the same SKU already exists.
    #[error("Product with SKU {0} already exists")]
    DuplicateSku(String),

    /// The backend refused the operation (used by the in-memory store's fault injection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A row could not be mapped back onto a domain type.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
