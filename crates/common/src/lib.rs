//! Shared identifier types used across the order fulfillment workspace.

mod types;

pub use types::{CartId, OrderId, PaymentId, ProductId, UserId};
