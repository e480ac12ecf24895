//! Domain layer for the order fulfillment core.
//!
//! This crate holds the entities and the rules that never need I/O:
//! - `Product` and the stock adjustment rule (stock never goes negative)
//! - `Cart` with merge-on-add lines whose price is frozen at add time
//! - `Order` snapshots and the `OrderStatus` state machine
//! - `Payment` records, which the core only reads
//!
//! Persistence and orchestration live in the `store` and `fulfillment` crates.

pub mod cart;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;
pub mod value_objects;

pub use cart::{Cart, CartLine};
pub use common::{CartId, OrderId, PaymentId, ProductId, UserId};
pub use error::{AmountOverflow, LifecycleError, ParseEnumError, StockError};
pub use order::{Order, OrderLine, OrderParts, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use product::Product;
pub use value_objects::Money;
