//! Persistence contract for the order fulfillment core.
//!
//! The repository traits in [`store`] are what the fulfillment services
//! consume. Two backends implement them:
//! - [`InMemoryStore`], used by tests and the default API binary
//! - [`PostgresStore`], backed by `sqlx`
//!
//! Operations that must change several rows together (placing an order,
//! cancelling one) go through a [`StoreTransaction`] obtained from
//! [`Store::begin`]. Nothing done inside it is visible until `commit`, and
//! dropping it rolls everything back.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    CartRepository, OrderRepository, PaymentRepository, ProductRepository, Store,
    StoreTransaction,
};
