//! Order fulfillment core.
//!
//! Four components, leaf-first:
//! 1. [`InventoryLedger`]: atomic stock adjustments, never below zero
//! 2. [`CartService`]: per-user carts with merge-on-add lines
//! 3. [`OrderAssembler`]: cart to order, reserving stock in one transaction
//! 4. [`OrderLifecycle`]: status transitions and restock on cancellation
//!
//! [`CatalogService`] maintains the products the others work on. Every
//! service is generic over a [`store::Store`] backend.

pub mod assembler;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod inventory;
pub mod lifecycle;

pub use assembler::OrderAssembler;
pub use cart::CartService;
pub use catalog::{CatalogService, NewProduct, ProductUpdate};
pub use error::{ErrorKind, FulfillmentError, Result};
pub use inventory::InventoryLedger;
pub use lifecycle::OrderLifecycle;
