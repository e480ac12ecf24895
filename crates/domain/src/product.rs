//! Catalog products and the stock adjustment rule.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::StockError;
use crate::value_objects::Money;

/// A catalog product with its available stock.
///
/// `stock` is unsigned, so a negative level cannot be represented. Every change
/// to it should go through [`Product::check_adjustment`] so the in-memory and
/// SQL stores refuse exactly the same adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Highest unit price the catalog accepts ($1,000,000.00).
    ///
    /// Keeps the subtotal of any single line within `i64` cents.
    pub const MAX_PRICE: Money = Money::from_cents(100_000_000);

    /// Creates a new active product.
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price: Money, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(),
            sku: sku.into(),
            name: name.into(),
            description: String::new(),
            price,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if at least one unit can be sold.
    pub fn is_in_stock(&self) -> bool {
        self.stock > 0 && self.is_active
    }

    /// Returns true if `quantity` units could be reserved right now.
    pub fn can_fulfill(&self, quantity: u32) -> bool {
        self.is_active && self.stock >= quantity
    }

    /// Computes the stock level after applying `delta` without mutating.
    ///
    /// Negative deltas are reservations and require an active product with
    /// enough stock. Positive deltas are restocks and are accepted for inactive
    /// products too.
    pub fn check_adjustment(&self, delta: i64) -> Result<u32, StockError> {
        if delta < 0 {
            if !self.is_active {
                return Err(StockError::ProductInactive {
                    product_id: self.id,
                    name: self.name.clone(),
                });
            }
            let requested = u32::try_from(delta.unsigned_abs()).ok();
            requested
                .and_then(|requested| self.stock.checked_sub(requested))
                .ok_or_else(|| StockError::InsufficientStock {
                    product_id: self.id,
                    name: self.name.clone(),
                    requested: requested.unwrap_or(u32::MAX),
                    available: self.stock,
                })
        } else {
            u32::try_from(delta)
                .ok()
                .and_then(|added| self.stock.checked_add(added))
                .ok_or_else(|| StockError::Overflow {
                    product_id: self.id,
                    name: self.name.clone(),
                })
        }
    }

    /// Applies a stock adjustment, leaving the product untouched on error.
    pub fn apply_adjustment(&mut self, delta: i64) -> Result<u32, StockError> {
        let stock = self.check_adjustment(delta)?;
        self.stock = stock;
        self.updated_at = Utc::now();
        Ok(stock)
    }
}
