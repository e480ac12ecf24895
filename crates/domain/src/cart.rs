//! Shopping carts.

use chrono::{DateTime, Utc};
use common::{CartId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::value_objects::Money;

/// One product-quantity-price entry in a user's cart.
///
/// `unit_price` is captured when the product is first added and is not
/// re-read from the catalog afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates a line capturing the given unit price.
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            added_at: Utc::now(),
        }
    }

    /// Returns `unit_price * quantity`, or `None` if it overflows.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A user's in-progress cart. Holds at most one line per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            user_id,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a cart from persisted parts.
    ///
    /// Lines for the same product are merged so the one-line-per-product
    /// invariant holds even for inconsistent input.
    pub fn from_parts(
        id: CartId,
        user_id: UserId,
        lines: Vec<CartLine>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut cart = Self {
            id,
            user_id,
            lines: Vec::with_capacity(lines.len()),
            created_at,
            updated_at,
        };
        for line in lines {
            cart.merge(line);
        }
        cart
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the line for a product, if present.
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Returns the quantity already held for a product (0 if absent).
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.line(product_id).map_or(0, |l| l.quantity)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of `unit_price * quantity` over all lines, or `None` if it
    /// overflows.
    pub fn total(&self) -> Option<Money> {
        Money::checked_sum(self.lines.iter().map(CartLine::subtotal))
    }

    /// Sum of quantities over all lines.
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Adds a line, merging into an existing line for the same product.
    ///
    /// On merge the quantities are summed and the original price is kept.
    /// Returns the resulting line.
    pub fn add_line(&mut self, line: CartLine) -> &CartLine {
        let index = self.merge(line);
        self.touch();
        &self.lines[index]
    }

    /// Overwrites the quantity of an existing line. A quantity of 0 removes it.
    ///
    /// Returns false if the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_line(product_id);
        }
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = quantity;
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Removes the line for a product. Returns false if it was not present.
    pub fn remove_line(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        let removed = self.lines.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Removes every line. The cart itself survives.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.touch();
    }

    fn merge(&mut self, line: CartLine) -> usize {
        if let Some(index) = self
            .lines
            .iter()
            .position(|l| l.product_id == line.product_id)
        {
            let existing = &mut self.lines[index];
            existing.quantity = existing.quantity.saturating_add(line.quantity);
            index
        } else {
            self.lines.push(line);
            self.lines.len() - 1
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cart_is_empty() {
        let user_id = UserId::new();
        let cart = Cart::new(user_id);
        assert!(cart.is_empty());
        assert_eq!(cart.user_id(), user_id);
        assert_eq!(cart.total(), Some(Money::zero()));
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn test_add_same_product_merges_and_keeps_first_price() {
        let mut cart = Cart::new(UserId::new());
        let product = ProductId::new();

        cart.add_line(CartLine::new(product, 2, Money::from_cents(1000)));
        let merged = cart.add_line(CartLine::new(product, 3, Money::from_cents(1500)));

        assert_eq!(merged.quantity, 5);
        assert_eq!(merged.unit_price, Money::from_cents(1000));
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::new(UserId::new());
        cart.add_line(CartLine::new(ProductId::new(), 2, Money::from_cents(1000)));
        cart.add_line(CartLine::new(ProductId::new(), 1, Money::from_cents(2000)));

        assert_eq!(cart.total(), Some(Money::from_cents(4000)));
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_total_overflow_is_none() {
        let mut cart = Cart::new(UserId::new());
        let huge = Money::from_cents(i64::MAX / 2);
        cart.add_line(CartLine::new(ProductId::new(), 1, huge));
        assert_eq!(cart.total(), Some(huge));

        cart.add_line(CartLine::new(ProductId::new(), 3, huge));
        assert_eq!(cart.lines()[1].subtotal(), None);
        assert_eq!(cart.total(), None);
    }

    #[test]
    fn test_set_quantity_overwrites() {
        let mut cart = Cart::new(UserId::new());
        let product = ProductId::new();
        cart.add_line(CartLine::new(product, 2, Money::from_cents(500)));

        assert!(cart.set_quantity(product, 7));
        assert_eq!(cart.quantity_of(product), 7);
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = Cart::new(UserId::new());
        let product = ProductId::new();
        cart.add_line(CartLine::new(product, 2, Money::from_cents(500)));

        assert!(cart.set_quantity(product, 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_missing_line() {
        let mut cart = Cart::new(UserId::new());
        assert!(!cart.set_quantity(ProductId::new(), 3));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new(UserId::new());
        let a = ProductId::new();
        let b = ProductId::new();
        cart.add_line(CartLine::new(a, 1, Money::from_cents(100)));
        cart.add_line(CartLine::new(b, 1, Money::from_cents(100)));

        assert!(cart.remove_line(a));
        assert!(!cart.remove_line(a));
        assert_eq!(cart.lines().len(), 1);

        let id = cart.id();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.id(), id);
    }

    #[test]
    fn test_from_parts_merges_duplicate_lines() {
        let product = ProductId::new();
        let now = Utc::now();
        let cart = Cart::from_parts(
            CartId::new(),
            UserId::new(),
            vec![
                CartLine::new(product, 1, Money::from_cents(300)),
                CartLine::new(product, 2, Money::from_cents(400)),
            ],
            now,
            now,
        );

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(product), 3);
        assert_eq!(cart.total(), Some(Money::from_cents(900)));
    }
}
