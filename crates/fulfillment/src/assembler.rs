//! Order assembler: turns a cart into an order.

use std::time::Instant;

use domain::{CartId, Order, OrderLine, UserId};
use store::{Store, StoreError, StoreTransaction};

use crate::error::{FulfillmentError, Result};
use crate::inventory::InventoryLedger;

/// Converts a user's cart into an immutable order.
///
/// The cart is read inside the store transaction that persists the order,
/// reserves its stock and clears the cart, so lines added meanwhile either
/// make it into the order or stay in the cart. Any failure leaves no trace.
#[derive(Clone)]
pub struct OrderAssembler<S: Store> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: Store> OrderAssembler<S> {
    pub fn new(store: S) -> Self {
        let ledger = InventoryLedger::new(store.clone());
        Self { store, ledger }
    }

    /// Places an order for everything in the user's cart.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank shipping or billing address, or a total too
    ///   large to represent
    /// - `CartNotFound` / `CartEmpty` when there is nothing to order
    /// - `ProductNotFound` / `InsufficientStock` for the first line that
    ///   cannot be supplied
    /// - `StockUpdateFailed` when the transactional write fails
    #[tracing::instrument(skip(self))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        shipping_address: &str,
        billing_address: &str,
    ) -> Result<Order> {
        let start = Instant::now();
        let result = self
            .assemble(user_id, shipping_address, billing_address)
            .await;

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                metrics::histogram!("order_creation_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id(),
                    total = %order.total(),
                    lines = order.lines().len(),
                    "Order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_creation_failures_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(error = %e, "Order creation failed");
            }
        }
        result
    }

    async fn assemble(
        &self,
        user_id: UserId,
        shipping_address: &str,
        billing_address: &str,
    ) -> Result<Order> {
        let shipping_address = required(shipping_address, "shipping address")?;
        let billing_address = required(billing_address, "billing address")?;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(FulfillmentError::StockUpdateFailed)?;

        let cart = tx
            .get_cart_by_user(user_id)
            .await?
            .ok_or(FulfillmentError::CartNotFound(user_id))?;
        if cart.is_empty() {
            return Err(FulfillmentError::CartEmpty);
        }

        let mut lines = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let product = tx
                .get_product(line.product_id)
                .await?
                .ok_or(FulfillmentError::ProductNotFound(line.product_id))?;

            if !product.can_fulfill(line.quantity) {
                return Err(FulfillmentError::InsufficientStock {
                    product_id: product.id,
                    name: product.name,
                    requested: line.quantity,
                    available: if product.is_active { product.stock } else { 0 },
                });
            }
            lines.push(OrderLine::from_cart_line(line, product.name));
        }

        let order = Order::place(user_id, lines, shipping_address, billing_address)?;
        self.persist(tx, &order, cart.id())
            .await
            .map_err(FulfillmentError::StockUpdateFailed)?;
        Ok(order)
    }

    async fn persist(
        &self,
        mut tx: S::Tx,
        order: &Order,
        cart_id: CartId,
    ) -> std::result::Result<(), StoreError> {
        tx.insert_order(order).await?;
        self.ledger.reserve_lines(&mut tx, order.lines()).await?;
        tx.clear_cart(cart_id).await?;
        tx.commit().await
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FulfillmentError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}
