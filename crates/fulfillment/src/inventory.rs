//! Inventory ledger: the only path through which stock changes.

use domain::{OrderLine, Product, ProductId};
use store::{Store, StoreError, StoreTransaction};

use crate::error::{FulfillmentError, Result};

/// Owns stock mutation.
///
/// A negative delta is a reservation, a positive one a restock. The refusal
/// rules live on [`Product::check_adjustment`] and are enforced by the store
/// inside the same atomic step that applies the change.
#[derive(Clone)]
pub struct InventoryLedger<S: Store> {
    store: S,
}

impl<S: Store> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Applies a single adjustment in its own transaction and returns the
    /// updated product.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(&self, product_id: ProductId, delta: i64) -> Result<Product> {
        if delta == 0 {
            return Err(FulfillmentError::Validation(
                "stock adjustment must be non-zero".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let product = self.adjust_in(&mut tx, product_id, delta).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Applies an adjustment inside an open transaction.
    pub async fn adjust_in(
        &self,
        tx: &mut S::Tx,
        product_id: ProductId,
        delta: i64,
    ) -> std::result::Result<Product, StoreError> {
        let direction = if delta < 0 { "reserve" } else { "restock" };
        match tx.adjust_stock(product_id, delta).await {
            Ok(product) => {
                metrics::counter!("inventory_adjustments_total", "direction" => direction)
                    .increment(1);
                tracing::debug!(%product_id, delta, stock = product.stock, "Stock adjusted");
                Ok(product)
            }
            Err(e) => {
                metrics::counter!("inventory_adjustment_failures_total", "direction" => direction)
                    .increment(1);
                tracing::warn!(%product_id, delta, error = %e, "Stock adjustment refused");
                Err(e)
            }
        }
    }

    /// Reserves every line, stopping at the first refusal. The caller's
    /// transaction must be dropped on error to undo earlier lines.
    pub async fn reserve_lines(
        &self,
        tx: &mut S::Tx,
        lines: &[OrderLine],
    ) -> std::result::Result<(), StoreError> {
        for line in lines {
            self.adjust_in(tx, line.product_id, -i64::from(line.quantity))
                .await?;
        }
        Ok(())
    }

    /// Returns every line's quantity to stock.
    pub async fn restock_lines(
        &self,
        tx: &mut S::Tx,
        lines: &[OrderLine],
    ) -> std::result::Result<(), StoreError> {
        for line in lines {
            self.adjust_in(tx, line.product_id, i64::from(line.quantity))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::{Money, StockError};
    use store::{InMemoryStore, ProductRepository};

    use super::*;

    async fn setup(stock: u32) -> (InMemoryStore, InventoryLedger<InMemoryStore>, Product) {
        let store = InMemoryStore::new();
        let product = Product::new("SKU-1", "Widget", Money::from_cents(1000), stock);
        store.create_product(&product).await.unwrap();
        (store.clone(), InventoryLedger::new(store), product)
    }

    #[tokio::test]
    async fn test_reserve_and_restock() {
        let (store, ledger, product) = setup(5).await;

        let updated = ledger.adjust(product.id, -3).await.unwrap();
        assert_eq!(updated.stock, 2);
        let updated = ledger.adjust(product.id, 4).await.unwrap();
        assert_eq!(updated.stock, 6);

        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 6);
    }

    #[tokio::test]
    async fn test_reservation_cannot_go_negative() {
        let (store, ledger, product) = setup(2).await;

        let err = ledger.adjust(product.id, -3).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let (_, ledger, _) = setup(2).await;
        let missing = ProductId::new();
        let err = ledger.adjust(missing, 1).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::ProductNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_inactive_product_accepts_restock_only() {
        let (store, ledger, mut product) = setup(2).await;
        product.is_active = false;
        store.update_product(&product).await.unwrap();

        let err = ledger.adjust(product.id, -1).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::ProductInactive { .. }));

        let restocked = ledger.adjust(product.id, 3).await.unwrap();
        assert_eq!(restocked.stock, 5);
    }

    #[tokio::test]
    async fn test_zero_delta_is_rejected() {
        let (_, ledger, product) = setup(2).await;
        let err = ledger.adjust(product.id, 0).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_overflow_is_rejected() {
        let (_, ledger, product) = setup(u32::MAX - 1).await;
        let err = ledger.adjust(product.id, 2).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reserve_lines_stops_at_first_refusal() {
        let (store, ledger, product) = setup(5).await;
        let scarce = Product::new("SKU-2", "Gadget", Money::from_cents(500), 1);
        store.create_product(&scarce).await.unwrap();

        let lines = vec![
            OrderLine {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: 2,
                unit_price: product.price,
            },
            OrderLine {
                product_id: scarce.id,
                product_name: scarce.name.clone(),
                quantity: 2,
                unit_price: scarce.price,
            },
        ];

        let mut tx = store.begin().await.unwrap();
        let err = ledger.reserve_lines(&mut tx, &lines).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Stock(StockError::InsufficientStock { product_id, .. }) if product_id == scarce.id
        ));
        drop(tx);

        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overdraw() {
        let (store, ledger, product) = setup(50).await;

        // Deterministic pseudo-random quantities in 1..=7.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let quantities: Vec<u32> = (0..40)
            .map(|_| {
                seed = seed
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((seed >> 33) % 7) as u32 + 1
            })
            .collect();

        let tasks = quantities.iter().map(|&quantity| {
            let ledger = ledger.clone();
            async move {
                ledger
                    .adjust(product.id, -i64::from(quantity))
                    .await
                    .ok()
                    .map(|_| quantity)
            }
        });
        let results = futures_util::future::join_all(tasks).await;

        let reserved: u32 = results.iter().flatten().sum();
        let remaining = store.get_product(product.id).await.unwrap().unwrap().stock;
        assert!(reserved <= 50);
        assert_eq!(remaining, 50 - reserved);
    }
}
