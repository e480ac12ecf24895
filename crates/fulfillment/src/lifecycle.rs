//! Order lifecycle: status transitions, cancellation and post-creation metadata.

use domain::{Order, OrderId, OrderStatus, Payment, PaymentId, UserId};
use store::{Store, StoreError, StoreTransaction};

use crate::error::{FulfillmentError, Result};
use crate::inventory::InventoryLedger;

/// Governs the status of placed orders.
///
/// Two rules apply and are kept separate:
/// - [`OrderStatus::can_transition_to`]: the transition table, used by
///   [`OrderLifecycle::update_status`]
/// - [`Order::can_be_cancelled`]: the narrower customer rule, used by
///   [`OrderLifecycle::cancel_order`]
///
/// Any move into `cancelled` returns the order's lines to stock in the same
/// transaction as the status write.
#[derive(Clone)]
pub struct OrderLifecycle<S: Store> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: Store> OrderLifecycle<S> {
    pub fn new(store: S) -> Self {
        let ledger = InventoryLedger::new(store.clone());
        Self { store, ledger }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Loads an order on behalf of a user. Only the owner may see it.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_for_user(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(FulfillmentError::Unauthorized);
        }
        Ok(order)
    }

    /// Every order of a user, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.get_orders_by_user(user_id).await?)
    }

    /// Moves an order along the transition table.
    ///
    /// The write only succeeds if the status is still the one observed when
    /// the order was loaded; otherwise `InvalidTransition` is reported from
    /// the status actually found.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, next: OrderStatus) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        let current = order.status();
        if !current.can_transition_to(next) {
            return Err(FulfillmentError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        if next == OrderStatus::Cancelled {
            self.cancel_with_restock(&order).await?;
        } else {
            self.store
                .update_order_status(order_id, current, next)
                .await
                .map_err(|e| status_write_error(e, next))?;
        }

        metrics::counter!(
            "order_status_transitions_total",
            "from" => current.as_str(),
            "to" => next.as_str()
        )
        .increment(1);
        tracing::info!(%order_id, from = %current, to = %next, "Order status updated");

        self.get_order(order_id).await
    }

    /// Customer cancellation of a pending or paid order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(FulfillmentError::Unauthorized);
        }
        if !order.can_be_cancelled() {
            return Err(FulfillmentError::NotCancellable(order.status()));
        }

        self.cancel_with_restock(&order).await?;
        tracing::info!(%order_id, from = %order.status(), "Order cancelled by customer");

        self.get_order(order_id).await
    }

    /// Links a payment record to the order.
    #[tracing::instrument(skip(self))]
    pub async fn attach_payment(&self, order_id: OrderId, payment_id: PaymentId) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        order.attach_payment(payment_id)?;
        self.store.update_order(&order).await?;
        Ok(order)
    }

    /// Records the carrier's tracking code.
    #[tracing::instrument(skip(self))]
    pub async fn set_tracking_code(&self, order_id: OrderId, code: &str) -> Result<Order> {
        let code = code.trim();
        if code.is_empty() {
            return Err(FulfillmentError::Validation(
                "tracking code is required".to_string(),
            ));
        }
        let mut order = self.get_order(order_id).await?;
        order.set_tracking_code(code)?;
        self.store.update_order(&order).await?;
        Ok(order)
    }

    /// Stores a payment record and links it to its order.
    ///
    /// The amount must match the order total. The order's status is left
    /// alone; moving to `paid` is a separate [`update_status`] call. An order
    /// that became terminal since it was loaded refuses the link, and the
    /// payment record is dropped with it.
    ///
    /// [`update_status`]: OrderLifecycle::update_status
    #[tracing::instrument(skip(self, payment), fields(order_id = %payment.order_id))]
    pub async fn record_payment(&self, payment: Payment) -> Result<Payment> {
        let mut order = self.get_order(payment.order_id).await?;
        if payment.amount != order.total() {
            return Err(FulfillmentError::Validation(format!(
                "payment amount {} does not match order total {}",
                payment.amount,
                order.total()
            )));
        }
        order.attach_payment(payment.id)?;

        let mut tx = self.store.begin().await?;
        tx.insert_payment(&payment).await?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment.id, status = %payment.status, "Payment recorded");
        Ok(payment)
    }

    /// Latest payment recorded for an order.
    pub async fn payment_for(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.store.get_payment_by_order(order_id).await?)
    }

    /// Claims the order for cancellation and restocks its lines as one unit.
    async fn cancel_with_restock(&self, order: &Order) -> Result<()> {
        let mut tx = self.store.begin().await?;
        tx.update_order_status(order.id(), order.status(), OrderStatus::Cancelled)
            .await
            .map_err(|e| status_write_error(e, OrderStatus::Cancelled))?;
        self.ledger
            .restock_lines(&mut tx, order.lines())
            .await
            .map_err(FulfillmentError::StockRestoreFailed)?;
        tx.commit()
            .await
            .map_err(FulfillmentError::StockRestoreFailed)?;

        metrics::counter!("orders_cancelled_total").increment(1);
        Ok(())
    }
}

/// A lost compare-and-set is reported against the status that won.
fn status_write_error(e: StoreError, next: OrderStatus) -> FulfillmentError {
    match e {
        StoreError::StatusConflict { actual, .. } => FulfillmentError::InvalidTransition {
            from: actual,
            to: next,
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use domain::{Money, PaymentMethod, Product};
    use store::{InMemoryStore, ProductRepository};

    use super::*;
    use crate::assembler::OrderAssembler;
    use crate::cart::CartService;

    struct Fixture {
        store: InMemoryStore,
        lifecycle: OrderLifecycle<InMemoryStore>,
        user_id: UserId,
        product: Product,
        order: Order,
    }

    /// Places an order for 2 of a product that had 5 in stock.
    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let product = Product::new("P", "Widget", Money::from_cents(1000), 5);
        store.create_product(&product).await.unwrap();

        let user_id = UserId::new();
        CartService::new(store.clone())
            .add_item(user_id, product.id, 2)
            .await
            .unwrap();
        let order = OrderAssembler::new(store.clone())
            .create_order(user_id, "1 Main St", "1 Main St")
            .await
            .unwrap();

        Fixture {
            lifecycle: OrderLifecycle::new(store.clone()),
            store,
            user_id,
            product,
            order,
        }
    }

    impl Fixture {
        async fn stock(&self) -> u32 {
            self.store
                .get_product(self.product.id)
                .await
                .unwrap()
                .unwrap()
                .stock
        }

        async fn advance(&self, path: &[OrderStatus]) {
            for status in path {
                self.lifecycle
                    .update_status(self.order.id(), *status)
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_pending_to_paid() {
        let f = fixture().await;
        let order = f
            .lifecycle
            .update_status(f.order.id(), OrderStatus::Paid)
            .await
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(f.stock().await, 3);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let f = fixture().await;
        f.advance(&[
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ])
        .await;

        let err = f
            .lifecycle
            .update_status(f.order.id(), OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending,
            }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_is_terminal() {
        let f = fixture().await;
        f.lifecycle.cancel_order(f.user_id, f.order.id()).await.unwrap();

        for next in OrderStatus::ALL {
            let result = f.lifecycle.update_status(f.order.id(), next).await;
            assert!(
                matches!(result, Err(FulfillmentError::InvalidTransition { .. })),
                "cancelled -> {next} must fail"
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_paid_order_restocks() {
        let f = fixture().await;
        f.advance(&[OrderStatus::Paid]).await;
        assert_eq!(f.stock().await, 3);

        let order = f.lifecycle.cancel_order(f.user_id, f.order.id()).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(f.stock().await, 5);
    }

    #[tokio::test]
    async fn test_cancel_shipped_order_fails() {
        let f = fixture().await;
        f.advance(&[
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ])
        .await;

        let err = f
            .lifecycle
            .cancel_order(f.user_id, f.order.id())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::NotCancellable(OrderStatus::Shipped)
        ));
        assert_eq!(f.stock().await, 3);
    }

    #[tokio::test]
    async fn test_customer_cannot_cancel_processing_but_admin_can() {
        let f = fixture().await;
        f.advance(&[OrderStatus::Paid, OrderStatus::Processing]).await;

        let err = f
            .lifecycle
            .cancel_order(f.user_id, f.order.id())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotCancellable(_)));

        let order = f
            .lifecycle
            .update_status(f.order.id(), OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(f.stock().await, 5);
    }

    #[tokio::test]
    async fn test_only_owner_may_cancel() {
        let f = fixture().await;
        let err = f
            .lifecycle
            .cancel_order(UserId::new(), f.order.id())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Unauthorized));
        assert_eq!(
            f.lifecycle.get_order(f.order.id()).await.unwrap().status(),
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_restock_failure_leaves_order_untouched() {
        let f = fixture().await;
        f.store.fail_stock_adjustments(f.product.id, true).await;

        let err = f
            .lifecycle
            .cancel_order(f.user_id, f.order.id())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::StockRestoreFailed(_)));
        assert_eq!(
            f.lifecycle.get_order(f.order.id()).await.unwrap().status(),
            OrderStatus::Pending
        );
        assert_eq!(f.stock().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_cancellations_restock_once() {
        let f = fixture().await;

        let tasks = (0..4).map(|_| {
            let lifecycle = f.lifecycle.clone();
            let (user_id, order_id) = (f.user_id, f.order.id());
            async move { lifecycle.cancel_order(user_id, order_id).await }
        });
        let results = futures_util::future::join_all(tasks).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(f.stock().await, 5);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let f = fixture().await;
        let missing = OrderId::new();
        let err = f
            .lifecycle
            .update_status(missing, OrderStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::OrderNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_get_order_for_user_checks_owner() {
        let f = fixture().await;
        assert!(
            f.lifecycle
                .get_order_for_user(f.user_id, f.order.id())
                .await
                .is_ok()
        );
        assert!(matches!(
            f.lifecycle
                .get_order_for_user(UserId::new(), f.order.id())
                .await,
            Err(FulfillmentError::Unauthorized)
        ));
        assert_eq!(f.lifecycle.orders_for_user(f.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tracking_code_frozen_on_terminal_order() {
        let f = fixture().await;
        let order = f
            .lifecycle
            .set_tracking_code(f.order.id(), "TRACK-1")
            .await
            .unwrap();
        assert_eq!(order.tracking_code(), Some("TRACK-1"));

        f.lifecycle.cancel_order(f.user_id, f.order.id()).await.unwrap();
        let err = f
            .lifecycle
            .set_tracking_code(f.order.id(), "TRACK-2")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::OrderClosed(OrderStatus::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_record_payment_links_without_changing_status() {
        let f = fixture().await;
        let payment = Payment::new(f.order.id(), f.order.total(), PaymentMethod::Card);

        let recorded = f.lifecycle.record_payment(payment).await.unwrap();
        let order = f.lifecycle.get_order(f.order.id()).await.unwrap();
        assert_eq!(order.payment_id(), Some(recorded.id));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(
            f.lifecycle
                .payment_for(f.order.id())
                .await
                .unwrap()
                .map(|p| p.id),
            Some(recorded.id)
        );
    }

    #[tokio::test]
    async fn test_record_payment_amount_must_match_total() {
        let f = fixture().await;
        let payment = Payment::new(f.order.id(), Money::from_cents(1), PaymentMethod::Paypal);
        let err = f.lifecycle.record_payment(payment).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }
}
