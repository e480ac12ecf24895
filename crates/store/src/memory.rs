use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Cart, CartId, CartLine, LifecycleError, Order, OrderId, OrderStatus, Payment, PaymentId,
    Product, ProductId, StockError, UserId,
};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{
        CartRepository, OrderRepository, PaymentRepository, ProductRepository, Store,
        StoreTransaction,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    failing_products: HashSet<ProductId>,
}

impl MemoryState {
    fn cart_by_user(&self, user_id: UserId) -> Option<&Cart> {
        self.carts.values().find(|c| c.user_id() == user_id)
    }

    fn cart_mut(&mut self, cart_id: CartId) -> Result<&mut Cart> {
        self.carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))
    }

    fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<Product> {
        if self.failing_products.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "stock adjustments disabled for product {id}"
            )));
        }
        let product = self
            .products
            .get_mut(&id)
            .ok_or(StockError::ProductNotFound(id))?;
        product.apply_adjustment(delta)?;
        Ok(product.clone())
    }

    fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        if !expected.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: expected,
                to: next,
            }
            .into());
        }
        let order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        if order.status() != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status(),
            });
        }
        order.transition_to(next)?;
        Ok(())
    }

    fn clear_cart(&mut self, cart_id: CartId) -> Result<()> {
        self.cart_mut(cart_id)?.clear();
        Ok(())
    }

    fn update_order(&mut self, order: &Order) -> Result<()> {
        let stored = self
            .orders
            .get_mut(&order.id())
            .ok_or_else(|| StoreError::not_found("order", order.id()))?;
        if stored.is_terminal() {
            return Err(LifecycleError::Closed {
                status: stored.status(),
            }
            .into());
        }

        let mut parts = stored.clone().into_parts();
        parts.tracking_code = order.tracking_code().map(str::to_owned);
        parts.payment_id = order.payment_id();
        parts.updated_at = order.updated_at();
        *stored = Order::from_parts(parts);
        Ok(())
    }

    fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if !self.orders.contains_key(&payment.order_id) {
            return Err(StoreError::not_found("order", payment.order_id));
        }
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }
}

/// In-memory store implementation for tests and the default API binary.
///
/// Provides the same interface and atomicity as the PostgreSQL store. An open
/// [`InMemoryTransaction`] holds the write lock, so every other access waits
/// until it is committed or dropped.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every stock adjustment of `product_id` fail with
    /// `StoreError::Unavailable` (or lifts that again with `fail = false`).
    pub async fn fail_stock_adjustments(&self, product_id: ProductId, fail: bool) {
        let mut state = self.state.write().await;
        if fail {
            state.failing_products.insert(product_id);
        } else {
            state.failing_products.remove(&product_id);
        }
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Removes all data.
    pub async fn clear(&self) {
        *self.state.write().await = MemoryState::default();
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn create_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::DuplicateSku(product.sku.clone()));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.values().find(|p| p.sku == sku).cloned())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .products
            .values()
            .any(|p| p.sku == product.sku && p.id != product.id)
        {
            return Err(StoreError::DuplicateSku(product.sku.clone()));
        }
        let stored = state
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::not_found("product", product.id))?;
        let stock = stored.stock;
        *stored = product.clone();
        stored.stock = stock;
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("product", id))
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn create_cart(&self, cart: &Cart) -> Result<Cart> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.cart_by_user(cart.user_id()) {
            return Ok(existing.clone());
        }
        state.carts.insert(cart.id(), cart.clone());
        Ok(cart.clone())
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&id).cloned())
    }

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.cart_by_user(user_id).cloned())
    }

    async fn merge_cart_line(&self, cart_id: CartId, line: &CartLine) -> Result<Cart> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        cart.add_line(line.clone());
        Ok(cart.clone())
    }

    async fn set_cart_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        if !cart.set_quantity(product_id, quantity) {
            return Err(StoreError::not_found("cart line", product_id));
        }
        Ok(cart.clone())
    }

    async fn remove_cart_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        cart.remove_line(product_id);
        Ok(cart.clone())
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<()> {
        self.state.write().await.clear_cart(cart_id)
    }

    async fn delete_cart(&self, cart_id: CartId) -> Result<()> {
        self.state
            .write()
            .await
            .carts
            .remove(&cart_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("cart", cart_id))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.state.write().await.update_order(order)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .update_order_status(id, expected, next)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        self.state.write().await.insert_payment(payment)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| StoreError::not_found("payment", payment.id))?;
        *stored = payment.clone();
        Ok(())
    }
}

/// Transaction over an [`InMemoryStore`].
///
/// Writes go to a staged copy of the state while the write lock is held;
/// `commit` swaps the copy in, dropping discards it.
pub struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn get_cart_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.staged.cart_by_user(user_id).cloned())
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<Product> {
        self.staged.adjust_stock(id, delta)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        self.staged.update_order_status(id, expected, next)
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<()> {
        self.staged.clear_cart(cart_id)
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        self.staged.update_order(order)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        self.staged.insert_payment(payment)
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTransaction { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = Arc::clone(&self.state).write_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction { guard, staged })
    }
}
