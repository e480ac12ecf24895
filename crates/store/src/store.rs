use async_trait::async_trait;
use domain::{
    Cart, CartId, CartLine, Order, OrderId, OrderStatus, Payment, PaymentId, Product, ProductId,
    UserId,
};

use crate::Result;

/// Catalog persistence.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Inserts a product. Fails with `DuplicateSku` if the SKU is taken.
    async fn create_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>>;

    /// Writes the catalog fields of a product (sku, name, description, price,
    /// active flag).
    ///
    /// Stock is never written here; it only changes through
    /// [`StoreTransaction::adjust_stock`].
    async fn update_product(&self, product: &Product) -> Result<()>;

    async fn delete_product(&self, id: ProductId) -> Result<()>;
}

/// Cart persistence. All line operations address one cart.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Inserts `cart` unless its user already has one.
    ///
    /// Returns the user's cart either way, so concurrent first adds end up
    /// sharing a single cart.
    async fn create_cart(&self, cart: &Cart) -> Result<Cart>;

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Adds a line, merging into the existing line for the same product as
    /// one atomic step. On merge the existing unit price is kept.
    async fn merge_cart_line(&self, cart_id: CartId, line: &CartLine) -> Result<Cart>;

    /// Overwrites a line's quantity. Fails with `NotFound` if the line is absent.
    async fn set_cart_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart>;

    /// Removes a line if present.
    async fn remove_cart_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart>;

    /// Removes every line; the cart row itself is kept.
    async fn clear_cart(&self, cart_id: CartId) -> Result<()>;

    async fn delete_cart(&self, cart_id: CartId) -> Result<()>;
}

/// Order persistence. Orders are created through [`StoreTransaction::insert_order`]
/// and never deleted.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Returns every order of a user, newest first.
    async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Writes the post-creation metadata of an order (tracking code, payment
    /// reference). Lines, total and status are left untouched.
    ///
    /// Fails with `Transition(Closed)` if the stored order is already
    /// terminal, whatever the status of `order` says.
    async fn update_order(&self, order: &Order) -> Result<()>;

    /// Compare-and-set of the order status.
    ///
    /// Fails with `StatusConflict` if the stored status is not `expected`, and
    /// with `Transition` if `expected -> next` is not in the transition table.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()>;
}

/// Payment record persistence.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Returns the most recent payment recorded for an order.
    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn update_payment(&self, payment: &Payment) -> Result<()>;
}

/// A unit of work spanning several writes.
///
/// Nothing done through a transaction is visible to other callers until
/// [`commit`](StoreTransaction::commit). Dropping it without committing rolls
/// everything back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Reads a user's cart and locks it until the transaction ends.
    ///
    /// Line changes from other callers wait for the commit, so clearing the
    /// cart later in the transaction removes exactly the lines read here.
    async fn get_cart_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Atomically adds `delta` to a product's stock and returns the updated
    /// product.
    ///
    /// Refusals follow [`Product::check_adjustment`] and are reported as
    /// `StoreError::Stock`. Concurrent adjustments of the same product are
    /// serialized.
    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<Product>;

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Same contract as [`OrderRepository::update_order_status`].
    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()>;

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<()>;

    /// Same contract as [`OrderRepository::update_order`].
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Same contract as [`PaymentRepository::create_payment`].
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Makes every write of this transaction visible at once.
    async fn commit(self) -> Result<()>;
}

/// A complete backend: every repository plus transactions.
#[async_trait]
pub trait Store:
    ProductRepository + CartRepository + OrderRepository + PaymentRepository + Clone + 'static
{
    type Tx: StoreTransaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}
