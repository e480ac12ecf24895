use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    Cart, CartId, CartLine, LifecycleError, Money, Order, OrderId, OrderLine, OrderParts,
    OrderStatus, Payment, PaymentId, Product, ProductId, StockError, UserId,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        CartRepository, OrderRepository, PaymentRepository, ProductRepository, Store,
        StoreTransaction,
    },
};

/// How often a refused stock update is re-checked before giving up.
///
/// A refusal whose re-read shows the adjustment would now succeed means the
/// row changed in between; the update is simply tried again.
const STOCK_ADJUST_ATTEMPTS: usize = 3;

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRow(format!("{column} out of range: {value}")))
}

fn parse_column<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::InvalidRow(e.to_string()))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: to_u32(row.try_get("stock")?, "stock")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
    Ok(CartLine {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order::from_parts(OrderParts {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        lines,
        total: Money::from_cents(row.try_get("total_cents")?),
        status: parse_column(&status)?,
        shipping_address: row.try_get("shipping_address")?,
        billing_address: row.try_get("billing_address")?,
        tracking_code: row.try_get("tracking_code")?,
        payment_id: row
            .try_get::<Option<Uuid>, _>("payment_id")?
            .map(PaymentId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let method: String = row.try_get("method")?;
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        currency: row.try_get("currency")?,
        method: parse_column(&method)?,
        status: parse_column(&status)?,
        external_id: row.try_get("external_id")?,
        failure_reason: row.try_get("failure_reason")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn fetch_product(conn: &mut PgConnection, id: ProductId) -> Result<Option<Product>> {
    let row = sqlx::query(
        r#"
        SELECT id, sku, name, description, price_cents, stock, is_active, created_at, updated_at
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_product).transpose()
}

/// Conditional update: the stock only moves if the result stays within
/// `0..=u32::MAX` and, for reservations, the product is active. A refused
/// update is re-read to report the reason.
async fn adjust_stock_on(conn: &mut PgConnection, id: ProductId, delta: i64) -> Result<Product> {
    // No delta beyond the u32 range can apply, and `stock + $2` would
    // overflow BIGINT for the extreme ones.
    if u32::try_from(delta.unsigned_abs()).is_err() {
        let product = fetch_product(conn, id)
            .await?
            .ok_or(StockError::ProductNotFound(id))?;
        product.check_adjustment(delta)?;
    }

    for _ in 0..STOCK_ADJUST_ATTEMPTS {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
              AND stock + $2 BETWEEN 0 AND 4294967295
              AND (is_active OR $2 >= 0)
            RETURNING id, sku, name, description, price_cents, stock, is_active, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            return row_to_product(&row);
        }

        let product = fetch_product(conn, id)
            .await?
            .ok_or(StockError::ProductNotFound(id))?;
        product.check_adjustment(delta)?;
        tracing::debug!(product_id = %id, delta, "Stock changed during adjustment, retrying");
    }

    Err(StoreError::Unavailable(format!(
        "stock of product {id} kept changing during adjustment"
    )))
}

async fn touch_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<()> {
    let result = sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id.as_uuid())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("cart", cart_id));
    }
    Ok(())
}

async fn hydrate_cart(conn: &mut PgConnection, row: PgRow) -> Result<Cart> {
    let id = CartId::from_uuid(row.try_get::<Uuid, _>("id")?);
    let items = sqlx::query(
        r#"
        SELECT product_id, quantity, unit_price_cents, added_at
        FROM cart_items
        WHERE cart_id = $1
        ORDER BY added_at ASC, product_id ASC
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let lines = items
        .iter()
        .map(row_to_cart_line)
        .collect::<Result<Vec<_>>>()?;

    Ok(Cart::from_parts(
        id,
        UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        lines,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

/// Loads a user's cart. With `lock`, the cart row stays locked until the
/// surrounding transaction ends; every line write touches that row first.
async fn fetch_cart_by_user(
    conn: &mut PgConnection,
    user_id: UserId,
    lock: bool,
) -> Result<Option<Cart>> {
    let sql = if lock {
        "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1 FOR UPDATE"
    } else {
        "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1"
    };
    let row = sqlx::query(sql)
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate_cart(conn, row).await?)),
        None => Ok(None),
    }
}

async fn fetch_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<Option<Cart>> {
    let row = sqlx::query("SELECT id, user_id, created_at, updated_at FROM carts WHERE id = $1")
        .bind(cart_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate_cart(conn, row).await?)),
        None => Ok(None),
    }
}

async fn clear_cart_on(conn: &mut PgConnection, cart_id: CartId) -> Result<()> {
    touch_cart(conn, cart_id).await?;
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id.as_uuid())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn hydrate_orders(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
    let ids = rows
        .iter()
        .map(|row| row.try_get::<Uuid, _>("id"))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let item_rows = sqlx::query(
        r#"
        SELECT order_id, product_id, product_name, quantity, unit_price_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, line_no ASC
        "#,
    )
    .bind(ids.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in &item_rows {
        let order_id: Uuid = row.try_get("order_id")?;
        lines
            .entry(order_id)
            .or_default()
            .push(row_to_order_line(row)?);
    }

    rows.iter()
        .zip(ids)
        .map(|(row, id)| row_to_order(row, lines.remove(&id).unwrap_or_default()))
        .collect()
}

async fn insert_order_on(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, status, total_cents, shipping_address, billing_address,
                            tracking_code, payment_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(order.id().as_uuid())
    .bind(order.user_id().as_uuid())
    .bind(order.status().as_str())
    .bind(order.total().cents())
    .bind(order.shipping_address())
    .bind(order.billing_address())
    .bind(order.tracking_code())
    .bind(order.payment_id().map(|id| id.as_uuid()))
    .bind(order.created_at())
    .bind(order.updated_at())
    .execute(&mut *conn)
    .await?;

    for (line_no, line) in order.lines().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, line_no, product_id, product_name, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(line_no as i32)
        .bind(line.product_id.as_uuid())
        .bind(&line.product_name)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.cents())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn update_order_status_on(
    conn: &mut PgConnection,
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

    let result = sqlx::query(
        "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
    )
    .bind(id.as_uuid())
    .bind(expected.as_str())
    .bind(next.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let actual: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match actual {
        Some(actual) => Err(StoreError::StatusConflict {
            order_id: id,
            expected,
            actual: parse_column(&actual)?,
        }),
        None => Err(StoreError::not_found("order", id)),
    }
}

/// Writes order metadata unless the stored order is already terminal.
async fn update_order_on(conn: &mut PgConnection, order: &Order) -> Result<()> {
    let terminal: Vec<&str> = OrderStatus::ALL
        .iter()
        .filter(|status| status.is_terminal())
        .map(|status| status.as_str())
        .collect();

    let result = sqlx::query(
        r#"
        UPDATE orders
        SET tracking_code = $2, payment_id = $3, updated_at = $4
        WHERE id = $1 AND status <> ALL($5)
        "#,
    )
    .bind(order.id().as_uuid())
    .bind(order.tracking_code())
    .bind(order.payment_id().map(|id| id.as_uuid()))
    .bind(order.updated_at())
    .bind(terminal.as_slice())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(order.id().as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match status {
        Some(status) => Err(LifecycleError::Closed {
            status: parse_column(&status)?,
        }
        .into()),
        None => Err(StoreError::not_found("order", order.id())),
    }
}

async fn insert_payment_on(conn: &mut PgConnection, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, amount_cents, currency, method, status, external_id,
                              failure_reason, processed_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.order_id.as_uuid())
    .bind(payment.amount.cents())
    .bind(&payment.currency)
    .bind(payment.method.as_str())
    .bind(payment.status.as_str())
    .bind(&payment.external_id)
    .bind(&payment.failure_reason)
    .bind(payment.processed_at)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_foreign_key_violation()
        {
            return StoreError::not_found("order", payment.order_id);
        }
        StoreError::Database(e)
    })?;

    Ok(())
}

fn map_product_write_error(e: sqlx::Error, sku: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some("products_sku_unique")
    {
        return StoreError::DuplicateSku(sku.to_string());
    }
    StoreError::Database(e)
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn create_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, description, price_cents, stock, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_product_write_error(e, &product.sku))?;

        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, description, price_cents, stock, is_active, created_at, updated_at
            FROM products
            WHERE sku = $1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET sku = $2, name = $3, description = $4, price_cents = $5, is_active = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_product_write_error(e, &product.sku))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product.id));
        }
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }
}

#[async_trait]
impl CartRepository for PostgresStore {
    async fn create_cart(&self, cart: &Cart) -> Result<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.user_id().as_uuid())
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&self.pool)
        .await?;

        self.get_cart_by_user(cart.user_id())
            .await?
            .ok_or_else(|| StoreError::not_found("cart for user", cart.user_id()))
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        fetch_cart(&mut conn, id).await
    }

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        fetch_cart_by_user(&mut conn, user_id, false).await
    }

    async fn merge_cart_line(&self, cart_id: CartId, line: &CartLine) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        touch_cart(&mut tx, cart_id).await?;

        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity, unit_price_cents, added_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cart_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.cents())
        .bind(line.added_at)
        .execute(&mut *tx)
        .await?;

        let cart = fetch_cart(&mut tx, cart_id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn set_cart_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        touch_cart(&mut tx, cart_id).await?;

        let result = if quantity == 0 {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_uuid())
                .bind(product_id.as_uuid())
                .execute(&mut *tx)
                .await?
        } else {
            sqlx::query(
                "UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2",
            )
            .bind(cart_id.as_uuid())
            .bind(product_id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *tx)
            .await?
        };
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cart line", product_id));
        }

        let cart = fetch_cart(&mut tx, cart_id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_cart_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        touch_cart(&mut tx, cart_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        let cart = fetch_cart(&mut tx, cart_id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        clear_cart_on(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, cart_id: CartId) -> Result<()> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cart", cart_id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, total_cents, shipping_address, billing_address,
                   tracking_code, payment_id, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        Ok(hydrate_orders(&mut conn, rows).await?.into_iter().next())
    }

    async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, total_cents, shipping_address, billing_address,
                   tracking_code, payment_id, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        hydrate_orders(&mut conn, rows).await
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        update_order_on(&mut conn, order).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        update_order_status_on(&mut conn, id, expected, next).await
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_payment_on(&mut conn, payment).await
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, currency, method, status, external_id,
                   failure_reason, processed_at, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, currency, method, status, external_id,
                   failure_reason, processed_at, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, external_id = $3, failure_reason = $4, processed_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.external_id)
        .bind(&payment.failure_reason)
        .bind(payment.processed_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("payment", payment.id));
        }
        Ok(())
    }
}

/// Transaction over a [`PostgresStore`]. Rolled back on drop unless committed.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        fetch_product(&mut self.tx, id).await
    }

    async fn get_cart_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        fetch_cart_by_user(&mut self.tx, user_id, true).await
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<Product> {
        adjust_stock_on(&mut self.tx, id, delta).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        insert_order_on(&mut self.tx, order).await
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        update_order_status_on(&mut self.tx, id, expected, next).await
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<()> {
        clear_cart_on(&mut self.tx, cart_id).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        update_order_on(&mut self.tx, order).await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        insert_payment_on(&mut self.tx, payment).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }
}
