//! End-to-end checkout scenarios over the in-memory store.

use domain::{Money, OrderStatus, Product, ProductId, UserId};
use fulfillment::{
    CartService, CatalogService, FulfillmentError, InventoryLedger, NewProduct, OrderAssembler,
    OrderLifecycle,
};
use store::InMemoryStore;

struct Shop {
    catalog: CatalogService<InMemoryStore>,
    ledger: InventoryLedger<InMemoryStore>,
    carts: CartService<InMemoryStore>,
    assembler: OrderAssembler<InMemoryStore>,
    lifecycle: OrderLifecycle<InMemoryStore>,
}

impl Shop {
    fn new() -> Self {
        let store = InMemoryStore::new();
        Self {
            catalog: CatalogService::new(store.clone()),
            ledger: InventoryLedger::new(store.clone()),
            carts: CartService::new(store.clone()),
            assembler: OrderAssembler::new(store.clone()),
            lifecycle: OrderLifecycle::new(store),
        }
    }

    async fn product(&self, sku: &str, cents: i64, stock: u32) -> Product {
        self.catalog
            .create_product(NewProduct {
                sku: sku.to_string(),
                name: sku.to_string(),
                description: String::new(),
                price: Money::from_cents(cents),
                stock,
            })
            .await
            .unwrap()
    }

    async fn stock(&self, id: ProductId) -> u32 {
        self.catalog.get_product(id).await.unwrap().stock
    }
}

#[tokio::test]
async fn two_products_checkout() {
    let shop = Shop::new();
    let p = shop.product("P", 1000, 5).await;
    let q = shop.product("Q", 2000, 1).await;
    let user = UserId::new();

    shop.carts.add_item(user, p.id, 2).await.unwrap();
    shop.carts.add_item(user, q.id, 1).await.unwrap();
    assert_eq!(shop.carts.get_total(user).await.unwrap(), Money::from_cents(4000));

    let order = shop
        .assembler
        .create_order(user, "1 Main St", "1 Main St")
        .await
        .unwrap();

    assert_eq!(order.total().to_string(), "$40.00");
    assert_eq!(shop.stock(p.id).await, 3);
    assert_eq!(shop.stock(q.id).await, 0);
    assert!(shop.carts.get_cart(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn out_of_stock_product_blocks_whole_order() {
    let shop = Shop::new();
    let p = shop.product("P", 1000, 5).await;
    let q = shop.product("Q", 2000, 1).await;
    let user = UserId::new();

    shop.carts.add_item(user, p.id, 2).await.unwrap();
    shop.carts.add_item(user, q.id, 1).await.unwrap();
    shop.ledger.adjust(q.id, -1).await.unwrap();

    let err = shop
        .assembler
        .create_order(user, "1 Main St", "1 Main St")
        .await
        .unwrap_err();

    assert!(matches!(&err, FulfillmentError::InsufficientStock { name, .. } if name == "Q"));
    assert_eq!(err.to_string(), "Insufficient stock for product: Q");
    assert_eq!(shop.stock(p.id).await, 5);
    assert!(shop.lifecycle.orders_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_lifecycle_to_refund() {
    let shop = Shop::new();
    let p = shop.product("P", 1500, 10).await;
    let user = UserId::new();
    shop.carts.add_item(user, p.id, 4).await.unwrap();
    let order = shop
        .assembler
        .create_order(user, "1 Main St", "9 Billing Rd")
        .await
        .unwrap();

    for status in [
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
    ] {
        shop.lifecycle.update_status(order.id(), status).await.unwrap();
    }
    shop.lifecycle
        .set_tracking_code(order.id(), "1Z999")
        .await
        .unwrap();
    let delivered = shop
        .lifecycle
        .update_status(order.id(), OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(delivered.tracking_code(), Some("1Z999"));

    let refunded = shop
        .lifecycle
        .update_status(order.id(), OrderStatus::Refunded)
        .await
        .unwrap();
    assert!(refunded.is_terminal());
    // Refunds do not return goods to stock.
    assert_eq!(shop.stock(p.id).await, 6);
}

#[tokio::test]
async fn cancel_then_reorder_uses_restored_stock() {
    let shop = Shop::new();
    let p = shop.product("P", 1000, 2).await;
    let user = UserId::new();

    shop.carts.add_item(user, p.id, 2).await.unwrap();
    let first = shop
        .assembler
        .create_order(user, "1 Main St", "1 Main St")
        .await
        .unwrap();
    assert_eq!(shop.stock(p.id).await, 0);

    shop.lifecycle.cancel_order(user, first.id()).await.unwrap();
    assert_eq!(shop.stock(p.id).await, 2);

    shop.carts.add_item(user, p.id, 2).await.unwrap();
    let second = shop
        .assembler
        .create_order(user, "1 Main St", "1 Main St")
        .await
        .unwrap();
    assert_eq!(second.status(), OrderStatus::Pending);
    assert_eq!(shop.stock(p.id).await, 0);

    let orders = shop.lifecycle.orders_for_user(user).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id(), second.id());
}

#[tokio::test]
async fn deactivated_product_blocks_checkout_but_accepts_restock() {
    let shop = Shop::new();
    let p = shop.product("P", 1000, 3).await;
    let user = UserId::new();
    shop.carts.add_item(user, p.id, 1).await.unwrap();

    shop.catalog.set_active(p.id, false).await.unwrap();
    let err = shop
        .assembler
        .create_order(user, "1 Main St", "1 Main St")
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InsufficientStock { .. }));

    let restocked = shop.ledger.adjust(p.id, 5).await.unwrap();
    assert_eq!(restocked.stock, 8);
}

#[tokio::test]
async fn randomized_concurrent_checkouts_never_oversell() {
    let shop = Shop::new();
    let p = shop.product("P", 100, 25).await;

    let mut seed: u64 = 42;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        ((seed >> 33) % 5) as i64 + 1
    };

    let mut buyers = Vec::new();
    for _ in 0..20 {
        let user = UserId::new();
        let quantity = next();
        shop.carts.add_item(user, p.id, quantity).await.unwrap();
        buyers.push((user, quantity));
    }

    let tasks = buyers.iter().map(|&(user, quantity)| {
        let assembler = shop.assembler.clone();
        async move {
            assembler
                .create_order(user, "1 Main St", "1 Main St")
                .await
                .ok()
                .map(|_| quantity as u32)
        }
    });
    let sold: u32 = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .flatten()
        .sum();

    assert!(sold <= 25);
    assert_eq!(shop.stock(p.id).await, 25 - sold);
}
