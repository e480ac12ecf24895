//! Cart manager.

use domain::{Cart, CartLine, Money, Product, ProductId, UserId};
use store::Store;

use crate::error::{FulfillmentError, Result};

/// Per-user working set of (product, quantity, price-at-add) lines.
///
/// Availability checks here are hints for the customer; nothing is reserved
/// until the order is assembled.
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, creating an empty one on first use.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.store.get_cart_by_user(user_id).await? {
            return Ok(cart);
        }
        // Concurrent first calls converge on the cart the store keeps.
        let cart = self.store.create_cart(&Cart::new(user_id)).await?;
        tracing::debug!(cart_id = %cart.id(), "Cart created");
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        self.store
            .get_cart_by_user(user_id)
            .await?
            .ok_or(FulfillmentError::CartNotFound(user_id))
    }

    /// Adds `quantity` units of a product, merging into an existing line.
    ///
    /// The product must be able to supply what the cart would then hold. A
    /// merged line keeps the price captured on its first addition.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart> {
        if quantity <= 0 {
            return Err(FulfillmentError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }
        let quantity = to_quantity(quantity)?;
        let product = self.load_product(product_id).await?;
        let cart = self.get_or_create(user_id).await?;

        let wanted = cart.quantity_of(product_id).saturating_add(quantity);
        ensure_available(&product, wanted)?;

        let line = CartLine::new(product_id, quantity, product.price);
        let mut next = cart.clone();
        next.add_line(line.clone());
        ensure_priced(&next)?;

        let cart = self.store.merge_cart_line(cart.id(), &line).await?;

        metrics::counter!("cart_items_added_total").increment(u64::from(quantity));
        tracing::info!(%product_id, quantity, "Item added to cart");
        Ok(cart)
    }

    /// Overwrites a line's quantity. A quantity of zero or less removes it.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart> {
        let cart = self.get_cart(user_id).await?;
        if quantity <= 0 {
            return Ok(self.store.remove_cart_line(cart.id(), product_id).await?);
        }
        let quantity = to_quantity(quantity)?;

        if cart.line(product_id).is_none() {
            return Err(FulfillmentError::CartLineNotFound(product_id));
        }
        let product = self.load_product(product_id).await?;
        ensure_available(&product, quantity)?;

        let mut next = cart.clone();
        next.set_quantity(product_id, quantity);
        ensure_priced(&next)?;

        match self
            .store
            .set_cart_line_quantity(cart.id(), product_id, quantity)
            .await
        {
            Ok(cart) => Ok(cart),
            Err(e) if e.is_not_found() => Err(FulfillmentError::CartLineNotFound(product_id)),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<Cart> {
        let cart = self.get_cart(user_id).await?;
        Ok(self.store.remove_cart_line(cart.id(), product_id).await?)
    }

    /// Removes every line. The cart itself is kept.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart> {
        let cart = self.get_cart(user_id).await?;
        self.store.clear_cart(cart.id()).await?;
        self.get_cart(user_id).await
    }

    /// Cart total; zero for a user without a cart.
    pub async fn get_total(&self, user_id: UserId) -> Result<Money> {
        match self.store.get_cart_by_user(user_id).await? {
            Some(cart) => ensure_priced(&cart),
            None => Ok(Money::zero()),
        }
    }

    /// Number of units in the cart; zero for a user without a cart.
    pub async fn get_item_count(&self, user_id: UserId) -> Result<u32> {
        Ok(self
            .store
            .get_cart_by_user(user_id)
            .await?
            .map_or(0, |cart| cart.item_count()))
    }

    async fn load_product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(FulfillmentError::ProductNotFound(product_id))
    }
}

fn to_quantity(quantity: i64) -> Result<u32> {
    u32::try_from(quantity)
        .map_err(|_| FulfillmentError::Validation(format!("quantity {quantity} is out of range")))
}

fn ensure_priced(cart: &Cart) -> Result<Money> {
    cart.total()
        .ok_or_else(|| FulfillmentError::Validation("cart total is too large".to_string()))
}

fn ensure_available(product: &Product, quantity: u32) -> Result<()> {
    if product.can_fulfill(quantity) {
        return Ok(());
    }
    Err(FulfillmentError::InsufficientStock {
        product_id: product.id,
        name: product.name.clone(),
        requested: quantity,
        available: if product.is_active { product.stock } else { 0 },
    })
}

#[cfg(test)]
mod tests {
    use store::{InMemoryStore, ProductRepository};

    use super::*;

    async fn setup() -> (InMemoryStore, CartService<InMemoryStore>) {
        let store = InMemoryStore::new();
        (store.clone(), CartService::new(store))
    }

    async fn seed(store: &InMemoryStore, sku: &str, cents: i64, stock: u32) -> Product {
        let product = Product::new(sku, format!("Product {sku}"), Money::from_cents(cents), stock);
        store.create_product(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (_, carts) = setup().await;
        let user_id = UserId::new();

        let first = carts.get_or_create(user_id).await.unwrap();
        let second = carts.get_or_create(user_id).await.unwrap();
        assert_eq!(first.id(), second.id());
        assert!(first.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_cart() {
        let (_, carts) = setup().await;
        let user_id = UserId::new();

        let tasks = (0..8).map(|_| {
            let carts = carts.clone();
            async move { carts.get_or_create(user_id).await.unwrap().id() }
        });
        let ids = futures_util::future::join_all(tasks).await;
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_add_same_product_twice_merges() {
        let (store, carts) = setup().await;
        let product = seed(&store, "P", 1000, 10).await;
        let user_id = UserId::new();

        carts.add_item(user_id, product.id, 2).await.unwrap();

        let mut repriced = product.clone();
        repriced.price = Money::from_cents(1500);
        store.update_product(&repriced).await.unwrap();

        let cart = carts.add_item(user_id, product.id, 3).await.unwrap();
        assert_eq!(cart.lines().len(), 1);
        let line = cart.line(product.id).unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(line.unit_price, Money::from_cents(1000));
        assert_eq!(carts.get_total(user_id).await.unwrap(), Money::from_cents(5000));
        assert_eq!(carts.get_item_count(user_id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_add_checks_existing_plus_requested() {
        let (store, carts) = setup().await;
        let product = seed(&store, "P", 1000, 5).await;
        let user_id = UserId::new();

        carts.add_item(user_id, product.id, 4).await.unwrap();
        let err = carts.add_item(user_id, product.id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock {
                requested: 6,
                available: 5,
                ..
            }
        ));
        assert_eq!(carts.get_cart(user_id).await.unwrap().quantity_of(product.id), 4);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_input() {
        let (store, carts) = setup().await;
        let product = seed(&store, "P", 1000, 5).await;
        let user_id = UserId::new();

        let err = carts.add_item(user_id, product.id, 0).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
        let err = carts.add_item(user_id, product.id, -2).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));

        let missing = ProductId::new();
        let err = carts.add_item(user_id, missing, 1).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::ProductNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_add_inactive_product_is_insufficient() {
        let (store, carts) = setup().await;
        let mut product = seed(&store, "P", 1000, 5).await;
        product.is_active = false;
        store.update_product(&product).await.unwrap();

        let err = carts.add_item(UserId::new(), product.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock { available: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_total_that_would_overflow_is_rejected() {
        let (store, carts) = setup().await;
        let pricey = seed(&store, "P", i64::MAX / 2, 5).await;
        let user_id = UserId::new();

        let err = carts.add_item(user_id, pricey.id, 3).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
        assert!(carts.get_cart(user_id).await.unwrap().is_empty());

        carts.add_item(user_id, pricey.id, 1).await.unwrap();
        let err = carts.update_item(user_id, pricey.id, 3).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
        assert_eq!(carts.get_cart(user_id).await.unwrap().quantity_of(pricey.id), 1);
        assert_eq!(
            carts.get_total(user_id).await.unwrap(),
            Money::from_cents(i64::MAX / 2)
        );
    }

    #[tokio::test]
    async fn test_update_item_overwrites_and_removes() {
        let (store, carts) = setup().await;
        let product = seed(&store, "P", 1000, 5).await;
        let user_id = UserId::new();
        carts.add_item(user_id, product.id, 1).await.unwrap();

        let cart = carts.update_item(user_id, product.id, 4).await.unwrap();
        assert_eq!(cart.quantity_of(product.id), 4);

        let err = carts.update_item(user_id, product.id, 6).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::InsufficientStock { .. }));

        let cart = carts.update_item(user_id, product.id, 0).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_update_item_errors() {
        let (store, carts) = setup().await;
        let product = seed(&store, "P", 1000, 5).await;
        let user_id = UserId::new();

        let err = carts.update_item(user_id, product.id, 1).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::CartNotFound(_)));

        carts.get_or_create(user_id).await.unwrap();
        let err = carts.update_item(user_id, product.id, 1).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::CartLineNotFound(id) if id == product.id));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (store, carts) = setup().await;
        let p = seed(&store, "P", 1000, 5).await;
        let q = seed(&store, "Q", 2000, 5).await;
        let user_id = UserId::new();

        assert!(matches!(
            carts.clear(user_id).await.unwrap_err(),
            FulfillmentError::CartNotFound(_)
        ));

        carts.add_item(user_id, p.id, 1).await.unwrap();
        carts.add_item(user_id, q.id, 2).await.unwrap();

        let cart = carts.remove_item(user_id, p.id).await.unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total(), Some(Money::from_cents(4000)));

        let cart = carts.clear(user_id).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(carts.get_total(user_id).await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn test_concurrent_adds_do_not_lose_updates() {
        let (store, carts) = setup().await;
        let product = seed(&store, "P", 1000, 100).await;
        let user_id = UserId::new();

        let tasks = (0..10).map(|_| {
            let carts = carts.clone();
            async move { carts.add_item(user_id, product.id, 3).await.unwrap() }
        });
        futures_util::future::join_all(tasks).await;

        let cart = carts.get_cart(user_id).await.unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(product.id), 30);
    }
}
