//! Catalog maintenance. Stock is never written here; see [`InventoryLedger`].
//!
//! [`InventoryLedger`]: crate::InventoryLedger

use chrono::Utc;
use domain::{Money, Product, ProductId};
use store::Store;

use crate::error::{FulfillmentError, Result};

/// Input for [`CatalogService::create_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
}

/// Partial update of a product's catalog fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let mut product = Product::new(input.sku.trim(), input.name.trim(), input.price, input.stock);
        product.description = input.description;
        validate(&product)?;

        self.store.create_product(&product).await?;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(FulfillmentError::ProductNotFound(product_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        if let Some(sku) = update.sku {
            product.sku = sku.trim().to_string();
        }
        if let Some(name) = update.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(is_active) = update.is_active {
            product.is_active = is_active;
        }
        validate(&product)?;
        product.updated_at = Utc::now();

        match self.store.update_product(&product).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return Err(FulfillmentError::ProductNotFound(product_id));
            }
            Err(e) => return Err(e.into()),
        }
        // Re-read so the returned stock is current.
        self.get_product(product_id).await
    }

    /// Activates or deactivates a product. Inactive products cannot be
    /// reserved but still accept restocks.
    pub async fn set_active(&self, product_id: ProductId, is_active: bool) -> Result<Product> {
        self.update_product(
            product_id,
            ProductUpdate {
                is_active: Some(is_active),
                ..ProductUpdate::default()
            },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, product_id: ProductId) -> Result<()> {
        match self.store.delete_product(product_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(FulfillmentError::ProductNotFound(product_id)),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate(product: &Product) -> Result<()> {
    if product.sku.is_empty() {
        return Err(FulfillmentError::Validation("sku is required".to_string()));
    }
    if product.name.is_empty() {
        return Err(FulfillmentError::Validation("name is required".to_string()));
    }
    if !product.price.is_positive() {
        return Err(FulfillmentError::Validation(
            "price must be greater than zero".to_string(),
        ));
    }
    if product.price > Product::MAX_PRICE {
        return Err(FulfillmentError::Validation(format!(
            "price must not exceed {}",
            Product::MAX_PRICE
        )));
    }
    Ok(())
}
