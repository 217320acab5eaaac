//! Inventory service: the only writer of product stock.

use std::sync::Arc;

use common::{ProductId, ReservationKey};

use crate::{
    InventoryError, InventoryStore, NewProduct, Product, ProductUpdate, ReleaseOutcome,
    ReserveOutcome, Reservation, Result,
};

/// Service wrapping an [`InventoryStore`] with validation, logging and metrics.
pub struct InventoryService<S: InventoryStore + ?Sized> {
    store: Arc<S>,
}

impl<S: InventoryStore + ?Sized> Clone for InventoryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: InventoryStore + ?Sized> InventoryService<S> {
    /// Creates a new inventory service over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns a product, or `ProductNotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get(id)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))
    }

    /// Lists all products.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.store.list().await
    }

    /// Returns true iff the product exists and has at least `quantity` on hand.
    ///
    /// Read-only and advisory: the answer may be stale by the time a
    /// reservation is attempted.
    #[tracing::instrument(skip(self))]
    pub async fn check_availability(&self, id: ProductId, quantity: u32) -> Result<bool> {
        Ok(self
            .store
            .get(id)
            .await?
            .is_some_and(|p| p.has_stock(quantity)))
    }

    /// Atomically reserves `quantity` units.
    ///
    /// Never fails for a missing product or short stock; those are reported
    /// through the outcome.
    #[tracing::instrument(skip(self, key), fields(reservation_key = key.map(|k| k.as_str())))]
    pub async fn reserve_stock(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReserveOutcome> {
        if quantity == 0 {
            return Err(InventoryError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let outcome = self.store.reserve(id, quantity, key).await?;

        metrics::counter!("stock_reservations_total", "outcome" => outcome.as_str()).increment(1);
        if outcome.is_success() {
            tracing::info!(product_id = %id, quantity, outcome = outcome.as_str(), "Stock reserved");
        } else {
            tracing::warn!(product_id = %id, quantity, outcome = outcome.as_str(), "Stock not reserved");
        }

        Ok(outcome)
    }

    /// Returns `quantity` units to stock, or releases a keyed reservation.
    #[tracing::instrument(skip(self, key), fields(reservation_key = key.map(|k| k.as_str())))]
    pub async fn release_stock(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReleaseOutcome> {
        if quantity == 0 {
            return Err(InventoryError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let outcome = self.store.release(id, quantity, key).await?;

        metrics::counter!("stock_releases_total", "outcome" => outcome.as_str()).increment(1);
        tracing::info!(product_id = %id, quantity, outcome = outcome.as_str(), "Stock released");

        Ok(outcome)
    }

    /// Creates a product.
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let product = self.store.insert(product).await?;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Applies a partial update to a product.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;
        let product = self
            .store
            .update(id, update)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))?;
        tracing::info!(product_id = %id, "Product updated");
        Ok(product)
    }

    /// Deletes a product.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(InventoryError::ProductNotFound(id));
        }
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Overwrites a product's stock level.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        if !self.store.set_quantity(id, quantity).await? {
            return Err(InventoryError::ProductNotFound(id));
        }
        tracing::info!(product_id = %id, quantity, "Stock level set");
        Ok(())
    }

    /// Returns the ledger entry for a reservation key.
    pub async fn reservation(&self, key: &ReservationKey) -> Result<Option<Reservation>> {
        self.store.reservation(key).await
    }
}
