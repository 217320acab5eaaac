use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ProductId, ReservationKey};
use tokio::sync::RwLock;

use crate::{
    InventoryError, InventoryStore, NewProduct, Product, ProductUpdate, ReleaseOutcome,
    ReserveOutcome, Reservation, ReservationState, Result,
};

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    products: BTreeMap<ProductId, Product>,
    reservations: HashMap<ReservationKey, Reservation>,
    next_id: i64,
}

impl InMemoryInventoryState {
    fn increment(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        let Some(product) = self.products.get_mut(&id) else {
            return Ok(false);
        };
        product.quantity_on_hand = product
            .quantity_on_hand
            .checked_add(quantity)
            .ok_or_else(|| InventoryError::Validation(format!("stock overflow for product {id}")))?;
        product.updated_at = Utc::now();
        Ok(true)
    }
}

/// In-memory inventory store for testing and single-process deployments.
///
/// All state sits behind one lock, so every reservation is trivially atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(state.products.values().cloned().collect())
    }

    async fn insert(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(state.next_id),
            name: product.name,
            description: product.description,
            unit_price: product.unit_price,
            quantity_on_hand: product.quantity_on_hand,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Option<Product>> {
        let mut state = self.state.write().await;
        Ok(state.products.get_mut(&id).map(|product| {
            update.apply_to(product);
            product.updated_at = Utc::now();
            product.clone()
        }))
    }

    async fn delete(&self, id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.products.remove(&id).is_some())
    }

    async fn set_quantity(&self, id: ProductId, quantity: u32) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .products
            .get_mut(&id)
            .map(|product| {
                product.quantity_on_hand = quantity;
                product.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn reserve(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReserveOutcome> {
        let mut state = self.state.write().await;

        if let Some(existing) = key.and_then(|k| state.reservations.get(k)) {
            return Ok(match existing.state {
                ReservationState::Applied => ReserveOutcome::AlreadyApplied,
                ReservationState::Released => ReserveOutcome::AlreadyReleased,
            });
        }

        let Some(product) = state.products.get_mut(&id) else {
            return Ok(ReserveOutcome::ProductNotFound);
        };
        if !product.has_stock(quantity) {
            return Ok(ReserveOutcome::InsufficientStock);
        }
        product.quantity_on_hand -= quantity;
        product.updated_at = Utc::now();

        if let Some(key) = key {
            state.reservations.insert(
                key.clone(),
                Reservation {
                    key: key.clone(),
                    product_id: id,
                    quantity,
                    state: ReservationState::Applied,
                },
            );
        }
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReleaseOutcome> {
        let mut state = self.state.write().await;

        let Some(key) = key else {
            return Ok(if state.increment(id, quantity)? {
                ReleaseOutcome::Released
            } else {
                ReleaseOutcome::ProductNotFound
            });
        };

        match state.reservations.get(key).cloned() {
            Some(entry) if entry.state == ReservationState::Released => {
                Ok(ReleaseOutcome::AlreadyReleased)
            }
            Some(entry) => {
                let found = state.increment(entry.product_id, entry.quantity)?;
                if let Some(r) = state.reservations.get_mut(key) {
                    r.state = ReservationState::Released;
                }
                Ok(if found {
                    ReleaseOutcome::Released
                } else {
                    ReleaseOutcome::ProductNotFound
                })
            }
            None => {
                state.reservations.insert(
                    key.clone(),
                    Reservation {
                        key: key.clone(),
                        product_id: id,
                        quantity,
                        state: ReservationState::Released,
                    },
                );
                Ok(ReleaseOutcome::Tombstoned)
            }
        }
    }

    async fn reservation(&self, key: &ReservationKey) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.get(key).cloned())
    }
}
