use async_trait::async_trait;
use common::{ProductId, ReservationKey};
use serde::{Deserialize, Serialize};

use crate::{NewProduct, Product, ProductUpdate, Result};

/// Outcome of a stock reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveOutcome {
    /// Stock was decremented by this call.
    Reserved,
    /// The key was already applied earlier; nothing changed.
    AlreadyApplied,
    /// The key was already released (or tombstoned); nothing changed.
    AlreadyReleased,
    /// Not enough stock on hand; nothing changed.
    InsufficientStock,
    /// The product does not exist; nothing changed.
    ProductNotFound,
}

impl ReserveOutcome {
    /// Returns true if the reservation is in effect after the call.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reserved | Self::AlreadyApplied)
    }

    /// Returns the outcome as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::AlreadyApplied => "already_applied",
            Self::AlreadyReleased => "already_released",
            Self::InsufficientStock => "insufficient_stock",
            Self::ProductNotFound => "product_not_found",
        }
    }
}

/// Outcome of a stock release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Stock was incremented by this call.
    Released,
    /// The key was already released; nothing changed.
    AlreadyReleased,
    /// The key was unknown, so a released marker was written without touching
    /// stock. A later reserve with the same key will be a no-op.
    Tombstoned,
    /// The product does not exist; nothing changed.
    ProductNotFound,
}

impl ReleaseOutcome {
    /// Returns the outcome as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::AlreadyReleased => "already_released",
            Self::Tombstoned => "tombstoned",
            Self::ProductNotFound => "product_not_found",
        }
    }
}

/// State of a keyed reservation in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Stock is held for this key.
    Applied,
    /// Stock was returned, or the key was closed before it was ever applied.
    Released,
}

impl ReservationState {
    /// Returns the state as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Released => "released",
        }
    }

    /// Parses the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(Self::Applied),
            "released" => Some(Self::Released),
            _ => None,
        }
    }
}

/// A ledger entry for a keyed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub key: ReservationKey,
    pub product_id: ProductId,
    pub quantity: u32,
    pub state: ReservationState,
}

/// Storage for products and the reservation ledger.
///
/// `reserve` and `release` are the only operations that change stock as part
/// of order fulfilment, and each must be atomic: the availability check, the
/// quantity change and the ledger write happen as one step with respect to
/// every other call on the same store.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Returns a product by ID.
    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    /// Returns all products ordered by ID.
    async fn list(&self) -> Result<Vec<Product>>;

    /// Inserts a product and assigns its ID.
    async fn insert(&self, product: NewProduct) -> Result<Product>;

    /// Applies a partial update. Returns None if the product does not exist.
    async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Option<Product>>;

    /// Deletes a product. Returns false if it did not exist.
    async fn delete(&self, id: ProductId) -> Result<bool>;

    /// Overwrites the stock level. Returns false if the product does not exist.
    async fn set_quantity(&self, id: ProductId, quantity: u32) -> Result<bool>;

    /// Decrements stock by `quantity` iff at least that much is on hand.
    ///
    /// With a key, the ledger is consulted first and a known key never
    /// mutates stock again.
    async fn reserve(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReserveOutcome>;

    /// Increments stock by `quantity`.
    ///
    /// With a key, only an applied reservation is returned, using the
    /// quantity and product recorded in the ledger.
    async fn release(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReleaseOutcome>;

    /// Returns the ledger entry for a key.
    async fn reservation(&self, key: &ReservationKey) -> Result<Option<Reservation>>;
}
