//! Product inventory for the order fulfillment system.
//!
//! The inventory service is the sole owner of `quantity_on_hand`. Every stock
//! change goes through [`InventoryStore::reserve`] or
//! [`InventoryStore::release`], each a single atomic step in the backing store.
//! Reservations made with a [`ReservationKey`](common::ReservationKey) are
//! recorded in a ledger so that retries, redelivered stock-update events and
//! compensations apply at most once.

pub mod consumer;
pub mod error;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod service;
pub mod store;

pub use consumer::StockUpdateConsumer;
pub use error::{InventoryError, Result};
pub use events::{STOCK_UPDATES_TOPIC, StockUpdateEvent};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use product::{MAX_UNIT_PRICE, NewProduct, Product, ProductUpdate};
pub use service::InventoryService;
pub use store::{InventoryStore, ReleaseOutcome, ReserveOutcome, Reservation, ReservationState};
