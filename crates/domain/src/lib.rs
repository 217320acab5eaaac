//! Order domain for the fulfillment system.
//!
//! This crate provides:
//! - `Order`, `OrderItem` and `OrderStatus`
//! - `NewOrder`, the validated, priced input for persisting an order
//! - The `OrderStore` trait with in-memory and PostgreSQL implementations

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod store;

pub use error::{DomainError, Result};
pub use memory::InMemoryOrderStore;
pub use order::{NewOrder, Order, OrderError, OrderItem, OrderStatus};
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;
