//! Collaborators the saga calls out to.

pub mod inventory;

pub use inventory::{
    AvailabilityResponse, HttpInventoryClient, InventoryClient, LocalInventoryClient,
    StockMovementRequest,
};
