//! HTTP handlers, grouped by resource.

pub mod ops;
pub mod orders;
pub mod products;
