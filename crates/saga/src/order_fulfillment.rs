//! Order fulfillment saga constants.

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "OrderFulfillment";

/// Step name: Look up and price every requested product.
pub const STEP_VALIDATE_PRODUCTS: &str = "validate_products";

/// Step name: Advisory availability check for every line.
pub const STEP_CHECK_AVAILABILITY: &str = "check_availability";

/// Step name: Persist the order in `Pending` status.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// Step name: Reserve stock line by line.
pub const STEP_RESERVE_STOCK: &str = "reserve_stock";

/// Step name: Publish one stock update per reserved line.
pub const STEP_PUBLISH_STOCK_UPDATES: &str = "publish_stock_updates";

/// Step name: Move the order from `Pending` to `Confirmed`.
pub const STEP_CONFIRM_ORDER: &str = "confirm_order";

/// Compensation step: Release a reserved line.
pub const STEP_RELEASE_STOCK: &str = "release_stock";

/// Compensation step: Move the order from `Pending` to `Cancelled`.
pub const STEP_CANCEL_ORDER: &str = "cancel_order";

/// Step name: Administrative status change.
pub const STEP_UPDATE_STATUS: &str = "update_status";

/// Step name: Read orders from the store.
pub const STEP_LOAD_ORDERS: &str = "load_orders";
