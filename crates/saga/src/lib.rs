//! Order fulfillment saga.
//!
//! Creating an order runs these steps for the calling customer:
//! 1. Look up and price every requested product
//! 2. Check availability of every line (advisory)
//! 3. Persist the order as `Pending`
//! 4. Reserve stock line by line, in submission order
//! 5. Publish one stock update per reserved line
//! 6. Confirm the order
//!
//! If a reservation fails, the lines reserved before it are released and the
//! order is cancelled. Orders left `Pending` by a crash or an ambiguous
//! failure are settled by the [`Reconciler`].

pub mod caller;
pub mod coordinator;
pub mod error;
pub mod instance;
pub mod order_fulfillment;
pub mod reconciler;
pub mod services;
pub mod state;

pub use caller::{Caller, Role, USER_ID_HEADER, USER_ROLE_HEADER};
pub use coordinator::{DEFAULT_DEPENDENCY_TIMEOUT, OrderLineRequest, OrderSaga, SagaOptions};
pub use error::{Result, SagaError};
pub use instance::{ReservedLine, SagaInstance};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerHandle, ReconcilerOptions};
pub use services::{
    AvailabilityResponse, HttpInventoryClient, InventoryClient, LocalInventoryClient,
    StockMovementRequest,
};
pub use state::SagaState;
