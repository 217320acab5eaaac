//! Order saga: creates orders and reserves their stock, compensating on
//! failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CustomerId, OrderId, ProductId};
use domain::{NewOrder, Order, OrderItem, OrderStatus, OrderStore};
use inventory::{STOCK_UPDATES_TOPIC, StockUpdateEvent};
use messaging::{MessageChannel, MessageChannelExt};
use serde::{Deserialize, Serialize};

use crate::caller::Caller;
use crate::error::{Result, SagaError};
use crate::instance::{ReservedLine, SagaInstance};
use crate::order_fulfillment;
use crate::services::InventoryClient;

/// Default per-call timeout for every dependency call.
pub const DEFAULT_DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(5);

/// Saga configuration.
#[derive(Debug, Clone, Copy)]
pub struct SagaOptions {
    /// Upper bound on each inventory, store or channel call.
    pub dependency_timeout: Duration,
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            dependency_timeout: DEFAULT_DEPENDENCY_TIMEOUT,
        }
    }
}

/// One requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Runs `call` under `timeout`, turning failures and timeouts into
/// [`SagaError::DependencyUnavailable`] for `step`.
///
/// A timed out call has an unknown effect; callers must not assume either
/// outcome.
pub(crate) async fn call_dependency<T, E, F>(
    step: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SagaError::DependencyUnavailable {
            step,
            reason: e.to_string(),
        }),
        Err(_) => Err(SagaError::DependencyUnavailable {
            step,
            reason: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

/// Coordinates order creation across the inventory service, the order store
/// and the message channel.
///
/// Reservations are made line by line in submission order, each under the
/// line's reservation key. The first failed line stops the run; lines
/// reserved before it are released by key and the order is cancelled.
pub struct OrderSaga<O, I, C>
where
    O: OrderStore + ?Sized,
    I: InventoryClient + ?Sized,
    C: MessageChannel + ?Sized,
{
    orders: Arc<O>,
    inventory: Arc<I>,
    channel: Arc<C>,
    options: SagaOptions,
}

impl<O, I, C> Clone for OrderSaga<O, I, C>
where
    O: OrderStore + ?Sized,
    I: InventoryClient + ?Sized,
    C: MessageChannel + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
            inventory: Arc::clone(&self.inventory),
            channel: Arc::clone(&self.channel),
            options: self.options,
        }
    }
}

impl<O, I, C> OrderSaga<O, I, C>
where
    O: OrderStore + ?Sized,
    I: InventoryClient + ?Sized,
    C: MessageChannel + ?Sized,
{
    /// Creates a new order saga.
    pub fn new(orders: Arc<O>, inventory: Arc<I>, channel: Arc<C>) -> Self {
        Self::with_options(orders, inventory, channel, SagaOptions::default())
    }

    pub fn with_options(
        orders: Arc<O>,
        inventory: Arc<I>,
        channel: Arc<C>,
        options: SagaOptions,
    ) -> Self {
        Self {
            orders,
            inventory,
            channel,
            options,
        }
    }

    pub fn orders(&self) -> &Arc<O> {
        &self.orders
    }

    pub fn inventory(&self) -> &Arc<I> {
        &self.inventory
    }

    pub fn options(&self) -> SagaOptions {
        self.options
    }

    async fn call<T, E, F>(&self, step: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        call_dependency(step, self.options.dependency_timeout, call).await
    }

    /// Creates an order for the caller and reserves its stock.
    ///
    /// Returns the `Confirmed` order, or the reason it was rejected. A
    /// rejected order is either never persisted or ends `Cancelled` with
    /// every reserved line released.
    #[tracing::instrument(
        skip(self, caller, lines),
        fields(saga_type = order_fulfillment::SAGA_TYPE, customer_id = %caller.customer_id)
    )]
    pub async fn create_order(&self, caller: &Caller, lines: Vec<OrderLineRequest>) -> Result<Order> {
        let started = Instant::now();
        let result = self.fulfill(caller, lines).await;
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total_amount, "Order confirmed");
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "Order rejected");
            }
        }
        result
    }

    async fn fulfill(&self, caller: &Caller, lines: Vec<OrderLineRequest>) -> Result<Order> {
        let mut saga = SagaInstance::new();

        let new_order = match self.price_and_check(caller, &lines).await {
            Ok(order) => order,
            Err(e) => {
                saga.fail(order_fulfillment::STEP_VALIDATE_PRODUCTS, e.to_string());
                return Err(e);
            }
        };

        tracing::info!(step = order_fulfillment::STEP_PERSIST_ORDER, "saga step started");
        let mut order = match self
            .call(order_fulfillment::STEP_PERSIST_ORDER, self.orders.create(new_order))
            .await
        {
            Ok(order) => order,
            Err(e) => {
                saga.fail(order_fulfillment::STEP_PERSIST_ORDER, e.to_string());
                return Err(e);
            }
        };
        saga.start(order.id)?;

        tracing::info!(order_id = %order.id, step = order_fulfillment::STEP_RESERVE_STOCK, "saga step started");
        if let Some(failure) = self.reserve_lines(caller, &order, &mut saga).await? {
            return Err(self.compensate(caller, &mut saga, order.id, failure).await);
        }

        self.publish_stock_updates(&order, &saga).await;

        tracing::info!(order_id = %order.id, step = order_fulfillment::STEP_CONFIRM_ORDER, "saga step started");
        let confirmed = self
            .call(
                order_fulfillment::STEP_CONFIRM_ORDER,
                self.orders
                    .transition_status(order.id, OrderStatus::Pending, OrderStatus::Confirmed),
            )
            .await?;

        if !confirmed {
            // Someone else settled the order; make sure our reservations do
            // not outlive it.
            self.release_lines(caller, saga.compensation()).await;
            saga.fail(
                order_fulfillment::STEP_CONFIRM_ORDER,
                "order no longer pending",
            );
            return Err(SagaError::OrderSettledDuringSaga(order.id));
        }

        saga.complete()?;
        order.status = OrderStatus::Confirmed;
        order.updated_at = chrono::Utc::now();
        Ok(order)
    }

    /// Validates the request, prices every line from the current product
    /// data and runs the advisory availability check. No side effects.
    async fn price_and_check(&self, caller: &Caller, lines: &[OrderLineRequest]) -> Result<NewOrder> {
        if lines.is_empty() {
            return Err(SagaError::InvalidInput(
                "order must contain at least one item".to_string(),
            ));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(SagaError::InvalidInput(format!(
                "quantity for product {} must be greater than 0",
                line.product_id
            )));
        }

        tracing::info!(step = order_fulfillment::STEP_VALIDATE_PRODUCTS, "saga step started");
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .call(
                    order_fulfillment::STEP_VALIDATE_PRODUCTS,
                    self.inventory.get_product(caller, line.product_id),
                )
                .await?
                .ok_or(SagaError::ProductNotFound(line.product_id))?;
            items.push(OrderItem::new(
                product.id,
                product.name,
                line.quantity,
                product.unit_price,
            ));
        }

        // Prices that overflow the order total are a bad request, not a fault
        let new_order = NewOrder::new(caller.customer_id.clone(), items)
            .map_err(|e| SagaError::InvalidInput(e.to_string()))?;

        tracing::info!(step = order_fulfillment::STEP_CHECK_AVAILABILITY, "saga step started");
        for line in lines {
            let available = self
                .call(
                    order_fulfillment::STEP_CHECK_AVAILABILITY,
                    self.inventory
                        .check_availability(caller, line.product_id, line.quantity),
                )
                .await?;
            if !available {
                return Err(SagaError::InsufficientStock {
                    product_id: line.product_id,
                });
            }
        }

        Ok(new_order)
    }

    /// Reserves each line in order. Returns the failure that stopped the run,
    /// if any; every line that may hold stock is on the compensation list.
    async fn reserve_lines(
        &self,
        caller: &Caller,
        order: &Order,
        saga: &mut SagaInstance,
    ) -> Result<Option<SagaError>> {
        for (item, key) in order.reservation_keys() {
            let reserved = self
                .call(
                    order_fulfillment::STEP_RESERVE_STOCK,
                    self.inventory.reserve_stock(
                        caller,
                        item.product_id,
                        item.quantity,
                        &key,
                    ),
                )
                .await;

            match reserved {
                Ok(true) => {
                    tracing::debug!(order_id = %order.id, line_no = item.line_no, product_id = %item.product_id, "Line reserved");
                    saga.record_reserved(ReservedLine::new(item, key))?;
                }
                Ok(false) => {
                    return Ok(Some(SagaError::InsufficientStock {
                        product_id: item.product_id,
                    }));
                }
                Err(e) => {
                    // Unknown effect: release this line's key as well.
                    tracing::warn!(
                        order_id = %order.id,
                        line_no = item.line_no,
                        product_id = %item.product_id,
                        error = %e,
                        "Reservation outcome unknown"
                    );
                    saga.record_reserved(ReservedLine::new(item, key))?;
                    return Ok(Some(e));
                }
            }
        }
        Ok(None)
    }

    /// Publishes one stock update per reserved line. Failures are logged and
    /// never roll back the reservations.
    async fn publish_stock_updates(&self, order: &Order, saga: &SagaInstance) {
        tracing::info!(order_id = %order.id, step = order_fulfillment::STEP_PUBLISH_STOCK_UPDATES, "saga step started");
        for line in saga.compensation() {
            let event = StockUpdateEvent::for_reservation(
                order.id,
                line.product_id,
                line.quantity,
                line.key.clone(),
            );
            let published = self
                .call(
                    order_fulfillment::STEP_PUBLISH_STOCK_UPDATES,
                    self.channel.publish(STOCK_UPDATES_TOPIC, &event),
                )
                .await;
            if let Err(e) = published {
                metrics::counter!("saga_publish_failures_total").increment(1);
                tracing::warn!(
                    order_id = %order.id,
                    product_id = %line.product_id,
                    reservation_key = %line.key,
                    error = %e,
                    "Failed to publish stock update"
                );
            }
        }
    }

    /// Releases every line on the compensation list in reservation order,
    /// then cancels the order. Returns `failure` for the caller.
    #[tracing::instrument(skip(self, caller, saga, failure))]
    async fn compensate(
        &self,
        caller: &Caller,
        saga: &mut SagaInstance,
        order_id: OrderId,
        failure: SagaError,
    ) -> SagaError {
        let failure_message = failure.to_string();
        if let Err(e) = saga.begin_compensation(order_fulfillment::STEP_RESERVE_STOCK, &failure_message) {
            tracing::error!(error = %e, "Cannot start compensation");
        }
        tracing::warn!(reason = %failure_message, lines = saga.compensation().len(), "saga compensation started");

        self.release_lines(caller, saga.compensation()).await;

        tracing::info!(step = order_fulfillment::STEP_CANCEL_ORDER, "saga step started");
        match self
            .call(
                order_fulfillment::STEP_CANCEL_ORDER,
                self.orders
                    .transition_status(order_id, OrderStatus::Pending, OrderStatus::Cancelled),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Order was no longer pending when cancelling");
            }
            Err(e) => {
                // Left Pending; the reconciler cancels it later.
                tracing::error!(error = %e, "Failed to cancel order");
            }
        }

        saga.fail(order_fulfillment::STEP_RESERVE_STOCK, failure_message);
        metrics::counter!("saga_compensations_total").increment(1);
        failure
    }

    async fn release_lines(&self, caller: &Caller, lines: &[ReservedLine]) {
        for line in lines {
            let released = self
                .call(
                    order_fulfillment::STEP_RELEASE_STOCK,
                    self.inventory.release_stock(
                        caller,
                        line.product_id,
                        line.quantity,
                        &line.key,
                    ),
                )
                .await;
            if let Err(e) = released {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                tracing::error!(
                    product_id = %line.product_id,
                    reservation_key = %line.key,
                    error = %e,
                    "Failed to release reservation"
                );
            }
        }
    }

    /// Returns an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.call(order_fulfillment::STEP_LOAD_ORDERS, self.orders.get(id))
            .await?
            .ok_or(SagaError::OrderNotFound(id))
    }

    /// Lists every order, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        self.call(order_fulfillment::STEP_LOAD_ORDERS, self.orders.list_all())
            .await
    }

    /// Lists a customer's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        self.call(
            order_fulfillment::STEP_LOAD_ORDERS,
            self.orders.list_by_customer(customer_id),
        )
        .await
    }

    /// Sets an order's status by name.
    ///
    /// Any known status may be set from any other. Unknown names and missing
    /// orders are rejected without mutation.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, id: OrderId, status: &str) -> Result<Order> {
        let status: OrderStatus = status
            .parse()
            .map_err(|e: domain::OrderError| SagaError::InvalidInput(e.to_string()))?;

        let updated = self
            .call(
                order_fulfillment::STEP_UPDATE_STATUS,
                self.orders.update_status(id, status),
            )
            .await?;
        if !updated {
            return Err(SagaError::OrderNotFound(id));
        }

        tracing::info!(order_id = %id, %status, "Order status updated");
        self.get_order(id).await
    }

    /// Cancels an order regardless of its current status.
    ///
    /// Stock reserved for the order is not released.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let updated = self
            .call(
                order_fulfillment::STEP_CANCEL_ORDER,
                self.orders.update_status(id, OrderStatus::Cancelled),
            )
            .await?;
        if !updated {
            return Err(SagaError::OrderNotFound(id));
        }

        tracing::info!(order_id = %id, "Order cancelled");
        self.get_order(id).await
    }
}
