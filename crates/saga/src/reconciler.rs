//! Background sweep that settles orders left `Pending`.
//!
//! An order stays `Pending` when the saga crashed, timed out or could not
//! cancel it. The reconciler cancels such orders once they are older than the
//! pending TTL and releases every line by its reservation key. Releasing by
//! key is safe whether or not the reservation ever landed: an unknown key
//! leaves a tombstone, so a late reserve for it becomes a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::{Order, OrderStatus, OrderStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::caller::Caller;
use crate::coordinator::{DEFAULT_DEPENDENCY_TIMEOUT, call_dependency};
use crate::error::Result;
use crate::order_fulfillment;
use crate::services::InventoryClient;

/// Reconciler configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerOptions {
    /// Time between sweeps.
    pub interval: Duration,

    /// Age after which a `Pending` order is considered abandoned.
    pub pending_ttl: Duration,

    /// Upper bound on each store or inventory call.
    pub dependency_timeout: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            pending_ttl: Duration::from_secs(300),
            dependency_timeout: DEFAULT_DEPENDENCY_TIMEOUT,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stale `Pending` orders found.
    pub examined: usize,
    /// Orders this sweep moved to `Cancelled`.
    pub cancelled: usize,
    /// Line releases that failed.
    pub release_failures: usize,
}

/// Cancels abandoned `Pending` orders and releases their reservations.
pub struct Reconciler<O, I>
where
    O: OrderStore + ?Sized,
    I: InventoryClient + ?Sized,
{
    orders: Arc<O>,
    inventory: Arc<I>,
    options: ReconcilerOptions,
}

impl<O, I> Reconciler<O, I>
where
    O: OrderStore + ?Sized,
    I: InventoryClient + ?Sized,
{
    pub fn new(orders: Arc<O>, inventory: Arc<I>, options: ReconcilerOptions) -> Self {
        Self {
            orders,
            inventory,
            options,
        }
    }

    pub fn options(&self) -> ReconcilerOptions {
        self.options
    }

    /// Runs a single sweep.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let Some(cutoff) = chrono::Duration::from_std(self.options.pending_ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return Ok(report);
        };

        let stale = call_dependency(
            order_fulfillment::STEP_LOAD_ORDERS,
            self.options.dependency_timeout,
            self.orders.list_stale_pending(cutoff),
        )
        .await?;
        report.examined = stale.len();

        for order in &stale {
            // Cancel first: once the order leaves Pending the saga can no
            // longer confirm it.
            let cancelled = match call_dependency(
                order_fulfillment::STEP_CANCEL_ORDER,
                self.options.dependency_timeout,
                self.orders
                    .transition_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled),
            )
            .await
            {
                Ok(cancelled) => cancelled,
                Err(e) => {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to cancel stale order");
                    continue;
                }
            };
            if !cancelled {
                tracing::debug!(order_id = %order.id, "Order settled before reconciliation");
                continue;
            }

            report.cancelled += 1;
            report.release_failures += self.release_order(order).await;
            metrics::counter!("reconciler_orders_cancelled_total").increment(1);
            tracing::warn!(order_id = %order.id, created_at = %order.created_at, "Cancelled abandoned order");
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                cancelled = report.cancelled,
                release_failures = report.release_failures,
                "Reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Releases every line of `order` on behalf of its owner. The original
    /// request's credential is gone, so none is forwarded. Returns the number
    /// of failures.
    async fn release_order(&self, order: &Order) -> usize {
        let owner = Caller::customer(order.customer_id.clone());
        let mut failures = 0;
        for (item, key) in order.reservation_keys() {
            let released = call_dependency(
                order_fulfillment::STEP_RELEASE_STOCK,
                self.options.dependency_timeout,
                self.inventory
                    .release_stock(&owner, item.product_id, item.quantity, &key),
            )
            .await;
            if let Err(e) = released {
                failures += 1;
                metrics::counter!("reconciler_release_failures_total").increment(1);
                tracing::error!(
                    order_id = %order.id,
                    reservation_key = %key,
                    error = %e,
                    "Failed to release reservation of cancelled order"
                );
            }
        }
        failures
    }
}

impl<O, I> Reconciler<O, I>
where
    O: OrderStore + ?Sized + 'static,
    I: InventoryClient + ?Sized + 'static,
{
    /// Spawns the periodic sweep. The first sweep runs immediately.
    pub fn spawn(self) -> ReconcilerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.options.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = self.options.interval.as_secs(),
                pending_ttl_secs = self.options.pending_ttl.as_secs(),
                "Reconciler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "Reconciliation sweep failed");
                        }
                    }
                }
            }
            tracing::info!("Reconciler stopped");
        });

        ReconcilerHandle { shutdown, task }
    }
}

/// Handle to a running reconciler.
pub struct ReconcilerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Stops the reconciler after the current sweep.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Reconciler task panicked");
        }
    }
}
