//! Per-order saga instance and its compensation list.

use common::{OrderId, ProductId, ReservationKey};
use domain::OrderItem;

use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// A line whose reservation must be undone if the saga fails.
///
/// Lines whose reserve call failed with an unknown effect are recorded too;
/// releasing by key is correct whether or not the reservation landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub key: ReservationKey,
}

impl ReservedLine {
    pub fn new(item: &OrderItem, key: ReservationKey) -> Self {
        Self {
            line_no: item.line_no,
            product_id: item.product_id,
            quantity: item.quantity,
            key,
        }
    }
}

/// State of one order fulfillment run.
///
/// The compensation list holds the lines reserved so far, in reservation
/// order, and is threaded through the workflow explicitly.
#[derive(Debug, Clone, Default)]
pub struct SagaInstance {
    order_id: Option<OrderId>,
    state: SagaState,
    compensation: Vec<ReservedLine>,
    failed_step: Option<&'static str>,
    failure_reason: Option<String>,
}

impl SagaInstance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Lines to release on failure, in reservation order.
    pub fn compensation(&self) -> &[ReservedLine] {
        &self.compensation
    }

    pub fn failed_step(&self) -> Option<&'static str> {
        self.failed_step
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Marks the order as persisted; reservations may now start.
    pub fn start(&mut self, order_id: OrderId) -> Result<()> {
        if !self.state.can_reserve() {
            return Err(SagaError::InvalidState {
                expected: "NotStarted",
                actual: self.state,
            });
        }
        self.order_id = Some(order_id);
        self.state = SagaState::Reserving;
        Ok(())
    }

    /// Adds a line to the compensation list.
    pub fn record_reserved(&mut self, line: ReservedLine) -> Result<()> {
        if self.state != SagaState::Reserving {
            return Err(SagaError::InvalidState {
                expected: "Reserving",
                actual: self.state,
            });
        }
        self.compensation.push(line);
        Ok(())
    }

    /// Switches to compensation after `step` failed.
    pub fn begin_compensation(&mut self, step: &'static str, reason: impl Into<String>) -> Result<()> {
        if !self.state.can_compensate() {
            return Err(SagaError::InvalidState {
                expected: "Reserving",
                actual: self.state,
            });
        }
        self.state = SagaState::Compensating;
        self.failed_step = Some(step);
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        if !self.state.can_complete() {
            return Err(SagaError::InvalidState {
                expected: "Reserving",
                actual: self.state,
            });
        }
        self.state = SagaState::Completed;
        Ok(())
    }

    /// Terminal failure. Valid from any non-terminal state.
    pub fn fail(&mut self, step: &'static str, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.failed_step.get_or_insert(step);
        if self.failure_reason.is_none() {
            self.failure_reason = Some(reason.into());
        }
        self.state = SagaState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    fn line(line_no: u32) -> ReservedLine {
        let mut item = OrderItem::new(ProductId::new(7), "Widget", 2, Money::from_cents(100));
        item.line_no = line_no;
        ReservedLine::new(&item, ReservationKey::for_line(OrderId::new(1), line_no))
    }

    #[test]
    fn test_happy_path() {
        let mut saga = SagaInstance::new();
        saga.start(OrderId::new(1)).unwrap();
        saga.record_reserved(line(1)).unwrap();
        saga.record_reserved(line(2)).unwrap();
        saga.complete().unwrap();

        assert_eq!(saga.state(), SagaState::Completed);
        assert_eq!(saga.order_id(), Some(OrderId::new(1)));
        assert_eq!(saga.compensation().len(), 2);
    }

    #[test]
    fn test_compensation_keeps_reservation_order() {
        let mut saga = SagaInstance::new();
        saga.start(OrderId::new(1)).unwrap();
        saga.record_reserved(line(1)).unwrap();
        saga.record_reserved(line(2)).unwrap();
        saga.begin_compensation("reserve_stock", "insufficient stock").unwrap();

        let keys: Vec<&str> = saga.compensation().iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["1:1", "1:2"]);
        assert_eq!(saga.state(), SagaState::Compensating);

        saga.fail("cancel_order", "ignored");
        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.failed_step(), Some("reserve_stock"));
        assert_eq!(saga.failure_reason(), Some("insufficient stock"));
    }

    #[test]
    fn test_cannot_reserve_before_start() {
        let mut saga = SagaInstance::new();
        let result = saga.record_reserved(line(1));
        assert!(matches!(result, Err(SagaError::InvalidState { .. })));
    }

    #[test]
    fn test_cannot_complete_after_compensation() {
        let mut saga = SagaInstance::new();
        saga.start(OrderId::new(1)).unwrap();
        saga.begin_compensation("reserve_stock", "boom").unwrap();
        assert!(saga.complete().is_err());
        assert!(saga.start(OrderId::new(2)).is_err());
    }

    #[test]
    fn test_fail_before_start() {
        let mut saga = SagaInstance::new();
        saga.fail("validate_products", "product missing");
        assert_eq!(saga.state(), SagaState::Failed);
        assert!(saga.compensation().is_empty());

        // Terminal states are sticky
        saga.fail("other", "other");
        assert_eq!(saga.failed_step(), Some("validate_products"));
    }
}
