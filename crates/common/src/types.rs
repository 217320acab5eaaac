use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a persisted order.
///
/// Assigned by the order store when the order is first written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Creates an order ID from its raw value.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a product owned by the inventory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    /// Creates a product ID from its raw value.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identity of the customer who placed an order.
///
/// This is the opaque subject string issued by the identity provider, so it is
/// never generated locally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Creates a customer ID from a subject string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the customer ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CustomerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Idempotency key for a single stock reservation.
///
/// One key exists per order line (`"{order_id}:{line_no}"`), so every retry,
/// redelivery or compensation for that line refers to the same reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationKey(String);

impl ReservationKey {
    /// Derives the key for line `line_no` of an order.
    pub fn for_line(order_id: OrderId, line_no: u32) -> Self {
        Self(format!("{order_id}:{line_no}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a reservation key string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reservation key: {0}")]
pub struct ParseReservationKeyError(String);

impl FromStr for ReservationKey {
    type Err = ParseReservationKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (order, line) = s
            .split_once(':')
            .ok_or_else(|| ParseReservationKeyError(s.to_string()))?;
        let valid = order.parse::<i64>().is_ok() && line.parse::<u32>().is_ok();
        if !valid {
            return Err(ParseReservationKeyError(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_key_is_derived_from_order_and_line() {
        let key = ReservationKey::for_line(OrderId::new(42), 3);
        assert_eq!(key.as_str(), "42:3");
    }

    #[test]
    fn reservation_key_parses_its_own_format() {
        let key = ReservationKey::for_line(OrderId::new(7), 1);
        let parsed: ReservationKey = key.as_str().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn reservation_key_rejects_garbage() {
        assert!("not-a-key".parse::<ReservationKey>().is_err());
        assert!("12:x".parse::<ReservationKey>().is_err());
        assert!(":1".parse::<ReservationKey>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ProductId::new(5)).unwrap();
        assert_eq!(json, "5");
        let customer: CustomerId = serde_json::from_str("\"user-1\"").unwrap();
        assert_eq!(customer.as_str(), "user-1");
    }
}
