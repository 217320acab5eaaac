//! Identity of the party invoking a saga operation.

use common::CustomerId;
use domain::Order;
use serde::{Deserialize, Serialize};

/// Header carrying the authenticated customer ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated caller's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    /// Parses a role header value, case-insensitively. Anything other than
    /// `admin` is a customer.
    pub fn from_header(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Customer
        }
    }

    /// Returns the role as sent in the role header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

/// An authenticated caller.
///
/// `credential` is the opaque value the caller authenticated with. It is
/// forwarded unchanged on every inventory call made on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub customer_id: CustomerId,
    pub role: Role,
    credential: Option<String>,
}

impl Caller {
    /// Creates a customer caller.
    pub fn customer(customer_id: impl Into<CustomerId>) -> Self {
        Self {
            customer_id: customer_id.into(),
            role: Role::Customer,
            credential: None,
        }
    }

    /// Creates an admin caller.
    pub fn admin(customer_id: impl Into<CustomerId>) -> Self {
        Self {
            customer_id: customer_id.into(),
            role: Role::Admin,
            credential: None,
        }
    }

    /// Attaches the credential to forward.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Returns the forwarded credential, if any.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may access any order; customers only their own.
    pub fn can_access(&self, order: &Order) -> bool {
        self.is_admin() || order.is_owned_by(&self.customer_id)
    }
}
