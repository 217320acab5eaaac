//! Caller identity taken from request headers.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! identity in `x-user-id` and `x-user-role` along with the original
//! `Authorization` header.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use saga::{Caller, Role};
pub use saga::{USER_ID_HEADER, USER_ROLE_HEADER};

use crate::error::ApiError;

/// Extractor for the authenticated [`Caller`].
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub Caller);

impl AuthenticatedCaller {
    /// Rejects non-admin callers.
    pub fn require_admin(&self) -> Result<&Caller, ApiError> {
        if self.0.is_admin() {
            Ok(&self.0)
        } else {
            Err(ApiError::Forbidden("Admin role required".to_string()))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let customer_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Customer ID not found in request".to_string()))?;

        let mut caller = match header(parts, USER_ROLE_HEADER).map(Role::from_header) {
            Some(Role::Admin) => Caller::admin(customer_id),
            _ => Caller::customer(customer_id),
        };

        // Forwarded byte for byte, so read the raw value
        if let Some(credential) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        {
            caller = caller.with_credential(credential);
        }

        Ok(Self(caller))
    }
}
