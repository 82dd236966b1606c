pub mod banners;
pub mod cart;
pub mod orders;
pub mod products;

use std::str::FromStr as _;

use bigdecimal::BigDecimal;
use serde::Deserialize;

use crate::auth::MaybeIdentity;
use crate::domain::cart::CartOwner;
use crate::errors::AppError;

/// Guest requests identify their cart through this query/body field.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// A bearer token wins over a supplied session id; a request with neither
/// has no cart to operate on.
pub fn resolve_owner(
    identity: MaybeIdentity,
    session_id: Option<String>,
) -> Result<CartOwner, AppError> {
    if let MaybeIdentity(Some(user_id)) = identity {
        return Ok(CartOwner::User(user_id));
    }
    session_id
        .filter(|s| !s.is_empty())
        .map(CartOwner::Guest)
        .ok_or_else(|| AppError::BadRequest("No session or user id provided".to_string()))
}

/// Decimal fields travel as strings ("9.99") to avoid floating-point drift.
pub fn parse_decimal(field: &str, value: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(value)
        .map_err(|_| AppError::BadRequest(format!("Invalid {field} '{value}'")))
}
