use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found")]
    NotFound,
    #[error("Insufficient stock for {product}")]
    InsufficientStock { product: String },
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Admin access required")]
    Forbidden,
    /// A write that would corrupt durable state (e.g. drive stock negative).
    /// Rejected and rolled back, never committed.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
