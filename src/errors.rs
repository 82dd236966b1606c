use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Admin access required")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound => AppError::NotFound,
            DomainError::InsufficientStock { .. }
            | DomainError::EmptyCart
            | DomainError::InvalidInput(_) => AppError::BadRequest(e.to_string()),
            DomainError::Unauthorized => AppError::Unauthorized,
            DomainError::Forbidden => AppError::Forbidden,
            DomainError::InvariantViolation(msg) => {
                // Should never surface: the offending write was rolled back.
                log::error!("invariant violation: {msg}");
                AppError::Internal(msg)
            }
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // The response body never leaks internal error details.
        let message = match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}
