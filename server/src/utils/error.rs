use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    #[error("Ticket window closed: {0}")]
    TicketWindowClosed(String),

    #[error("Quantity out of range: {0}")]
    QuantityOutOfRange(String),

    #[error("Promotion invalid: {0}")]
    PromotionInvalid(String),

    #[error("Promotion expired: {0}")]
    PromotionExpired(String),

    #[error("Promotion exhausted: {0}")]
    PromotionExhausted(String),

    #[error("Order not in an eligible state: {0}")]
    OrderNotPending(String),

    #[error("Payment provider error: {0}")]
    PaymentProviderError(String),

    #[error("Duplicate webhook: {0}")]
    DuplicateWebhook(String),

    #[error("Already checked in: {0}")]
    AlreadyCheckedIn(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientInventory(_) => StatusCode::CONFLICT,
            AppError::TicketWindowClosed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::QuantityOutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PromotionInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PromotionExpired(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PromotionExhausted(_) => StatusCode::CONFLICT,
            AppError::OrderNotPending(_) => StatusCode::CONFLICT,
            AppError::PaymentProviderError(_) => StatusCode::BAD_GATEWAY,
            AppError::DuplicateWebhook(_) => StatusCode::OK,
            AppError::AlreadyCheckedIn(_) => StatusCode::CONFLICT,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InsufficientInventory(_) => "INSUFFICIENT_INVENTORY",
            AppError::TicketWindowClosed(_) => "TICKET_WINDOW_CLOSED",
            AppError::QuantityOutOfRange(_) => "QUANTITY_OUT_OF_RANGE",
            AppError::PromotionInvalid(_) => "PROMOTION_INVALID",
            AppError::PromotionExpired(_) => "PROMOTION_EXPIRED",
            AppError::PromotionExhausted(_) => "PROMOTION_EXHAUSTED",
            AppError::OrderNotPending(_) => "ORDER_NOT_PENDING",
            AppError::PaymentProviderError(_) => "PAYMENT_PROVIDER_ERROR",
            AppError::DuplicateWebhook(_) => "DUPLICATE_WEBHOOK",
            AppError::AlreadyCheckedIn(_) => "ALREADY_CHECKED_IN",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Upstream failures the caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::PaymentProviderError(_) | AppError::DatabaseError(_)
        )
    }

    fn message(&self) -> Option<&str> {
        match self {
            AppError::ValidationError(msg)
            | AppError::InsufficientInventory(msg)
            | AppError::TicketWindowClosed(msg)
            | AppError::QuantityOutOfRange(msg)
            | AppError::PromotionInvalid(msg)
            | AppError::PromotionExpired(msg)
            | AppError::PromotionExhausted(msg)
            | AppError::OrderNotPending(msg)
            | AppError::PaymentProviderError(msg)
            | AppError::DuplicateWebhook(msg)
            | AppError::AlreadyCheckedIn(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InternalServerError(msg) => Some(msg),
            AppError::DatabaseError(_) => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::PaymentProviderError(msg) | AppError::InternalServerError(msg) => {
                error!(code = self.code(), reason = %msg, "Application error");
            }
            _ => {
                warn!(code = self.code(), reason = self.message().unwrap_or_default(), "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            other => other.message().unwrap_or_default().to_string(),
        };

        let details = self
            .is_retryable()
            .then(|| serde_json::json!({ "retryable": true }));

        error_response(code, public_message, details, status)
    }
}
