//! Payment provider integration.
//!
//! A provider creates checkouts, issues refunds and authenticates the
//! callbacks it sends back. Every provider signs callbacks with the shared
//! webhook secret using the scheme in [`signature`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PaymentMethod;
use crate::utils::error::AppError;

pub mod http;
pub mod mock;
pub mod signature;

pub use http::HttpPaymentProvider;
pub use mock::{CheckoutHook, MockPaymentProvider, MOCK_PROVIDER_NAME};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider api error status={status} body={body}")]
    Api { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("payment declined: {0}")]
    Declined(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::PaymentProviderError(err.to_string())
    }
}

/// Why a callback was not accepted. Rejected callbacks are dropped, never
/// retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("invalid callback signature")]
    BadSignature,

    #[error("malformed callback payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub customer_email: String,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NextStep {
    Redirect { url: String },
    Instructions { text: String },
}

#[derive(Debug, Clone)]
pub struct Checkout {
    pub transaction_id: String,
    pub next_step: NextStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Success,
    Failure,
}

impl CallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Success => "success",
            CallbackStatus::Failure => "failure",
        }
    }
}

impl FromStr for CallbackStatus {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "completed" | "paid" => Ok(CallbackStatus::Success),
            "failure" | "failed" | "declined" | "cancelled" => Ok(CallbackStatus::Failure),
            other => Err(CallbackError::Malformed(format!("unknown status '{other}'"))),
        }
    }
}

/// Wire form of a provider callback, accepted both as a webhook JSON body and
/// as redirect query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub reference: String,
    pub transaction_id: String,
    pub status: String,
    pub amount: String,
    pub signature: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// An authenticated callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub reference: String,
    pub transaction_id: String,
    pub status: CallbackStatus,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Name used in callback paths and stored on each transaction.
    fn name(&self) -> &str;

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, PaymentError>;

    /// Refunds `amount` of a captured transaction; returns the provider's
    /// refund id.
    async fn refund(&self, transaction_id: &str, amount: Decimal) -> Result<String, PaymentError>;

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackEvent, CallbackError>;
}

/// Checks the signature first, then parses the signed fields.
pub fn verify_signed_callback(
    secret: &str,
    payload: &CallbackPayload,
) -> Result<CallbackEvent, CallbackError> {
    let data = signature::signing_payload(
        &payload.reference,
        &payload.transaction_id,
        &payload.status,
        &payload.amount,
    );
    if !signature::verify_hmac_sha256_hex(secret, &data, &payload.signature) {
        return Err(CallbackError::BadSignature);
    }

    if payload.reference.trim().is_empty() || payload.transaction_id.trim().is_empty() {
        return Err(CallbackError::Malformed(
            "reference and transaction_id are required".to_string(),
        ));
    }

    let amount = Decimal::from_str(payload.amount.trim())
        .map_err(|e| CallbackError::Malformed(format!("amount '{}': {e}", payload.amount)))?;

    Ok(CallbackEvent {
        reference: payload.reference.trim().to_string(),
        transaction_id: payload.transaction_id.trim().to_string(),
        status: payload.status.parse()?,
        amount,
        reason: payload.reason.clone(),
    })
}

/// Builds a correctly signed callback. Used by the mock provider's
/// simulated flow and by tests.
pub fn sign_callback(
    secret: &str,
    reference: &str,
    transaction_id: &str,
    status: CallbackStatus,
    amount: Decimal,
) -> CallbackPayload {
    let amount = amount.to_string();
    let data = signature::signing_payload(reference, transaction_id, status.as_str(), &amount);
    CallbackPayload {
        reference: reference.to_string(),
        transaction_id: transaction_id.to_string(),
        status: status.as_str().to_string(),
        signature: signature::sign_hmac_sha256_hex(secret, &data),
        amount,
        reason: None,
    }
}
