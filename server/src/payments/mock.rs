//! Provider double for development and tests. Checkouts always succeed
//! unless told otherwise, and every refund is recorded.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use uuid::Uuid;

use super::{
    verify_signed_callback, CallbackError, CallbackEvent, CallbackPayload, Checkout,
    CheckoutRequest, NextStep, PaymentError, PaymentProvider,
};
use crate::models::PaymentMethod;

pub const MOCK_PROVIDER_NAME: &str = "mock";

/// Runs inside `create_checkout` with the request and the transaction id it
/// is about to return, before the failure switch is consulted.
pub type CheckoutHook =
    Arc<dyn Fn(CheckoutRequest, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct MockPaymentProvider {
    secret: String,
    fail_checkouts: AtomicBool,
    fail_refunds: AtomicBool,
    refunds: Mutex<Vec<(String, Decimal)>>,
    on_checkout: Mutex<Option<CheckoutHook>>,
}

impl std::fmt::Debug for MockPaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPaymentProvider")
            .field("fail_checkouts", &self.fail_checkouts)
            .field("fail_refunds", &self.fail_refunds)
            .finish_non_exhaustive()
    }
}

impl MockPaymentProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            fail_checkouts: AtomicBool::new(false),
            fail_refunds: AtomicBool::new(false),
            refunds: Mutex::new(Vec::new()),
            on_checkout: Mutex::new(None),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn fail_checkouts(&self, fail: bool) {
        self.fail_checkouts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    /// Lets a test play the provider calling back while the checkout request
    /// is still in flight.
    pub fn on_checkout(&self, hook: Option<CheckoutHook>) {
        *self
            .on_checkout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = hook;
    }

    /// `(transaction_id, amount)` for every refund issued so far.
    pub fn refunds(&self) -> Vec<(String, Decimal)> {
        self.refunds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &str {
        MOCK_PROVIDER_NAME
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, PaymentError> {
        let transaction_id = format!("mock_tx_{}", Uuid::new_v4().simple());

        let hook = self
            .on_checkout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(request.clone(), transaction_id.clone()).await;
        }

        if self.fail_checkouts.load(Ordering::SeqCst) {
            return Err(PaymentError::Api {
                status: 503,
                body: "mock provider unavailable".to_string(),
            });
        }

        let next_step = match request.method {
            PaymentMethod::Card => NextStep::Redirect {
                url: format!(
                    "{}?reference={}&transaction_id={}",
                    request.return_url, request.reference, transaction_id
                ),
            },
            PaymentMethod::BankTransfer => NextStep::Instructions {
                text: format!(
                    "Transfer {} to account MOCK-0001 quoting reference {}",
                    request.amount, request.reference
                ),
            },
        };

        info!(
            order_id = %request.order_id,
            reference = %request.reference,
            transaction_id = %transaction_id,
            amount = %request.amount,
            "Mock checkout created"
        );

        Ok(Checkout {
            transaction_id,
            next_step,
        })
    }

    async fn refund(&self, transaction_id: &str, amount: Decimal) -> Result<String, PaymentError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(PaymentError::Declined("mock refund rejected".to_string()));
        }

        self.refunds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((transaction_id.to_string(), amount));

        info!(transaction_id, amount = %amount, "Mock refund issued");
        Ok(format!("mock_rf_{}", Uuid::new_v4().simple()))
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackEvent, CallbackError> {
        verify_signed_callback(&self.secret, payload)
    }
}
