//! Payment initiation, provider callbacks and refunds.
//!
//! The transaction row, keyed by our own `reference`, is committed before the
//! provider is contacted, so a callback that overtakes the `initiate`
//! response still finds it. Callbacks are idempotent: once a transaction is
//! settled, later callbacks for it change nothing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::orders::{close_order, load_details, OrderDetails};
use super::{codes, finish};
use crate::clock::Clock;
use crate::models::{
    Actor, Order, OrderStatus, PaymentMethod, PaymentStatus, PaymentTransaction, UserRole,
};
use crate::payments::{
    CallbackEvent, CallbackPayload, CallbackStatus, CheckoutRequest, NextStep, PaymentProvider,
};
use crate::store::{NewPayment, PaymentUpdate, Store, UnitOfWork};
use crate::utils::error::AppError;

/// Provider name recorded for orders that needed no payment.
pub const NO_PAYMENT_PROVIDER: &str = "none";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub order_id: Uuid,
    pub reference: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub amount: Option<Decimal>,
    pub reason: String,
}

/// What a callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The callback settled a pending transaction.
    Applied,
    /// The transaction was already settled; nothing changed.
    Duplicate,
    /// Unauthenticated, malformed or unmatched; logged and dropped.
    Ignored,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied => "applied",
            CallbackOutcome::Duplicate => "duplicate",
            CallbackOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn PaymentProvider>,
    return_url: String,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn PaymentProvider>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            provider,
            return_url: return_url.into(),
        }
    }

    pub async fn initiate(
        &self,
        actor: &Actor,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation, AppError> {
        let now = self.clock.now();

        let (order, payment) = {
            let mut uow = self.store.begin().await?;
            let result = self.open_payment(uow.as_mut(), actor, order_id, method, now).await;
            finish(uow.as_mut(), result).await?
        };

        if payment.status == PaymentStatus::Completed {
            return Ok(PaymentInitiation {
                order_id,
                reference: payment.reference,
                status: payment.status,
                redirect_url: None,
                instructions: None,
            });
        }

        let request = CheckoutRequest {
            order_id,
            reference: payment.reference.clone(),
            amount: payment.amount,
            method,
            customer_email: order.billing_email.clone(),
            return_url: self.return_url.clone(),
        };

        let checkout = match self.provider.create_checkout(&request).await {
            Ok(checkout) => checkout,
            Err(err) => {
                warn!(
                    order_id = %order_id,
                    reference = %payment.reference,
                    error = %err,
                    "Checkout creation failed"
                );
                self.abandon_payment(&payment.reference, &err.to_string()).await?;
                return Err(err.into());
            }
        };

        let payment = {
            let mut uow = self.store.begin().await?;
            let result = attach_transaction_id(
                uow.as_mut(),
                &payment.reference,
                &checkout.transaction_id,
                self.clock.now(),
            )
            .await;
            finish(uow.as_mut(), result).await?
        };

        info!(
            order_id = %order_id,
            reference = %payment.reference,
            transaction_id = %checkout.transaction_id,
            "Payment initiated"
        );

        let (redirect_url, instructions) = match checkout.next_step {
            NextStep::Redirect { url } => (Some(url), None),
            NextStep::Instructions { text } => (None, Some(text)),
        };

        Ok(PaymentInitiation {
            order_id,
            reference: payment.reference,
            status: payment.status,
            redirect_url,
            instructions,
        })
    }

    async fn open_payment(
        &self,
        uow: &mut dyn UnitOfWork,
        actor: &Actor,
        order_id: Uuid,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<(Order, PaymentTransaction), AppError> {
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;

        if order.user_id != actor.user_id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "Only the buyer can pay for this order".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::OrderNotPending(format!(
                "Order '{}' is {}; payment can only be initiated for pending orders",
                order.booking_reference, order.status
            )));
        }

        let free = order.total_amount.is_zero();
        let payment = insert_payment(
            uow,
            NewPayment {
                id: Uuid::new_v4(),
                order_id,
                provider: if free {
                    NO_PAYMENT_PROVIDER.to_string()
                } else {
                    self.provider.name().to_string()
                },
                reference: String::new(),
                method,
                amount: order.total_amount,
                created_at: now,
            },
        )
        .await?;

        if free {
            // Fully discounted: nothing to collect.
            let payment = uow
                .update_payment(payment.id, &PaymentUpdate::status(PaymentStatus::Completed, now))
                .await?;
            let order = uow.set_order_status(order.id, OrderStatus::Completed, now).await?;
            info!(order_id = %order.id, "Zero-amount order completed without payment");
            return Ok((order, payment));
        }

        Ok((order, payment))
    }

    async fn abandon_payment(&self, reference: &str, reason: &str) -> Result<(), AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result: Result<(), AppError> = async {
            if let Some(payment) = uow.lock_payment_by_reference(reference).await? {
                // A callback may already have settled it.
                if !payment.status.is_settled() {
                    let mut update = PaymentUpdate::status(PaymentStatus::Failed, now);
                    update.failure_reason = Some(reason.to_string());
                    uow.update_payment(payment.id, &update).await?;
                }
            }
            Ok(())
        }
        .await;
        finish(uow.as_mut(), result).await
    }

    /// Applies an authenticated provider callback. Rejected payloads are
    /// reported as [`CallbackOutcome::Ignored`] rather than errors so the
    /// provider does not retry them; only transient failures are errors.
    pub async fn on_callback(
        &self,
        provider: &str,
        payload: &CallbackPayload,
    ) -> Result<CallbackOutcome, AppError> {
        if provider != self.provider.name() {
            warn!(provider, "Callback for unknown provider dropped");
            return Ok(CallbackOutcome::Ignored);
        }

        let event = match self.provider.verify_callback(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    provider,
                    reference = %payload.reference,
                    error = %err,
                    "Callback rejected"
                );
                return Ok(CallbackOutcome::Ignored);
            }
        };

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result = self.apply_callback(uow.as_mut(), &event, now).await;
        match finish(uow.as_mut(), result).await {
            Err(AppError::DuplicateWebhook(detail)) => {
                info!(
                    reference = %event.reference,
                    transaction_id = %event.transaction_id,
                    detail = %detail,
                    "Duplicate callback ignored"
                );
                Ok(CallbackOutcome::Duplicate)
            }
            other => other,
        }
    }

    async fn apply_callback(
        &self,
        uow: &mut dyn UnitOfWork,
        event: &CallbackEvent,
        now: DateTime<Utc>,
    ) -> Result<CallbackOutcome, AppError> {
        let Some(payment) = uow.lock_payment_by_reference(&event.reference).await? else {
            warn!(reference = %event.reference, "Callback for unknown payment reference");
            return Ok(CallbackOutcome::Ignored);
        };

        if payment.provider != self.provider.name() {
            warn!(reference = %event.reference, "Callback provider does not match transaction");
            return Ok(CallbackOutcome::Ignored);
        }

        if payment.status.is_settled() {
            return Err(AppError::DuplicateWebhook(format!(
                "Payment '{}' is already {:?}",
                payment.reference, payment.status
            )));
        }

        if let Some(known) = payment.transaction_id.as_deref() {
            if known != event.transaction_id {
                warn!(
                    reference = %event.reference,
                    expected = known,
                    received = %event.transaction_id,
                    "Callback transaction id mismatch"
                );
                return Ok(CallbackOutcome::Ignored);
            }
        } else if let Some(other) = uow
            .payment_by_transaction_id(&payment.provider, &event.transaction_id)
            .await?
        {
            warn!(
                reference = %event.reference,
                claimed_by = %other.reference,
                transaction_id = %event.transaction_id,
                "Provider transaction id already belongs to another payment"
            );
            return Ok(CallbackOutcome::Ignored);
        }

        let order = uow.lock_order(payment.order_id).await?.ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Payment '{}' points at a missing order",
                payment.reference
            ))
        })?;

        match event.status {
            CallbackStatus::Success if event.amount != payment.amount => {
                error!(
                    order_id = %order.id,
                    reference = %payment.reference,
                    expected = %payment.amount,
                    received = %event.amount,
                    "Captured amount does not match, refunding and failing the order"
                );
                // Whatever was captured goes back; no tickets are issued for it.
                self.provider
                    .refund(&event.transaction_id, event.amount)
                    .await?;
                let mut update = PaymentUpdate::status(PaymentStatus::Refunded, now);
                update.transaction_id = Some(event.transaction_id.clone());
                update.refunded_amount = Some(event.amount);
                update.failure_reason = Some(format!(
                    "amount mismatch: expected {}, received {}",
                    payment.amount, event.amount
                ));
                uow.update_payment(payment.id, &update).await?;
                if order.status == OrderStatus::Pending {
                    close_order(uow, &order, OrderStatus::Failed, now).await?;
                }
            }
            CallbackStatus::Success if order.status == OrderStatus::Pending => {
                let mut update = PaymentUpdate::status(PaymentStatus::Completed, now);
                update.transaction_id = Some(event.transaction_id.clone());
                uow.update_payment(payment.id, &update).await?;
                uow.set_order_status(order.id, OrderStatus::Completed, now).await?;
                info!(
                    order_id = %order.id,
                    reference = %payment.reference,
                    transaction_id = %event.transaction_id,
                    "Payment completed"
                );
            }
            CallbackStatus::Success => {
                // Captured after the order was closed: its tickets are gone,
                // so the money goes back.
                warn!(
                    order_id = %order.id,
                    order_status = %order.status,
                    reference = %payment.reference,
                    "Capture for a closed order, refunding"
                );
                self.provider
                    .refund(&event.transaction_id, event.amount)
                    .await?;
                let mut update = PaymentUpdate::status(PaymentStatus::Refunded, now);
                update.transaction_id = Some(event.transaction_id.clone());
                update.refunded_amount = Some(event.amount);
                update.failure_reason = Some(format!("order was {} at capture", order.status));
                uow.update_payment(payment.id, &update).await?;
            }
            CallbackStatus::Failure => {
                let reason = event
                    .reason
                    .clone()
                    .unwrap_or_else(|| "declined by provider".to_string());
                self.fail_payment(uow, &payment, &order, event, reason, now).await?;
            }
        }

        Ok(CallbackOutcome::Applied)
    }

    async fn fail_payment(
        &self,
        uow: &mut dyn UnitOfWork,
        payment: &PaymentTransaction,
        order: &Order,
        event: &CallbackEvent,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut update = PaymentUpdate::status(PaymentStatus::Failed, now);
        update.transaction_id = Some(event.transaction_id.clone());
        update.failure_reason = Some(reason);
        uow.update_payment(payment.id, &update).await?;

        if order.status == OrderStatus::Pending {
            close_order(uow, order, OrderStatus::Failed, now).await?;
        }

        info!(
            order_id = %order.id,
            reference = %payment.reference,
            "Payment failed"
        );
        Ok(())
    }

    /// Refunds a completed order in full (or `amount` of it) and returns its
    /// tickets to inventory. Not allowed once the event has started.
    pub async fn refund(
        &self,
        actor: &Actor,
        request: RefundRequest,
    ) -> Result<OrderDetails, AppError> {
        if actor.role == UserRole::Attendee {
            return Err(AppError::Forbidden(
                "Refunds require an organizer or admin".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(AppError::ValidationError(
                "A refund reason is required".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result = self.refund_in(uow.as_mut(), actor, &request, now).await;
        finish(uow.as_mut(), result).await
    }

    async fn refund_in(
        &self,
        uow: &mut dyn UnitOfWork,
        actor: &Actor,
        request: &RefundRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderDetails, AppError> {
        let order_id = request.order_id;
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;

        let event = uow.event(order.event_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Event '{}' was not found", order.event_id))
        })?;

        if !actor.can_manage(&event) {
            return Err(AppError::Forbidden(
                "Only the event's organizer or an admin can refund this order".to_string(),
            ));
        }
        if order.status != OrderStatus::Completed {
            return Err(AppError::OrderNotPending(format!(
                "Order '{}' is {}; only completed orders can be refunded",
                order.booking_reference, order.status
            )));
        }
        if event.has_started(now) {
            return Err(AppError::ValidationError(format!(
                "Event '{}' has already taken place; refunds are closed",
                event.title
            )));
        }

        let captured = uow
            .payments_for_order(order.id)
            .await?
            .into_iter()
            .find(|payment| payment.status == PaymentStatus::Completed);

        let amount = request.amount.unwrap_or(order.total_amount);
        let limit = captured
            .as_ref()
            .map_or(order.total_amount, |payment| payment.amount);
        if amount < Decimal::ZERO || amount > limit {
            return Err(AppError::ValidationError(format!(
                "Refund amount must be between 0 and {limit}"
            )));
        }

        if let Some(payment) = captured {
            if payment.provider != NO_PAYMENT_PROVIDER && amount > Decimal::ZERO {
                let transaction_id = payment.transaction_id.as_deref().ok_or_else(|| {
                    AppError::InternalServerError(format!(
                        "Captured payment '{}' has no provider transaction id",
                        payment.reference
                    ))
                })?;
                let refund_id = self.provider.refund(transaction_id, amount).await?;
                info!(
                    order_id = %order.id,
                    transaction_id,
                    refund_id = %refund_id,
                    amount = %amount,
                    "Provider refund issued"
                );
            }

            let mut update = PaymentUpdate::status(PaymentStatus::Refunded, now);
            update.refunded_amount = Some(amount);
            uow.update_payment(payment.id, &update).await?;
        }

        let order = close_order(uow, &order, OrderStatus::Refunded, now).await?;
        info!(
            order_id = %order.id,
            actor = %actor.user_id,
            amount = %amount,
            reason = %request.reason,
            "Order refunded"
        );

        load_details(uow, order).await
    }
}

async fn insert_payment(
    uow: &mut dyn UnitOfWork,
    mut new_payment: NewPayment,
) -> Result<PaymentTransaction, AppError> {
    for _ in 0..codes::MAX_CODE_ATTEMPTS {
        new_payment.reference = codes::payment_reference();
        if let Some(payment) = uow.insert_payment(&new_payment).await? {
            return Ok(payment);
        }
        warn!("Payment reference collision, retrying");
    }
    Err(AppError::InternalServerError(
        "could not allocate a unique payment reference".to_string(),
    ))
}

async fn attach_transaction_id(
    uow: &mut dyn UnitOfWork,
    reference: &str,
    transaction_id: &str,
    now: DateTime<Utc>,
) -> Result<PaymentTransaction, AppError> {
    let payment = uow
        .lock_payment_by_reference(reference)
        .await?
        .ok_or_else(|| AppError::InternalServerError(format!("Payment '{reference}' vanished")))?;

    // An early callback already recorded it.
    if payment.transaction_id.is_some() {
        return Ok(payment);
    }

    let mut update = PaymentUpdate::status(payment.status, now);
    update.transaction_id = Some(transaction_id.to_string());
    uow.update_payment(payment.id, &update).await
}
