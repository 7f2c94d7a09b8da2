//! Order creation, cancellation and the pending-order sweep.
//!
//! Creating an order reserves stock, redeems the promotion and writes the
//! order with its items inside one unit of work. Any failure rolls the unit
//! back, returning every unit reserved earlier in the same call.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{codes, finish, inventory, promotions};
use crate::clock::Clock;
use crate::models::order::totals_reconcile;
use crate::models::ticket::TicketAvailability;
use crate::models::{Actor, Order, OrderItem, OrderStatus, PaymentTransaction};
use crate::store::{NewOrder, NewOrderItem, Store, UnitOfWork};
use crate::utils::error::AppError;

const MAX_TICKET_LINES: usize = 50;
const SWEEP_BATCH: i64 = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingInfo {
    pub billing_name: String,
    pub billing_email: String,
    pub billing_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub tickets: Vec<TicketRequest>,
    pub promotion_code: Option<String>,
    pub billing: BillingInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<PaymentTransaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
}

fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

fn validate_request(request: &CreateOrder) -> Result<(), AppError> {
    if request.tickets.is_empty() {
        return Err(AppError::ValidationError(
            "At least one ticket must be requested".to_string(),
        ));
    }
    if request.tickets.len() > MAX_TICKET_LINES {
        return Err(AppError::ValidationError(format!(
            "At most {MAX_TICKET_LINES} ticket lines may be requested per order"
        )));
    }
    if let Some(line) = request.tickets.iter().find(|line| line.quantity < 1) {
        return Err(AppError::ValidationError(format!(
            "Quantity for ticket type '{}' must be at least 1",
            line.ticket_type_id
        )));
    }
    if request
        .tickets
        .iter()
        .filter_map(|line| line.attendee_email.as_deref())
        .any(|email| !looks_like_email(email))
    {
        return Err(AppError::ValidationError(
            "Attendee email is invalid".to_string(),
        ));
    }
    if request.billing.billing_name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Billing name is required".to_string(),
        ));
    }
    if !looks_like_email(&request.billing.billing_email) {
        return Err(AppError::ValidationError(
            "Billing email is invalid".to_string(),
        ));
    }
    Ok(())
}

/// Moves an order out of an open state and gives back what it held: items
/// not yet checked in are cancelled, inventory and promotion use are
/// released. Both releases are idempotent, so repeating this for an order
/// never returns units twice.
pub(crate) async fn close_order(
    uow: &mut dyn UnitOfWork,
    order: &Order,
    status: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    if !order.status.can_transition_to(status) {
        return Err(AppError::OrderNotPending(format!(
            "Order '{}' is {} and cannot become {}",
            order.booking_reference, order.status, status
        )));
    }

    let updated = uow.set_order_status(order.id, status, now).await?;
    uow.cancel_unchecked_items(order.id).await?;
    inventory::release_order(uow, order.id, now).await?;
    promotions::release(uow, order.id, order.promotion_id, now).await?;

    info!(
        order_id = %order.id,
        from = %order.status,
        to = %status,
        "Order closed"
    );
    Ok(updated)
}

pub(crate) async fn load_details(
    uow: &mut dyn UnitOfWork,
    order: Order,
) -> Result<OrderDetails, AppError> {
    let items = uow.order_items(order.id).await?;
    let payments = uow.payments_for_order(order.id).await?;
    Ok(OrderDetails {
        order,
        items,
        payments,
    })
}

#[derive(Clone)]
pub struct OrderOrchestrator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl OrderOrchestrator {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_order(&self, request: CreateOrder) -> Result<OrderDetails, AppError> {
        validate_request(&request)?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result = place_order(uow.as_mut(), &request, now).await;
        if let Err(err) = &result {
            warn!(
                event_id = %request.event_id,
                user_id = %request.user_id,
                code = err.code(),
                "Order creation aborted, reservations rolled back"
            );
        }
        finish(uow.as_mut(), result).await
    }

    pub async fn cancel_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result: Result<Order, AppError> = async {
            let order = uow
                .lock_order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;

            if order.user_id != actor.user_id && !actor.is_admin() {
                return Err(AppError::Forbidden(
                    "Only the buyer or an admin can cancel this order".to_string(),
                ));
            }
            if order.status != OrderStatus::Pending {
                return Err(AppError::OrderNotPending(format!(
                    "Order '{}' is {}; only pending orders can be cancelled",
                    order.booking_reference, order.status
                )));
            }

            close_order(uow.as_mut(), &order, OrderStatus::Cancelled, now).await
        }
        .await;
        finish(uow.as_mut(), result).await
    }

    /// Cancels pending orders created more than `ttl` ago, one unit of work
    /// per order. Driven by an external scheduler.
    pub async fn expire_pending(&self, ttl: Duration) -> Result<SweepReport, AppError> {
        let now = self.clock.now();
        let cutoff = now - ttl;

        let stale = {
            let mut uow = self.store.begin().await?;
            let result = uow.stale_pending_orders(cutoff, SWEEP_BATCH).await;
            finish(uow.as_mut(), result).await?
        };

        let mut expired = 0;
        for order_id in &stale {
            let mut uow = self.store.begin().await?;
            let result: Result<bool, AppError> = async {
                match uow.lock_order(*order_id).await? {
                    // Re-checked under the lock: payment may have landed meanwhile.
                    Some(order) if order.status == OrderStatus::Pending && order.created_at < cutoff => {
                        close_order(uow.as_mut(), &order, OrderStatus::Cancelled, now).await?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            .await;
            if finish(uow.as_mut(), result).await? {
                expired += 1;
            }
        }

        if expired > 0 {
            info!(expired, examined = stale.len(), "Expired stale pending orders");
        }
        Ok(SweepReport {
            examined: stale.len(),
            expired,
        })
    }

    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let mut uow = self.store.begin().await?;
        let result: Result<OrderDetails, AppError> = async {
            let order = uow
                .order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;

            if order.user_id != actor.user_id && !actor.is_admin() {
                let event = uow.event(order.event_id).await?;
                if !event.is_some_and(|event| actor.can_manage(&event)) {
                    return Err(AppError::Forbidden(
                        "You cannot view this order".to_string(),
                    ));
                }
            }

            load_details(uow.as_mut(), order).await
        }
        .await;
        finish(uow.as_mut(), result).await
    }

    pub async fn ticket_availability(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<TicketAvailability>, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result: Result<Vec<TicketAvailability>, AppError> = async {
            if uow.event(event_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Event '{event_id}' was not found")));
            }
            let rows = uow.ticket_types_for_event(event_id).await?;
            Ok(rows
                .iter()
                .map(|ticket_type| TicketAvailability::from_ticket_type(ticket_type, now))
                .collect())
        }
        .await;
        finish(uow.as_mut(), result).await
    }

    pub async fn preview_promotion(
        &self,
        event_id: Uuid,
        code: &str,
        subtotal: Decimal,
    ) -> Result<promotions::Redemption, AppError> {
        if subtotal < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "Subtotal cannot be negative".to_string(),
            ));
        }
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result = promotions::preview(uow.as_mut(), code, event_id, subtotal, now).await;
        // Preview never writes.
        uow.rollback().await?;
        result
    }
}

async fn place_order(
    uow: &mut dyn UnitOfWork,
    request: &CreateOrder,
    now: DateTime<Utc>,
) -> Result<OrderDetails, AppError> {
    let event = uow
        .event(request.event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{}' was not found", request.event_id)))?;

    if !event.is_bookable(now) {
        return Err(AppError::TicketWindowClosed(format!(
            "Event '{}' is not open for booking",
            event.title
        )));
    }

    // One reservation per ticket type, in id order, so concurrent orders
    // spanning several types always lock rows in the same sequence.
    let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in &request.tickets {
        let total = wanted.entry(line.ticket_type_id).or_insert(0);
        *total = total.checked_add(line.quantity).ok_or_else(|| {
            AppError::QuantityOutOfRange(format!(
                "Too many tickets requested for ticket type '{}'",
                line.ticket_type_id
            ))
        })?;
    }

    let mut unit_prices: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for (ticket_type_id, quantity) in &wanted {
        let reservation =
            inventory::reserve(uow, event.id, *ticket_type_id, *quantity, now).await?;
        unit_prices.insert(*ticket_type_id, reservation.ticket_type.price);
    }

    let mut subtotal = Decimal::ZERO;
    let mut lines = Vec::with_capacity(request.tickets.len());
    for line in &request.tickets {
        let unit_price = unit_prices
            .get(&line.ticket_type_id)
            .copied()
            .ok_or_else(|| AppError::InternalServerError("missing reservation".to_string()))?;
        let total_price = unit_price * Decimal::from(line.quantity);
        subtotal += total_price;
        lines.push((line, unit_price, total_price));
    }

    let redemption = match request
        .promotion_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        Some(code) => Some(promotions::redeem(uow, code, event.id, subtotal, now).await?),
        None => None,
    };

    let discount = redemption
        .as_ref()
        .map_or(Decimal::ZERO, |redemption| redemption.discount);

    let order = insert_order(
        uow,
        NewOrder {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            event_id: event.id,
            booking_reference: String::new(),
            total_amount: subtotal - discount,
            discount_amount: discount,
            promotion_id: redemption.as_ref().map(|redemption| redemption.promotion_id),
            billing_name: request.billing.billing_name.trim().to_string(),
            billing_email: request.billing.billing_email.trim().to_string(),
            billing_address: request.billing.billing_address.clone(),
            created_at: now,
        },
    )
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (line, unit_price, total_price) in lines {
        let item = insert_item(
            uow,
            NewOrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                ticket_type_id: line.ticket_type_id,
                quantity: line.quantity,
                unit_price,
                total_price,
                ticket_code: String::new(),
                attendee_name: line.attendee_name.clone(),
                attendee_email: line.attendee_email.clone(),
                created_at: now,
            },
        )
        .await?;
        items.push(item);
    }

    if !totals_reconcile(&order, &items) {
        return Err(AppError::InternalServerError(format!(
            "Order '{}' totals do not reconcile with its items",
            order.id
        )));
    }

    info!(
        order_id = %order.id,
        booking_reference = %order.booking_reference,
        event_id = %event.id,
        total = %order.total_amount,
        discount = %order.discount_amount,
        items = items.len(),
        "Order created"
    );

    Ok(OrderDetails {
        order,
        items,
        payments: Vec::new(),
    })
}

async fn insert_order(uow: &mut dyn UnitOfWork, mut new_order: NewOrder) -> Result<Order, AppError> {
    for _ in 0..codes::MAX_CODE_ATTEMPTS {
        new_order.booking_reference = codes::booking_reference();
        if let Some(order) = uow.insert_order(&new_order).await? {
            return Ok(order);
        }
        warn!("Booking reference collision, retrying");
    }
    Err(AppError::InternalServerError(
        "could not allocate a unique booking reference".to_string(),
    ))
}

async fn insert_item(
    uow: &mut dyn UnitOfWork,
    mut new_item: NewOrderItem,
) -> Result<OrderItem, AppError> {
    for _ in 0..codes::MAX_CODE_ATTEMPTS {
        new_item.ticket_code = codes::ticket_code();
        if let Some(item) = uow.insert_order_item(&new_item).await? {
            return Ok(item);
        }
        warn!("Ticket code collision, retrying");
    }
    Err(AppError::InternalServerError(
        "could not allocate a unique ticket code".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tickets: Vec<TicketRequest>, email: &str) -> CreateOrder {
        CreateOrder {
            user_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            tickets,
            promotion_code: None,
            billing: BillingInfo {
                billing_name: "Ada Buyer".to_string(),
                billing_email: email.to_string(),
                billing_address: None,
            },
        }
    }

    fn line(quantity: i32) -> TicketRequest {
        TicketRequest {
            ticket_type_id: Uuid::new_v4(),
            quantity,
            attendee_name: None,
            attendee_email: None,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(validate_request(&request(vec![line(1)], "ada@example.com")).is_ok());
        assert!(matches!(
            validate_request(&request(vec![], "ada@example.com")),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            validate_request(&request(vec![line(0)], "ada@example.com")),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            validate_request(&request(vec![line(1)], "not-an-email")),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a@localhost"));
    }
}
