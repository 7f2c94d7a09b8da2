//! Ticket inventory: checked reservation and idempotent release of units.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{OrderItem, TicketType};
use crate::store::UnitOfWork;
use crate::utils::error::AppError;

/// Proof that `quantity` units of a ticket type were taken inside the
/// current unit of work.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub ticket_type: TicketType,
    pub quantity: i32,
}

/// Sale window and per-order limits, checked before any stock is touched.
pub fn check_purchasable(
    ticket_type: &TicketType,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !ticket_type.is_on_sale(now) {
        return Err(AppError::TicketWindowClosed(format!(
            "Ticket type '{}' is not on sale",
            ticket_type.name
        )));
    }

    if !ticket_type.accepts_quantity(quantity) {
        let max = ticket_type
            .max_per_order
            .map_or_else(|| "unlimited".to_string(), |max| max.to_string());
        return Err(AppError::QuantityOutOfRange(format!(
            "Ticket type '{}' must be bought in quantities between {} and {}, got {}",
            ticket_type.name, ticket_type.min_per_order, max, quantity
        )));
    }

    Ok(())
}

pub async fn reserve(
    uow: &mut dyn UnitOfWork,
    event_id: Uuid,
    ticket_type_id: Uuid,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<Reservation, AppError> {
    let ticket_type = uow
        .ticket_type(ticket_type_id)
        .await?
        .filter(|ticket_type| ticket_type.event_id == event_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Ticket type '{ticket_type_id}' was not found for this event"
            ))
        })?;

    check_purchasable(&ticket_type, quantity, now)?;

    match uow.increment_sold(ticket_type_id, quantity, now).await? {
        Some(updated) => {
            debug!(
                ticket_type_id = %ticket_type_id,
                quantity,
                sold = updated.sold,
                available = updated.available(),
                "Reserved tickets"
            );
            Ok(Reservation {
                ticket_type: updated,
                quantity,
            })
        }
        None => {
            warn!(
                ticket_type_id = %ticket_type_id,
                requested = quantity,
                available = ticket_type.available(),
                "Reservation rejected, not enough tickets left"
            );
            Err(AppError::InsufficientInventory(format!(
                "Only {} ticket(s) left for '{}'",
                ticket_type.available().max(0),
                ticket_type.name
            )))
        }
    }
}

/// Returns the item's units to its ticket type, once. Returns `false` when
/// the item was already released.
pub async fn release_item(
    uow: &mut dyn UnitOfWork,
    item: &OrderItem,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    if !uow.mark_item_released(item.id).await? {
        debug!(order_item_id = %item.id, "Order item already released");
        return Ok(false);
    }

    if uow
        .decrement_sold(item.ticket_type_id, item.quantity, now)
        .await?
        .is_none()
    {
        return Err(AppError::InternalServerError(format!(
            "Ticket type '{}' has fewer sold units than order item '{}' holds",
            item.ticket_type_id, item.id
        )));
    }

    Ok(true)
}

/// Releases every item of an order; returns the number of units returned.
pub async fn release_order(
    uow: &mut dyn UnitOfWork,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<i32, AppError> {
    let mut released = 0;
    for item in uow.order_items(order_id).await? {
        if release_item(uow, &item, now).await? {
            released += item.quantity;
        }
    }

    if released > 0 {
        info!(order_id = %order_id, units = released, "Released order inventory");
    }
    Ok(released)
}
