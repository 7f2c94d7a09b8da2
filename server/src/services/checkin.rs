//! Per-ticket entry state: `not_checked -> checked_in` once, and only for
//! tickets of a completed order.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::finish;
use crate::clock::Clock;
use crate::models::{Actor, CheckInStatus, OrderItem, OrderStatus};
use crate::store::{Store, UnitOfWork};
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct CheckInLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CheckInLedger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn check_in(&self, actor: &Actor, item_id: Uuid) -> Result<OrderItem, AppError> {
        let mut uow = self.store.begin().await?;
        let result = self.check_in_in(uow.as_mut(), actor, item_id).await;
        finish(uow.as_mut(), result).await
    }

    async fn check_in_in(
        &self,
        uow: &mut dyn UnitOfWork,
        actor: &Actor,
        item_id: Uuid,
    ) -> Result<OrderItem, AppError> {
        let item = uow
            .lock_order_item(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking '{item_id}' was not found")))?;

        let order = uow.order(item.order_id).await?.ok_or_else(|| {
            AppError::InternalServerError(format!("Booking '{item_id}' has no order"))
        })?;
        let event = uow.event(order.event_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Event '{}' was not found", order.event_id))
        })?;

        if !actor.can_manage(&event) {
            return Err(AppError::Forbidden(
                "Only the event's organizer or an admin can check tickets in".to_string(),
            ));
        }

        match item.check_in_status {
            CheckInStatus::CheckedIn => {
                warn!(
                    order_item_id = %item.id,
                    ticket_code = %item.ticket_code,
                    "Repeated check-in attempt"
                );
                return Err(AppError::AlreadyCheckedIn(format!(
                    "Ticket '{}' was already checked in",
                    item.ticket_code
                )));
            }
            CheckInStatus::Cancelled => {
                return Err(AppError::OrderNotPending(format!(
                    "Ticket '{}' was cancelled",
                    item.ticket_code
                )));
            }
            CheckInStatus::NotChecked => {}
        }

        if order.status != OrderStatus::Completed {
            return Err(AppError::OrderNotPending(format!(
                "Order '{}' is {}; only paid tickets can be checked in",
                order.booking_reference, order.status
            )));
        }

        let now = self.clock.now();
        let checked = uow
            .mark_item_checked_in(item.id, actor.user_id, now)
            .await?
            .ok_or_else(|| {
                AppError::AlreadyCheckedIn(format!(
                    "Ticket '{}' was already checked in",
                    item.ticket_code
                ))
            })?;

        info!(
            order_item_id = %checked.id,
            order_id = %order.id,
            event_id = %event.id,
            checked_in_by = %actor.user_id,
            "Ticket checked in"
        );
        Ok(checked)
    }
}
