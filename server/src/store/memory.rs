//! In-process store used by the test suite and by local runs without a
//! database.
//!
//! A unit of work holds the store's lock from `begin` until it finishes and
//! writes into a private copy of the tables, which replaces the shared copy
//! on commit. Units are therefore fully serialised, which gives the same
//! all-or-nothing behaviour as a Postgres transaction for the sizes tests use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{NewOrder, NewOrderItem, NewPayment, PaymentUpdate, Store, UnitOfWork};
use crate::models::{
    CheckInStatus, Event, Order, OrderItem, OrderStatus, PaymentStatus, PaymentTransaction,
    Promotion, TicketType,
};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    ticket_types: HashMap<Uuid, TicketType>,
    promotions: HashMap<Uuid, Promotion>,
    orders: HashMap<Uuid, Order>,
    order_items: HashMap<Uuid, OrderItem>,
    payments: HashMap<Uuid, PaymentTransaction>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.tables.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_ticket_type(&self, ticket_type: TicketType) {
        self.tables
            .lock()
            .await
            .ticket_types
            .insert(ticket_type.id, ticket_type);
    }

    pub async fn insert_promotion(&self, promotion: Promotion) {
        self.tables
            .lock()
            .await
            .promotions
            .insert(promotion.id, promotion);
    }

    pub async fn ticket_type(&self, id: Uuid) -> Option<TicketType> {
        self.tables.lock().await.ticket_types.get(&id).cloned()
    }

    pub async fn promotion(&self, id: Uuid) -> Option<Promotion> {
        self.tables.lock().await.promotions.get(&id).cloned()
    }

    pub async fn order(&self, id: Uuid) -> Option<Order> {
        self.tables.lock().await.orders.get(&id).cloned()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.tables.lock().await.orders.values().cloned().collect()
    }

    pub async fn order_items(&self, order_id: Uuid) -> Vec<OrderItem> {
        let tables = self.tables.lock().await;
        items_of(&tables, order_id)
    }

    pub async fn payments(&self, order_id: Uuid) -> Vec<PaymentTransaction> {
        let tables = self.tables.lock().await;
        payments_of(&tables, order_id)
    }
}

fn items_of(tables: &Tables, order_id: Uuid) -> Vec<OrderItem> {
    let mut items: Vec<OrderItem> = tables
        .order_items
        .values()
        .filter(|item| item.order_id == order_id)
        .cloned()
        .collect();
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    items
}

fn payments_of(tables: &Tables, order_id: Uuid) -> Vec<PaymentTransaction> {
    let mut payments: Vec<PaymentTransaction> = tables
        .payments
        .values()
        .filter(|payment| payment.order_id == order_id)
        .cloned()
        .collect();
    payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    payments
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard: Some(guard),
            staged,
        }))
    }
}

pub struct MemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<Tables>>,
    staged: Tables,
}

impl MemoryUnitOfWork {
    fn tables(&mut self) -> Result<&mut Tables, AppError> {
        if self.guard.is_none() {
            return Err(AppError::InternalServerError(
                "unit of work already finished".to_string(),
            ));
        }
        Ok(&mut self.staged)
    }

    fn order_mut(&mut self, id: Uuid) -> Result<&mut Order, AppError> {
        self.tables()?
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Order '{id}' was not found")))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn event(&mut self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.tables()?.events.get(&id).cloned())
    }

    async fn ticket_type(&mut self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        Ok(self.tables()?.ticket_types.get(&id).cloned())
    }

    async fn ticket_types_for_event(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<TicketType>, AppError> {
        let mut rows: Vec<TicketType> = self
            .tables()?
            .ticket_types
            .values()
            .filter(|ticket_type| ticket_type.event_id == event_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.price.cmp(&b.price).then(a.name.cmp(&b.name)));
        Ok(rows)
    }

    async fn increment_sold(
        &mut self,
        id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketType>, AppError> {
        let Some(row) = self.tables()?.ticket_types.get_mut(&id) else {
            return Ok(None);
        };
        if quantity > row.quantity - row.sold {
            return Ok(None);
        }
        row.sold += quantity;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn decrement_sold(
        &mut self,
        id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketType>, AppError> {
        let Some(row) = self.tables()?.ticket_types.get_mut(&id) else {
            return Ok(None);
        };
        if row.sold < quantity {
            return Ok(None);
        }
        row.sold -= quantity;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn lock_promotion_by_code(
        &mut self,
        event_id: Uuid,
        code: &str,
    ) -> Result<Option<Promotion>, AppError> {
        Ok(self
            .tables()?
            .promotions
            .values()
            .find(|promotion| promotion.event_id == event_id && promotion.code == code)
            .cloned())
    }

    async fn increment_promotion_use(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(promotion) = self.tables()?.promotions.get_mut(&id) else {
            return Ok(false);
        };
        if !promotion.has_uses_left() {
            return Ok(false);
        }
        promotion.used += 1;
        promotion.updated_at = now;
        Ok(true)
    }

    async fn decrement_promotion_use(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(promotion) = self.tables()?.promotions.get_mut(&id) else {
            return Ok(false);
        };
        if promotion.used == 0 {
            return Ok(false);
        }
        promotion.used -= 1;
        promotion.updated_at = now;
        Ok(true)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Option<Order>, AppError> {
        let tables = self.tables()?;
        if tables
            .orders
            .values()
            .any(|existing| existing.booking_reference == order.booking_reference)
        {
            return Ok(None);
        }

        let row = Order {
            id: order.id,
            user_id: order.user_id,
            event_id: order.event_id,
            booking_reference: order.booking_reference.clone(),
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            status: OrderStatus::Pending,
            promotion_id: order.promotion_id,
            promotion_released: false,
            billing_name: order.billing_name.clone(),
            billing_email: order.billing_email.clone(),
            billing_address: order.billing_address.clone(),
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        tables.orders.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn insert_order_item(
        &mut self,
        item: &NewOrderItem,
    ) -> Result<Option<OrderItem>, AppError> {
        let tables = self.tables()?;
        if tables
            .order_items
            .values()
            .any(|existing| existing.ticket_code == item.ticket_code)
        {
            return Ok(None);
        }

        let row = OrderItem {
            id: item.id,
            order_id: item.order_id,
            ticket_type_id: item.ticket_type_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            ticket_code: item.ticket_code.clone(),
            attendee_name: item.attendee_name.clone(),
            attendee_email: item.attendee_email.clone(),
            check_in_status: CheckInStatus::NotChecked,
            checked_in_at: None,
            checked_in_by: None,
            inventory_released: false,
            created_at: item.created_at,
        };
        tables.order_items.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.tables()?.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, AppError> {
        self.order(id).await
    }

    async fn set_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        let order = self.order_mut(id)?;
        order.status = status;
        order.updated_at = now;
        Ok(order.clone())
    }

    async fn mark_promotion_released(&mut self, order_id: Uuid) -> Result<bool, AppError> {
        let order = self.order_mut(order_id)?;
        if order.promotion_id.is_none() || order.promotion_released {
            return Ok(false);
        }
        order.promotion_released = true;
        Ok(true)
    }

    async fn stale_pending_orders(
        &mut self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut stale: Vec<&Order> = self
            .tables()?
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Pending && order.created_at < created_before)
            .collect();
        stale.sort_by_key(|order| order.created_at);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(stale.into_iter().take(limit).map(|order| order.id).collect())
    }

    async fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
        Ok(items_of(self.tables()?, order_id))
    }

    async fn lock_order_item(&mut self, id: Uuid) -> Result<Option<OrderItem>, AppError> {
        Ok(self.tables()?.order_items.get(&id).cloned())
    }

    async fn mark_item_released(&mut self, item_id: Uuid) -> Result<bool, AppError> {
        let Some(item) = self.tables()?.order_items.get_mut(&item_id) else {
            return Ok(false);
        };
        if item.inventory_released {
            return Ok(false);
        }
        item.inventory_released = true;
        Ok(true)
    }

    async fn cancel_unchecked_items(&mut self, order_id: Uuid) -> Result<u64, AppError> {
        let mut cancelled = 0;
        for item in self.tables()?.order_items.values_mut() {
            if item.order_id == order_id && item.check_in_status == CheckInStatus::NotChecked {
                item.check_in_status = CheckInStatus::Cancelled;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn mark_item_checked_in(
        &mut self,
        item_id: Uuid,
        checked_in_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderItem>, AppError> {
        let Some(item) = self.tables()?.order_items.get_mut(&item_id) else {
            return Ok(None);
        };
        if item.check_in_status != CheckInStatus::NotChecked {
            return Ok(None);
        }
        item.check_in_status = CheckInStatus::CheckedIn;
        item.checked_in_at = Some(at);
        item.checked_in_by = Some(checked_in_by);
        Ok(Some(item.clone()))
    }

    async fn insert_payment(
        &mut self,
        payment: &NewPayment,
    ) -> Result<Option<PaymentTransaction>, AppError> {
        let tables = self.tables()?;
        if tables
            .payments
            .values()
            .any(|existing| existing.reference == payment.reference)
        {
            return Ok(None);
        }

        let row = PaymentTransaction {
            id: payment.id,
            order_id: payment.order_id,
            provider: payment.provider.clone(),
            reference: payment.reference.clone(),
            transaction_id: None,
            method: payment.method,
            status: PaymentStatus::Pending,
            amount: payment.amount,
            refunded_amount: None,
            failure_reason: None,
            created_at: payment.created_at,
            updated_at: payment.created_at,
        };
        tables.payments.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn lock_payment_by_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, AppError> {
        Ok(self
            .tables()?
            .payments
            .values()
            .find(|payment| payment.reference == reference)
            .cloned())
    }

    async fn payment_by_transaction_id(
        &mut self,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, AppError> {
        Ok(self
            .tables()?
            .payments
            .values()
            .find(|payment| {
                payment.provider == provider
                    && payment.transaction_id.as_deref() == Some(transaction_id)
            })
            .cloned())
    }

    async fn update_payment(
        &mut self,
        id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentTransaction, AppError> {
        let tables = self.tables()?;
        if let Some(transaction_id) = &update.transaction_id {
            let provider = tables
                .payments
                .get(&id)
                .map(|payment| payment.provider.clone())
                .unwrap_or_default();
            let taken = tables.payments.values().any(|other| {
                other.id != id
                    && other.provider == provider
                    && other.transaction_id.as_ref() == Some(transaction_id)
            });
            if taken {
                return Err(AppError::InternalServerError(format!(
                    "provider transaction '{transaction_id}' is already recorded"
                )));
            }
        }

        let payment = tables
            .payments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Payment transaction '{id}' was not found")))?;
        payment.status = update.status;
        if let Some(transaction_id) = &update.transaction_id {
            payment.transaction_id = Some(transaction_id.clone());
        }
        if let Some(refunded) = update.refunded_amount {
            payment.refunded_amount = Some(refunded);
        }
        if let Some(reason) = &update.failure_reason {
            payment.failure_reason = Some(reason.clone());
        }
        payment.updated_at = update.updated_at;
        Ok(payment.clone())
    }

    async fn payments_for_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, AppError> {
        Ok(payments_of(self.tables()?, order_id))
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        match self.guard.take() {
            Some(mut guard) => {
                *guard = std::mem::take(&mut self.staged);
                Ok(())
            }
            None => Err(AppError::InternalServerError(
                "unit of work already finished".to_string(),
            )),
        }
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.guard.take();
        self.staged = Tables::default();
        Ok(())
    }
}
