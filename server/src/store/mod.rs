//! Transactional persistence for the ticketing core.
//!
//! Every mutating operation runs inside a [`UnitOfWork`]: nothing it does is
//! visible to other units until [`UnitOfWork::commit`], and dropping or
//! rolling back a unit discards all of its writes. Counters (`sold`, `used`)
//! are only ever changed through the checked increment/decrement methods,
//! which refuse to cross their row's bounds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Event, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, PaymentTransaction,
    Promotion, TicketType,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub booking_reference: String,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub promotion_id: Option<Uuid>,
    pub billing_name: String,
    pub billing_email: String,
    pub billing_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub ticket_code: String,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub reference: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub refunded_amount: Option<Decimal>,
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentUpdate {
    pub fn status(status: PaymentStatus, updated_at: DateTime<Utc>) -> Self {
        Self {
            status,
            transaction_id: None,
            refunded_amount: None,
            failure_reason: None,
            updated_at,
        }
    }
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn event(&mut self, id: Uuid) -> Result<Option<Event>, AppError>;

    async fn ticket_type(&mut self, id: Uuid) -> Result<Option<TicketType>, AppError>;

    async fn ticket_types_for_event(&mut self, event_id: Uuid)
        -> Result<Vec<TicketType>, AppError>;

    /// Adds `quantity` to `sold` only if the result stays within `quantity`.
    /// Returns the updated row, or `None` when there is not enough stock.
    async fn increment_sold(
        &mut self,
        id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketType>, AppError>;

    /// Subtracts `quantity` from `sold` only if it does not go negative.
    async fn decrement_sold(
        &mut self,
        id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketType>, AppError>;

    /// Looks up a promotion by event and code, holding its row lock.
    async fn lock_promotion_by_code(
        &mut self,
        event_id: Uuid,
        code: &str,
    ) -> Result<Option<Promotion>, AppError>;

    /// Bumps `used` unless it already reached `max_uses`.
    async fn increment_promotion_use(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn decrement_promotion_use(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Returns `None` when the booking reference is already taken.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Option<Order>, AppError>;

    /// Returns `None` when the ticket code is already taken.
    async fn insert_order_item(&mut self, item: &NewOrderItem)
        -> Result<Option<OrderItem>, AppError>;

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>, AppError>;

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, AppError>;

    async fn set_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Order, AppError>;

    /// Flips the order's promotion release flag. `true` only for the caller
    /// that flipped it.
    async fn mark_promotion_released(&mut self, order_id: Uuid) -> Result<bool, AppError>;

    async fn stale_pending_orders(
        &mut self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;

    async fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, AppError>;

    async fn lock_order_item(&mut self, id: Uuid) -> Result<Option<OrderItem>, AppError>;

    /// Flips the item's inventory release flag. `true` only for the caller
    /// that flipped it.
    async fn mark_item_released(&mut self, item_id: Uuid) -> Result<bool, AppError>;

    /// Moves every `not_checked` item of the order to `cancelled`.
    async fn cancel_unchecked_items(&mut self, order_id: Uuid) -> Result<u64, AppError>;

    /// Moves one item from `not_checked` to `checked_in`; `None` if it was
    /// not in `not_checked`.
    async fn mark_item_checked_in(
        &mut self,
        item_id: Uuid,
        checked_in_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderItem>, AppError>;

    /// Returns `None` when the payment reference is already taken.
    async fn insert_payment(&mut self, payment: &NewPayment)
        -> Result<Option<PaymentTransaction>, AppError>;

    async fn lock_payment_by_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, AppError>;

    async fn payment_by_transaction_id(
        &mut self,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, AppError>;

    async fn update_payment(
        &mut self,
        id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentTransaction, AppError>;

    async fn payments_for_order(&mut self, order_id: Uuid)
        -> Result<Vec<PaymentTransaction>, AppError>;

    async fn commit(&mut self) -> Result<(), AppError>;

    async fn rollback(&mut self) -> Result<(), AppError>;
}
