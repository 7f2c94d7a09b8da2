use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A purchasable admission category. `sold` only moves through the
/// inventory reserve/release paths; `available` is derived.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub sold: i32,
    pub min_per_order: i32,
    pub max_per_order: Option<i32>,
    pub sale_starts_at: Option<DateTime<Utc>>,
    pub sale_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    pub fn available(&self) -> i32 {
        self.quantity - self.sold
    }

    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        let started = self.sale_starts_at.map_or(true, |start| now >= start);
        let not_ended = self.sale_ends_at.map_or(true, |end| now < end);
        started && not_ended
    }

    pub fn accepts_quantity(&self, quantity: i32) -> bool {
        quantity >= self.min_per_order && self.max_per_order.map_or(true, |max| quantity <= max)
    }
}

/// Live inventory view returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct TicketAvailability {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub sold: i32,
    pub available: i32,
    pub on_sale: bool,
}

impl TicketAvailability {
    pub fn from_ticket_type(ticket_type: &TicketType, now: DateTime<Utc>) -> Self {
        Self {
            id: ticket_type.id,
            name: ticket_type.name.clone(),
            price: ticket_type.price,
            quantity: ticket_type.quantity,
            sold: ticket_type.sold,
            available: ticket_type.available(),
            on_sale: ticket_type.is_on_sale(now),
        }
    }
}
