use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    /// pending -> completed | failed | cancelled, completed -> refunded.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Completed, OrderStatus::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_in_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    NotChecked,
    CheckedIn,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub booking_reference: String,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub status: OrderStatus,
    pub promotion_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub promotion_released: bool,
    pub billing_name: String,
    pub billing_email: String,
    pub billing_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub ticket_code: String,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub check_in_status: CheckInStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_in_by: Option<Uuid>,
    #[serde(skip_serializing)]
    pub inventory_released: bool,
    pub created_at: DateTime<Utc>,
}

/// Checks `total_amount = sum(item.total_price) - discount_amount`.
pub fn totals_reconcile(order: &Order, items: &[OrderItem]) -> bool {
    let subtotal: Decimal = items.iter().map(|item| item.total_price).sum();
    order.discount_amount >= Decimal::ZERO && order.total_amount == subtotal - order.discount_amount
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Refunded));

        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Refunded));
    }
}
