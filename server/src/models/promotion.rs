use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discount_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Promotion {
    pub id: Uuid,
    pub event_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub used: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.starts_at.map_or(true, |start| now >= start);
        let not_ended = self.ends_at.map_or(true, |end| now < end);
        started && not_ended
    }

    pub fn has_uses_left(&self) -> bool {
        self.max_uses.map_or(true, |max| self.used < max)
    }
}
