use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Pending,
    Approved,
    Published,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub status: EventStatus,
    pub event_date: DateTime<Utc>,
    pub booking_opens_at: Option<DateTime<Utc>>,
    pub booking_closes_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// An event takes orders once approved or published, before it starts,
    /// and inside its optional booking window.
    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        let approved = matches!(self.status, EventStatus::Approved | EventStatus::Published);
        let opened = self.booking_opens_at.map_or(true, |opens| now >= opens);
        let not_closed = self.booking_closes_at.map_or(true, |closes| now < closes);

        approved && opened && not_closed && now < self.event_date
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.event_date
    }
}
