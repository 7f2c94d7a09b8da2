#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use ticketing_server::clock::FixedClock;
use ticketing_server::models::{
    Actor, DiscountType, Event, EventStatus, Promotion, TicketType, UserRole,
};
use ticketing_server::payments::{sign_callback, CallbackPayload, CallbackStatus, MockPaymentProvider};
use ticketing_server::services::orders::{BillingInfo, OrderDetails};
use ticketing_server::services::{CreateOrder, TicketRequest};
use ticketing_server::state::AppState;
use ticketing_server::store::MemoryStore;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const RETURN_URL: &str = "http://localhost:3000/payments/complete";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub struct TestApp {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub provider: Arc<MockPaymentProvider>,
    pub state: AppState,
    pub organizer: Actor,
    pub event: Event,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(start_time()));
        let provider = Arc::new(MockPaymentProvider::new(WEBHOOK_SECRET));
        let state = AppState::new(
            Arc::new(store.clone()),
            clock.clone(),
            provider.clone(),
            RETURN_URL,
            Duration::minutes(30),
        );

        let organizer = Actor::new(Uuid::new_v4(), UserRole::Organizer);
        let event = event_for(organizer.user_id, start_time());
        store.insert_event(event.clone()).await;

        Self {
            store,
            clock,
            provider,
            state,
            organizer,
            event,
        }
    }

    pub async fn ticket_type(&self, name: &str, price: i64, quantity: i32) -> TicketType {
        let now = start_time();
        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            event_id: self.event.id,
            name: name.to_string(),
            price: Decimal::from(price),
            quantity,
            sold: 0,
            min_per_order: 1,
            max_per_order: Some(10),
            sale_starts_at: Some(now - Duration::days(1)),
            sale_ends_at: Some(now + Duration::days(5)),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_ticket_type(ticket_type.clone()).await;
        ticket_type
    }

    pub async fn percentage_promotion(&self, code: &str, percent: i64, max_uses: Option<i32>) -> Promotion {
        let now = start_time();
        let promotion = Promotion {
            id: Uuid::new_v4(),
            event_id: self.event.id,
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(percent),
            max_uses,
            used: 0,
            starts_at: Some(now - Duration::days(1)),
            ends_at: Some(now + Duration::days(5)),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_promotion(promotion.clone()).await;
        promotion
    }

    pub async fn sold(&self, ticket_type_id: Uuid) -> i32 {
        self.store
            .ticket_type(ticket_type_id)
            .await
            .map(|ticket_type| ticket_type.sold)
            .unwrap_or_default()
    }

    pub async fn used(&self, promotion_id: Uuid) -> i32 {
        self.store
            .promotion(promotion_id)
            .await
            .map(|promotion| promotion.used)
            .unwrap_or_default()
    }

    pub fn order_request(&self, buyer: &Actor, lines: &[(Uuid, i32)], code: Option<&str>) -> CreateOrder {
        CreateOrder {
            user_id: buyer.user_id,
            event_id: self.event.id,
            tickets: lines
                .iter()
                .map(|(ticket_type_id, quantity)| TicketRequest {
                    ticket_type_id: *ticket_type_id,
                    quantity: *quantity,
                    attendee_name: None,
                    attendee_email: None,
                })
                .collect(),
            promotion_code: code.map(str::to_string),
            billing: BillingInfo {
                billing_name: "Ada Buyer".to_string(),
                billing_email: "ada@example.com".to_string(),
                billing_address: None,
            },
        }
    }

    pub async fn place_order(&self, buyer: &Actor, lines: &[(Uuid, i32)]) -> OrderDetails {
        self.state
            .orders
            .create_order(self.order_request(buyer, lines, None))
            .await
            .unwrap()
    }

    pub fn callback(&self, reference: &str, transaction_id: &str, status: CallbackStatus, amount: Decimal) -> CallbackPayload {
        sign_callback(WEBHOOK_SECRET, reference, transaction_id, status, amount)
    }

    pub async fn transaction_id(&self, order_id: Uuid, reference: &str) -> String {
        self.store
            .payments(order_id)
            .await
            .into_iter()
            .find(|payment| payment.reference == reference)
            .and_then(|payment| payment.transaction_id)
            .unwrap()
    }
}

pub fn attendee() -> Actor {
    Actor::new(Uuid::new_v4(), UserRole::Attendee)
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), UserRole::Admin)
}

pub fn event_for(organizer_id: Uuid, now: DateTime<Utc>) -> Event {
    Event {
        id: Uuid::new_v4(),
        organizer_id,
        title: "Rust Meetup".to_string(),
        status: EventStatus::Published,
        event_date: now + Duration::days(7),
        booking_opens_at: None,
        booking_closes_at: None,
        created_at: now,
        updated_at: now,
    }
}
