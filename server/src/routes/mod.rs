use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer, Config};
use crate::handlers::{checkin, events, health_check, orders, payments};
use crate::state::AppState;

/// The API routes with state applied, without the transport layers.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events/:event_id/ticket-types", get(events::list_ticket_types))
        .route("/events/:event_id/orders", post(orders::create_order))
        .route(
            "/events/:event_id/promotions/validate",
            post(events::validate_promotion),
        )
        .route("/orders/:order_id", get(orders::get_order))
        .route("/orders/:order_id/cancel", post(orders::cancel_order))
        .route("/payments/initialize", post(payments::initialize_payment))
        .route("/payments/refund", post(payments::refund_payment))
        .route("/payments/:provider/callback", get(payments::payment_callback))
        .route("/payments/:provider/webhook", post(payments::payment_webhook))
        .route(
            "/organizer/bookings/:booking_id/check-in",
            put(checkin::check_in),
        )
        .route(
            "/internal/orders/expire",
            post(orders::expire_pending_orders),
        )
        .with_state(state)
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let router = api_routes(state);
    apply_security_headers(router, config.production)
        .layer(create_cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
}
