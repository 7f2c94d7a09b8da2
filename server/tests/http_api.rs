mod support;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use support::{attendee, TestApp};
use ticketing_server::models::Actor;
use ticketing_server::payments::CallbackStatus;
use ticketing_server::routes::api_routes;

fn request(method: Method, uri: &str, actor: Option<&Actor>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        let role = format!("{:?}", actor.role).to_lowercase();
        builder = builder
            .header("x-user-id", actor.user_id.to_string())
            .header("x-user-role", role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn order_body(ticket_type_id: uuid::Uuid, quantity: i32) -> Value {
    json!({
        "tickets": [{ "ticketTypeId": ticket_type_id, "quantity": quantity }],
        "billingName": "Ada Buyer",
        "billingEmail": "ada@example.com"
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let router = api_routes(app.state.clone());

    let (status, body) = send(&router, request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_order_requires_identity() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 10).await;
    let router = api_routes(app.state.clone());
    let uri = format!("/events/{}/orders", app.event.id);

    let (status, body) = send(
        &router,
        request(Method::POST, &uri, None, Some(order_body(general.id, 1))),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_create_order_then_sold_out() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 1).await;
    let router = api_routes(app.state.clone());
    let uri = format!("/events/{}/orders", app.event.id);

    let (status, body) = send(
        &router,
        request(Method::POST, &uri, Some(&attendee()), Some(order_body(general.id, 1))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["order"]["status"], "pending");
    assert!(body["data"]["order"].get("promotion_released").is_none());

    let (status, body) = send(
        &router,
        request(Method::POST, &uri, Some(&attendee()), Some(order_body(general.id, 1))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_INVENTORY");
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = TestApp::new().await;
    let router = api_routes(app.state.clone());
    let uri = format!("/events/{}/orders", app.event.id);

    let (status, body) = send(
        &router,
        request(Method::POST, &uri, Some(&attendee()), Some(json!({ "tickets": "many" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_webhook_flow() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 10).await;
    let buyer = attendee();
    let details = app.place_order(&buyer, &[(general.id, 1)]).await;
    let router = api_routes(app.state.clone());

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/payments/initialize",
            Some(&buyer),
            Some(json!({ "orderId": details.order.id, "paymentMethod": "card" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reference = body["data"]["reference"].as_str().unwrap().to_string();
    assert!(body["data"]["redirectUrl"].is_string());

    let (status, body) = send(
        &router,
        request(Method::POST, "/payments/mock/webhook", None, Some(json!({ "nonsense": true }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "ignored");

    let transaction_id = app.transaction_id(details.order.id, &reference).await;
    let payload = app.callback(&reference, &transaction_id, CallbackStatus::Success, Decimal::from(100));
    let signed = serde_json::to_value(&payload).unwrap();

    let (status, body) = send(
        &router,
        request(Method::POST, "/payments/mock/webhook", None, Some(signed.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "applied");

    let (status, body) = send(
        &router,
        request(Method::POST, "/payments/mock/webhook", None, Some(signed)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "duplicate");

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            &format!("/organizer/bookings/{}/check-in", details.items[0].id),
            Some(&app.organizer),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["check_in_status"], "checked_in");
}

#[tokio::test]
async fn test_sweep_is_admin_only() {
    let app = TestApp::new().await;
    let router = api_routes(app.state.clone());

    let (status, body) = send(
        &router,
        request(Method::POST, "/internal/orders/expire", Some(&attendee()), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(
        &router,
        request(Method::POST, "/internal/orders/expire", Some(&support::admin()), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired"], 0);
}
