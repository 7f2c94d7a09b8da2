mod support;

use rust_decimal::Decimal;

use support::{admin, attendee, TestApp};
use ticketing_server::models::{CheckInStatus, PaymentMethod};
use ticketing_server::payments::CallbackStatus;
use ticketing_server::utils::error::AppError;

async fn completed_item(app: &TestApp) -> uuid::Uuid {
    let general = app.ticket_type("General", 100, 10).await;
    let buyer = attendee();
    let details = app.place_order(&buyer, &[(general.id, 1)]).await;
    let initiation = app
        .state
        .payments
        .initiate(&buyer, details.order.id, PaymentMethod::Card)
        .await
        .unwrap();
    let transaction_id = app.transaction_id(details.order.id, &initiation.reference).await;
    app.state
        .payments
        .on_callback(
            "mock",
            &app.callback(&initiation.reference, &transaction_id, CallbackStatus::Success, Decimal::from(100)),
        )
        .await
        .unwrap();
    details.items[0].id
}

#[tokio::test]
async fn test_second_check_in_fails_and_changes_nothing() {
    let app = TestApp::new().await;
    let item_id = completed_item(&app).await;

    let first = app.state.checkin.check_in(&app.organizer, item_id).await.unwrap();
    assert_eq!(first.check_in_status, CheckInStatus::CheckedIn);
    assert_eq!(first.checked_in_by, Some(app.organizer.user_id));
    let first_at = first.checked_in_at;

    app.clock.advance(chrono::Duration::minutes(5));
    let err = app
        .state
        .checkin
        .check_in(&admin(), item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyCheckedIn(_)));

    let items = app.store.order_items(first.order_id).await;
    assert_eq!(items[0].check_in_status, CheckInStatus::CheckedIn);
    assert_eq!(items[0].checked_in_at, first_at);
    assert_eq!(items[0].checked_in_by, Some(app.organizer.user_id));
}

#[tokio::test]
async fn test_unpaid_and_cancelled_tickets_cannot_check_in() {
    let app = TestApp::new().await;
    let general = app.ticket_type("General", 100, 10).await;
    let buyer = attendee();
    let details = app.place_order(&buyer, &[(general.id, 1)]).await;
    let item_id = details.items[0].id;

    let err = app
        .state
        .checkin
        .check_in(&app.organizer, item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrderNotPending(_)));

    app.state
        .orders
        .cancel_order(&buyer, details.order.id)
        .await
        .unwrap();
    let err = app
        .state
        .checkin
        .check_in(&app.organizer, item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrderNotPending(_)));
}

#[tokio::test]
async fn test_only_event_staff_can_check_in() {
    let app = TestApp::new().await;
    let item_id = completed_item(&app).await;

    let err = app
        .state
        .checkin
        .check_in(&attendee(), item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = app
        .state
        .checkin
        .check_in(&app.organizer, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
